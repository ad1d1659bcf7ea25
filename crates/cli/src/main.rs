//! Command-line client for the discovery daemon: tail the fanout feed or run
//! a single historical query.

use std::{process, time::Duration};

use bytes::Bytes;
use clap::{Parser, Subcommand};
use payment_discovery_domain::{
    model::Currency,
    protocol::{QueryReply, QueryRequest, ReplyDecodeError},
};
use thiserror::Error;
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

const RECV_ERROR_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(name = "payment-discovery-cli", about = "Listen to or query a payment discovery daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every payment transaction published for a currency.
    Listen {
        /// Currency to follow (btc, ltc)
        #[arg(long, default_value = "btc", value_parser = parse_currency)]
        currency: Currency,
        /// Fanout endpoint of the daemon, e.g. tcp://127.0.0.1:17009
        #[arg(long)]
        addr: String,
    },
    /// Fetch all payment transactions in blocks at or after a timestamp.
    Query {
        /// Currency to query (btc, ltc)
        #[arg(long, default_value = "btc", value_parser = parse_currency)]
        currency: Currency,
        /// Query endpoint of the daemon, e.g. tcp://127.0.0.1:17008
        #[arg(long)]
        addr: String,
        /// Unix timestamp in seconds
        #[arg(long, default_value_t = 0)]
        timestamp: i64,
    },
}

fn parse_currency(value: &str) -> Result<Currency, String> {
    Currency::parse(value).map_err(|err| err.to_string())
}

#[derive(Debug, Error)]
enum CliError {
    #[error("transport error: {0}")]
    Transport(#[from] zeromq::ZmqError),
    #[error("invalid reply: {0}")]
    Reply(#[from] ReplyDecodeError),
    #[error("{0}")]
    Remote(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Listen { currency, addr } => listen(currency, &addr).await,
        Command::Query {
            currency,
            addr,
            timestamp,
        } => query(currency, &addr, timestamp).await,
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

async fn listen(currency: Currency, addr: &str) -> Result<(), CliError> {
    let mut socket = SubSocket::new();
    socket.connect(addr).await?;
    socket.subscribe(currency.tag()).await?;

    loop {
        let payload = next_payload(&mut socket).await;
        println!("{}", format_json(&payload));
    }
}

/// Waits for the next fanout payload. Receive errors are reported and
/// followed by a short pause so a broken connection does not spin.
async fn next_payload<S>(socket: &mut S) -> Bytes
where
    S: SocketRecv + Send,
{
    loop {
        match socket.recv().await {
            Ok(message) => match message.get(1) {
                Some(payload) => return payload.clone(),
                None => eprintln!("error: message without payload"),
            },
            Err(err) => {
                eprintln!("error: {err}");
                tokio::time::sleep(RECV_ERROR_PAUSE).await;
            }
        }
    }
}

async fn query(currency: Currency, addr: &str, timestamp: i64) -> Result<(), CliError> {
    let mut socket = ReqSocket::new();
    socket.connect(addr).await?;

    let mut frames = QueryRequest::new(currency, timestamp)
        .to_frames()
        .into_iter()
        .map(Bytes::from);
    let mut request = ZmqMessage::from(frames.next().unwrap_or_default());
    for frame in frames {
        request.push_back(frame);
    }
    socket.send(request).await?;

    let reply = socket.recv().await?.into_vec();
    match QueryReply::from_frames(&reply)? {
        QueryReply::Ok(_) => {
            println!("{}", format_json(&reply[1]));
            Ok(())
        }
        QueryReply::Error(message) => Err(CliError::Remote(message)),
    }
}

/// Indents a JSON payload; anything unparseable is printed as is.
fn format_json(data: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(data)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| String::from_utf8_lossy(data).into_owned())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tokio::time::Instant;
    use zeromq::{ZmqError, ZmqResult};

    use super::*;

    struct ScriptedSocket {
        replies: VecDeque<ZmqResult<ZmqMessage>>,
    }

    #[async_trait]
    impl SocketRecv for ScriptedSocket {
        async fn recv(&mut self) -> ZmqResult<ZmqMessage> {
            match self.replies.pop_front() {
                Some(reply) => reply,
                None => std::future::pending().await,
            }
        }
    }

    fn fanout(frames: &[&'static str]) -> ZmqMessage {
        let mut frames = frames.iter().copied().map(|frame| Bytes::from_static(frame.as_bytes()));
        let mut message = ZmqMessage::from(frames.next().unwrap_or_default());
        for frame in frames {
            message.push_back(frame);
        }
        message
    }

    #[test]
    fn parses_query_command() {
        let cli = Cli::try_parse_from([
            "payment-discovery-cli",
            "query",
            "--currency",
            "ltc",
            "--addr",
            "tcp://127.0.0.1:17008",
            "--timestamp",
            "1500000000",
        ])
        .expect("arguments parse");

        match cli.command {
            Command::Query {
                currency,
                addr,
                timestamp,
            } => {
                assert_eq!(currency, Currency::Litecoin);
                assert_eq!(addr, "tcp://127.0.0.1:17008");
                assert_eq!(timestamp, 1_500_000_000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn listen_defaults_to_bitcoin() {
        let cli = Cli::try_parse_from(["payment-discovery-cli", "listen", "--addr", "tcp://x:1"])
            .expect("arguments parse");
        assert!(matches!(
            cli.command,
            Command::Listen {
                currency: Currency::Bitcoin,
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_currency() {
        let result = Cli::try_parse_from([
            "payment-discovery-cli",
            "listen",
            "--currency",
            "doge",
            "--addr",
            "tcp://x:1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn pretty_prints_json_and_passes_through_text() {
        assert_eq!(format_json(br#"{"txs":[]}"#), "{\n  \"txs\": []\n}");
        assert_eq!(format_json(b"not json"), "not json");
    }

    #[tokio::test]
    async fn receive_errors_pause_before_retrying() {
        let mut socket = ScriptedSocket {
            replies: VecDeque::from([
                Err(ZmqError::NoMessage),
                Ok(fanout(&["BTC"])),
                Err(ZmqError::NoMessage),
                Ok(fanout(&["BTC", r#"{"txid":"x"}"#])),
            ]),
        };

        let started = Instant::now();
        let payload = tokio::time::timeout(Duration::from_secs(5), next_payload(&mut socket))
            .await
            .expect("payload arrives");

        assert_eq!(&payload[..], br#"{"txid":"x"}"#);
        assert!(started.elapsed() >= RECV_ERROR_PAUSE * 2);
    }
}
