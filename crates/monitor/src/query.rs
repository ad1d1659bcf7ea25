//! Request/reply loop answering "payments since timestamp" lookups.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use metrics::counter;
use payment_discovery_domain::{
    model::Currency,
    protocol::{QueryError, QueryReply, QueryRequest, QueryResult, STATUS_ERROR},
};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use zeromq::{RepSocket, SocketRecv, SocketSend, ZmqMessage};

use crate::{monitor::CurrencyMonitor, worker::MonitorError};

const RECV_ERROR_PAUSE: Duration = Duration::from_millis(100);

pub struct QueryService {
    monitors: HashMap<Currency, Arc<dyn CurrencyMonitor>>,
}

impl QueryService {
    pub fn new(monitors: impl IntoIterator<Item = Arc<dyn CurrencyMonitor>>) -> Self {
        Self {
            monitors: monitors
                .into_iter()
                .map(|monitor| (monitor.currency(), monitor))
                .collect(),
        }
    }

    /// Resolves once every monitor finished its bootstrap rescan.
    pub async fn wait_ready(&self) {
        for monitor in self.monitors.values() {
            monitor.wait_ready().await;
        }
    }

    /// Answers one request; malformed input becomes an `ERROR` reply.
    pub fn handle<F: AsRef<[u8]>>(&self, frames: &[F]) -> QueryReply {
        match self.resolve(frames) {
            Ok(txs) => {
                counter!("discovery_queries_total", "result" => "ok").increment(1);
                QueryReply::Ok(QueryResult { txs })
            }
            Err(err) => {
                counter!("discovery_queries_total", "result" => "error").increment(1);
                warn!(error = %err, "rejecting query");
                QueryReply::Error(err.to_string())
            }
        }
    }

    fn resolve<F: AsRef<[u8]>>(
        &self,
        frames: &[F],
    ) -> Result<Vec<payment_discovery_domain::Transaction>, QueryError> {
        let request = QueryRequest::from_frames(frames)?;
        let monitor = self
            .monitors
            .get(&request.currency)
            .ok_or(QueryError::NotMonitored(request.currency))?;
        let txs = monitor.handle_query(request.since);
        debug!(
            currency = %request.currency,
            since = request.since,
            found = txs.len(),
            "query served"
        );
        Ok(txs)
    }

    /// Serves requests on `socket` forever, starting only after every
    /// monitor is ready.
    pub async fn serve(self, mut socket: RepSocket) -> Result<(), MonitorError> {
        self.wait_ready().await;
        info!("start to serve requests");

        loop {
            let request = match socket.recv().await {
                Ok(request) => request,
                Err(err) => {
                    error!(error = %err, "failed to receive request message");
                    sleep(RECV_ERROR_PAUSE).await;
                    continue;
                }
            };

            let frames = request.into_vec();
            let reply = reply_message(&self.handle(&frames));
            if let Err(err) = socket.send(reply).await {
                error!(error = %err, "failed to send reply");
            }
        }
    }
}

fn reply_message(reply: &QueryReply) -> ZmqMessage {
    let frames = reply.to_frames().unwrap_or_else(|err| {
        error!(error = %err, "failed to encode reply");
        vec![
            STATUS_ERROR.as_bytes().to_vec(),
            b"failed to encode reply".to_vec(),
        ]
    });

    let mut frames = frames.into_iter().map(Bytes::from);
    let mut message = ZmqMessage::from(frames.next().unwrap_or_default());
    for frame in frames {
        message.push_back(frame);
    }
    message
}
