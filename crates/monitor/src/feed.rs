//! Subscription side of the node's notification socket (`hashtx` /
//! `hashblock`).

use async_trait::async_trait;
use thiserror::Error;
use zeromq::{Socket, SocketRecv, SubSocket};

pub const TOPIC_HASH_TX: &str = "hashtx";
pub const TOPIC_HASH_BLOCK: &str = "hashblock";

/// A hash announced by the node, hex encoded for use in REST paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    NewTransaction(String),
    NewBlock(String),
}

impl Notification {
    pub fn topic(&self) -> &'static str {
        match self {
            Notification::NewTransaction(_) => TOPIC_HASH_TX,
            Notification::NewBlock(_) => TOPIC_HASH_BLOCK,
        }
    }

    /// Decodes `[topic, raw hash, ...]`; trailing frames (the node's
    /// sequence counter) are ignored.
    pub fn from_frames<F: AsRef<[u8]>>(frames: &[F]) -> Result<Self, FeedError> {
        let (Some(topic), Some(hash)) = (frames.first(), frames.get(1)) else {
            return Err(FeedError::Malformed(frames.len()));
        };

        let topic: &[u8] = topic.as_ref();
        let hash = hex::encode::<&[u8]>(hash.as_ref());
        match topic {
            t if t == TOPIC_HASH_TX.as_bytes() => Ok(Notification::NewTransaction(hash)),
            t if t == TOPIC_HASH_BLOCK.as_bytes() => Ok(Notification::NewBlock(hash)),
            other => Err(FeedError::UnknownTopic(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("subscription transport error: {0}")]
    Transport(String),
    #[error("notification carried {0} frame(s), expected at least 2")]
    Malformed(usize),
    #[error("unexpected notification topic `{0}`")]
    UnknownTopic(String),
}

impl From<zeromq::ZmqError> for FeedError {
    fn from(value: zeromq::ZmqError) -> Self {
        Self::Transport(value.to_string())
    }
}

#[async_trait]
pub trait NotificationFeed: Send {
    /// Waits for the next notification. `Ok(None)` means the feed is closed
    /// for good.
    async fn next(&mut self) -> Result<Option<Notification>, FeedError>;
}

/// Feed backed by a SUB socket connected to the node.
pub struct ZmqNotificationFeed {
    socket: SubSocket,
}

impl ZmqNotificationFeed {
    pub async fn connect(endpoint: &str) -> Result<Self, FeedError> {
        let mut socket = SubSocket::new();
        socket.connect(endpoint).await?;
        socket.subscribe(TOPIC_HASH_TX).await?;
        socket.subscribe(TOPIC_HASH_BLOCK).await?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl NotificationFeed for ZmqNotificationFeed {
    async fn next(&mut self) -> Result<Option<Notification>, FeedError> {
        let message = self.socket.recv().await?;
        let frames = message.into_vec();
        Notification::from_frames(&frames).map(Some)
    }
}
