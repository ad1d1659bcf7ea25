//! Fanout of detected payments, one topic per currency.

use async_trait::async_trait;
use bytes::Bytes;
use payment_discovery_domain::{model::Currency, protocol::fanout_frames, Transaction};
use thiserror::Error;
use tokio::sync::Mutex;
use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

/// When a payment is announced: seen in the mempool, or included in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Mempool,
    Confirmed,
}

impl PublishStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStage::Mempool => "mempool",
            PublishStage::Confirmed => "confirmed",
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode transaction: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("fanout transport error: {0}")]
    Transport(String),
}

impl From<zeromq::ZmqError> for PublishError {
    fn from(value: zeromq::ZmqError) -> Self {
        Self::Transport(value.to_string())
    }
}

/// Fire-and-forget broadcast of a payment transaction.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, currency: Currency, tx: &Transaction) -> Result<(), PublishError>;
}

/// PUB socket shared by every monitor of the process.
pub struct ZmqPublisher {
    socket: Mutex<PubSocket>,
    endpoint: String,
}

impl ZmqPublisher {
    pub async fn bind(endpoint: &str) -> Result<Self, PublishError> {
        let mut socket = PubSocket::new();
        let bound = socket.bind(endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
            endpoint: bound.to_string(),
        })
    }

    /// Address actually bound, with any wildcard port resolved.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Publisher for ZmqPublisher {
    async fn publish(&self, currency: Currency, tx: &Transaction) -> Result<(), PublishError> {
        let (topic, payload) = fanout_frames(currency, tx)?;
        let mut message = ZmqMessage::from(topic);
        message.push_back(Bytes::from(payload));
        self.socket.lock().await.send(message).await?;
        Ok(())
    }
}
