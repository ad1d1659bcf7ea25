//! One monitor per watched currency: owns the block window and drives the
//! rescan, the notification loop and historical lookups against it.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use metrics::{counter, gauge};
use payment_discovery_domain::{model::Currency, BlockWindowCache, Transaction};
use tokio::{sync::watch, time::sleep};
use tracing::{debug, error, info, warn};

use crate::{
    feed::{FeedError, Notification, NotificationFeed},
    fetcher::ChainSource,
    pipeline::{process_new_block, process_new_tx},
    publisher::Publisher,
    rescan::{rescan_with_retry, RetryPolicy},
    worker::MonitorError,
};

const TRANSPORT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// One-shot latch released once the bootstrap rescan has filled the window.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn release(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_released(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once released.
        let _ = rx.wait_for(|released| *released).await;
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-currency capabilities used by the composition root and the query
/// service.
#[async_trait]
pub trait CurrencyMonitor: Send + Sync {
    fn currency(&self) -> Currency;

    /// Fills the window from the chain tip and releases the ready latch.
    async fn rescan(&self) -> Result<(), MonitorError>;

    /// Consumes notifications until the feed closes. Dispatching starts only
    /// after the rescan finished.
    async fn listen(&self, feed: Box<dyn NotificationFeed>) -> Result<(), MonitorError>;

    async fn wait_ready(&self);

    /// Marked payments of every cached block with `time >= since`, oldest
    /// block first.
    fn handle_query(&self, since: i64) -> Vec<Transaction>;
}

pub struct Monitor<C> {
    currency: Currency,
    source: C,
    window: Arc<BlockWindowCache>,
    publisher: Arc<dyn Publisher>,
    ready: ReadySignal,
    retry: RetryPolicy,
}

impl<C> Monitor<C>
where
    C: ChainSource,
{
    pub fn new(
        currency: Currency,
        source: C,
        window_size: usize,
        publisher: Arc<dyn Publisher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            currency,
            source,
            window: Arc::new(BlockWindowCache::new(window_size)),
            publisher,
            ready: ReadySignal::new(),
            retry,
        }
    }

    pub fn window(&self) -> &BlockWindowCache {
        self.window.as_ref()
    }

    pub fn ready(&self) -> &ReadySignal {
        &self.ready
    }

    /// Routes one notification to its handler. Fetch failures skip the event.
    pub async fn dispatch(&self, notification: Notification) {
        counter!(
            "discovery_notifications_total",
            "currency" => self.currency.tag(),
            "topic" => notification.topic()
        )
        .increment(1);

        match notification {
            Notification::NewTransaction(txid) => {
                debug!(currency = %self.currency, %txid, "tx hash received");
                if let Err(err) =
                    process_new_tx(self.currency, &self.source, self.publisher.as_ref(), &txid)
                        .await
                {
                    error!(currency = %self.currency, %txid, error = %err, "fetch new tx failed");
                }
            }
            Notification::NewBlock(hash) => {
                info!(currency = %self.currency, %hash, "block hash received");
                if let Err(err) = process_new_block(
                    self.currency,
                    &self.source,
                    &self.window,
                    self.publisher.as_ref(),
                    &hash,
                )
                .await
                {
                    error!(
                        currency = %self.currency,
                        %hash,
                        error = %err,
                        "fetch new block failed"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl<C> CurrencyMonitor for Monitor<C>
where
    C: ChainSource,
{
    fn currency(&self) -> Currency {
        self.currency
    }

    async fn rescan(&self) -> Result<(), MonitorError> {
        info!(currency = %self.currency, window = self.window.capacity(), "start rescanning");
        let blocks =
            rescan_with_retry(self.currency, &self.source, self.window.capacity(), &self.retry)
                .await?;
        self.window.prepend(blocks);
        gauge!("discovery_window_blocks", "currency" => self.currency.tag())
            .set(self.window.len() as f64);
        self.ready.release();
        info!(currency = %self.currency, cached = self.window.len(), "end rescanning");
        Ok(())
    }

    async fn listen(&self, mut feed: Box<dyn NotificationFeed>) -> Result<(), MonitorError> {
        self.ready.wait().await;
        info!(currency = %self.currency, "listening for chain notifications");

        loop {
            match feed.next().await {
                Ok(Some(notification)) => self.dispatch(notification).await,
                Ok(None) => {
                    warn!(currency = %self.currency, "notification feed closed");
                    return Ok(());
                }
                Err(FeedError::Transport(err)) => {
                    error!(currency = %self.currency, error = %err, "subscription receive failed");
                    sleep(TRANSPORT_ERROR_PAUSE).await;
                }
                Err(err) => {
                    debug!(currency = %self.currency, error = %err, "notification skipped");
                }
            }
        }
    }

    async fn wait_ready(&self) {
        self.ready.wait().await;
    }

    fn handle_query(&self, since: i64) -> Vec<Transaction> {
        self.window.marked_payments_since(since)
    }
}
