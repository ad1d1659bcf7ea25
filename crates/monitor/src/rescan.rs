//! Bootstrap walk that fills the block window from the chain tip backwards.

use std::{collections::VecDeque, time::Duration};

use metrics::counter;
use payment_discovery_domain::model::{Block, Currency};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    fetcher::{ChainSource, FetchError},
    worker::MonitorError,
};

/// Bounded exponential backoff for the whole bootstrap walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Pause after the first failure; doubled after each further failure.
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Pause before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Fetches up to `window_size` blocks ending at the current tip, oldest
/// first. The walk stops early at a block without a parent (genesis).
pub async fn rescan_window<C>(source: &C, window_size: usize) -> Result<Vec<Block>, FetchError>
where
    C: ChainSource + ?Sized,
{
    let info = source.chain_info().await?;

    let mut blocks = VecDeque::with_capacity(window_size);
    let mut next_hash = Some(info.best_block_hash);
    while blocks.len() < window_size {
        let Some(hash) = next_hash.take() else {
            debug!(fetched = blocks.len(), "reached genesis before filling the window");
            break;
        };
        let block = source.block(&hash).await?;
        next_hash = block.previous_hash.clone();
        blocks.push_front(block);
    }

    Ok(blocks.into())
}

/// Runs [`rescan_window`] until it succeeds or `policy` is exhausted. A
/// failed walk is discarded entirely.
pub async fn rescan_with_retry<C>(
    currency: Currency,
    source: &C,
    window_size: usize,
    policy: &RetryPolicy,
) -> Result<Vec<Block>, MonitorError>
where
    C: ChainSource + ?Sized,
{
    let mut attempt = 1;
    loop {
        match rescan_window(source, window_size).await {
            Ok(blocks) => {
                counter!(
                    "discovery_rescan_attempts_total",
                    "currency" => currency.tag(),
                    "result" => "ok"
                )
                .increment(1);
                let tip_time = blocks.last().map(Block::time_label).unwrap_or_default();
                info!(%currency, attempt, blocks = blocks.len(), %tip_time, "rescan finished");
                return Ok(blocks);
            }
            Err(err) => {
                counter!(
                    "discovery_rescan_attempts_total",
                    "currency" => currency.tag(),
                    "result" => "error"
                )
                .increment(1);
                if attempt >= policy.max_attempts {
                    return Err(MonitorError::RescanExhausted {
                        currency,
                        attempts: attempt,
                        source: err,
                    });
                }
                let delay = policy.delay_after(attempt);
                warn!(%currency, attempt, ?delay, error = %err, "rescan failed, retrying");
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
