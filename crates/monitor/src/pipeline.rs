//! Handlers for single notifications: fetch the announced object, update the
//! window and announce marker payments.

use metrics::{counter, gauge};
use payment_discovery_domain::{
    is_marked_payment, model::Currency, AppendOutcome, BlockWindowCache, Transaction,
};
use tracing::{debug, info, warn};

use crate::{
    fetcher::{ChainSource, FetchError},
    publisher::{PublishStage, Publisher},
};

/// What a block notification did to the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockIngest {
    Appended { announced: usize },
    Duplicate,
}

/// Fetches a mempool transaction and announces it when it carries the marker.
/// Returns whether an announcement was attempted.
pub async fn process_new_tx<C, P>(
    currency: Currency,
    source: &C,
    publisher: &P,
    txid: &str,
) -> Result<bool, FetchError>
where
    C: ChainSource + ?Sized,
    P: Publisher + ?Sized,
{
    let tx = source.transaction(txid).await?;
    if !is_marked_payment(&tx) {
        return Ok(false);
    }

    info!(%currency, txid = %tx.id, "payment tx seen in mempool");
    announce(currency, publisher, &tx, PublishStage::Mempool).await;
    Ok(true)
}

/// Fetches a new block, appends it to `window` and re-announces its marker
/// payments. A block the window already holds is left alone.
pub async fn process_new_block<C, P>(
    currency: Currency,
    source: &C,
    window: &BlockWindowCache,
    publisher: &P,
    hash: &str,
) -> Result<BlockIngest, FetchError>
where
    C: ChainSource + ?Sized,
    P: Publisher + ?Sized,
{
    let block = source.block(hash).await?;
    let block_hash = block.hash.clone();
    let block_time = block.time_label();
    let payments: Vec<Transaction> = block.marked_payments().cloned().collect();

    match window.append(block) {
        AppendOutcome::Duplicate => {
            debug!(%currency, hash = %block_hash, "block already in window");
            return Ok(BlockIngest::Duplicate);
        }
        AppendOutcome::Appended { evicted } => {
            info!(%currency, hash = %block_hash, %block_time, ?evicted, "block appended");
        }
    }
    gauge!("discovery_window_blocks", "currency" => currency.tag()).set(window.len() as f64);

    for tx in &payments {
        info!(%currency, txid = %tx.id, block = %block_hash, %block_time, "payment tx confirmed");
        announce(currency, publisher, tx, PublishStage::Confirmed).await;
    }

    Ok(BlockIngest::Appended {
        announced: payments.len(),
    })
}

async fn announce<P>(currency: Currency, publisher: &P, tx: &Transaction, stage: PublishStage)
where
    P: Publisher + ?Sized,
{
    let result = match publisher.publish(currency, tx).await {
        Ok(()) => "ok",
        Err(err) => {
            warn!(%currency, txid = %tx.id, stage = stage.as_str(), error = %err, "publish failed");
            "error"
        }
    };
    counter!(
        "discovery_publish_total",
        "currency" => currency.tag(),
        "stage" => stage.as_str(),
        "result" => result
    )
    .increment(1);
}
