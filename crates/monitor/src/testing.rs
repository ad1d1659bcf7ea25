//! In-memory stand-ins for the node, the fanout socket and the subscription
//! feed.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use payment_discovery_domain::model::{
    Block, ChainInfo, Currency, Output, ScriptPubKey, Transaction, MARKER_PREFIX,
};

use crate::{
    feed::{FeedError, Notification, NotificationFeed},
    fetcher::{ChainSource, FetchError},
    publisher::{PublishError, Publisher},
};

pub fn marked_tx(id: &str) -> Transaction {
    Transaction {
        id: id.into(),
        outputs: vec![
            Output {
                value: None,
                script_pub_key: ScriptPubKey {
                    hex: "76a914000000000000000000000000000000000000000088ac".into(),
                    addresses: vec!["1BoatSLRHtKNngkdXEeobR76b53LETtpyT".into()],
                    address: None,
                },
            },
            Output {
                value: None,
                script_pub_key: ScriptPubKey {
                    hex: format!("{MARKER_PREFIX}{}", "11".repeat(48)),
                    ..ScriptPubKey::default()
                },
            },
        ],
    }
}

pub fn plain_tx(id: &str) -> Transaction {
    Transaction {
        id: id.into(),
        outputs: vec![Output {
            value: None,
            script_pub_key: ScriptPubKey {
                hex: "0014751e76e8199196d454941c45d1b3a323f1433bd6".into(),
                ..ScriptPubKey::default()
            },
        }],
    }
}

pub fn block(
    hash: &str,
    previous: Option<&str>,
    time: i64,
    transactions: Vec<Transaction>,
) -> Block {
    Block {
        hash: hash.into(),
        previous_hash: previous.map(str::to_string),
        time,
        transactions,
    }
}

/// Linear chain of empty blocks, first entry is genesis.
pub fn chain_of(blocks: &[(&str, i64)]) -> Vec<Block> {
    let mut previous: Option<&str> = None;
    blocks
        .iter()
        .map(|(hash, time)| {
            let built = block(hash, previous, *time, vec![]);
            previous = Some(*hash);
            built
        })
        .collect()
}

fn missing(path: String) -> FetchError {
    FetchError::Status {
        url: path,
        status: 404,
    }
}

/// Node double serving blocks and transactions from memory.
#[derive(Default)]
pub struct MockChain {
    tip: Mutex<Option<String>>,
    blocks: Mutex<HashMap<String, Block>>,
    txs: Mutex<HashMap<String, Transaction>>,
    chain_info_failures: AtomicUsize,
    block_fetches: AtomicUsize,
}

impl MockChain {
    /// Serves `blocks` with the last one as tip; their transactions are
    /// fetchable by id as well.
    pub fn new(blocks: Vec<Block>) -> Self {
        let chain = Self::default();
        for block in blocks {
            chain.add_block(block);
        }
        chain
    }

    /// Registers `block` and makes it the tip.
    pub fn add_block(&self, block: Block) {
        let mut txs = self.txs.lock().unwrap();
        for tx in &block.transactions {
            txs.insert(tx.id.clone(), tx.clone());
        }
        *self.tip.lock().unwrap() = Some(block.hash.clone());
        self.blocks.lock().unwrap().insert(block.hash.clone(), block);
    }

    pub fn add_tx(&self, tx: Transaction) {
        self.txs.lock().unwrap().insert(tx.id.clone(), tx);
    }

    pub fn forget_block(&self, hash: &str) {
        self.blocks.lock().unwrap().remove(hash);
    }

    pub fn fail_next_chain_info(&self, times: usize) {
        self.chain_info_failures.store(times, Ordering::SeqCst);
    }

    pub fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn chain_info(&self) -> Result<ChainInfo, FetchError> {
        let failing = self
            .chain_info_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FetchError::Status {
                url: "/rest/chaininfo.json".into(),
                status: 503,
            });
        }

        let tip = self.tip.lock().unwrap().clone();
        tip.map(|best_block_hash| ChainInfo { best_block_hash })
            .ok_or_else(|| missing("/rest/chaininfo.json".into()))
    }

    async fn block(&self, hash: &str) -> Result<Block, FetchError> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        self.blocks
            .lock()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or_else(|| missing(format!("/rest/block/{hash}.json")))
    }

    async fn transaction(&self, txid: &str) -> Result<Transaction, FetchError> {
        self.txs
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or_else(|| missing(format!("/rest/tx/{txid}.json")))
    }
}

/// Publisher double that records every announcement.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<(Currency, String)>>>,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<(Currency, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn count_for(&self, txid: &str) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, id)| id == txid)
            .count()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, currency: Currency, tx: &Transaction) -> Result<(), PublishError> {
        self.published
            .lock()
            .unwrap()
            .push((currency, tx.id.clone()));
        Ok(())
    }
}

/// Feed double replaying a fixed script, then reporting closure.
pub struct ScriptedFeed {
    events: VecDeque<Result<Notification, FeedError>>,
}

impl ScriptedFeed {
    pub fn new(events: Vec<Result<Notification, FeedError>>) -> Self {
        Self {
            events: events.into(),
        }
    }
}

#[async_trait]
impl NotificationFeed for ScriptedFeed {
    async fn next(&mut self) -> Result<Option<Notification>, FeedError> {
        self.events.pop_front().transpose()
    }
}
