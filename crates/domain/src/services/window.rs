use std::{
    collections::VecDeque,
    sync::{Arc, RwLock},
};

use crate::model::{Block, Transaction};

/// Result of a steady-state append.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// Block stored; `evicted` is the hash pushed out of the window, if any.
    Appended { evicted: Option<String> },
    /// The hash is already held by the window, nothing changed.
    Duplicate,
}

/// Fixed-size window of the most recent blocks, oldest first.
///
/// Writers take the lock exclusively; readers clone the `Arc`s out under the
/// shared lock so a snapshot never observes a half-applied mutation.
#[derive(Debug)]
pub struct BlockWindowCache {
    capacity: usize,
    blocks: RwLock<VecDeque<Arc<Block>>>,
}

impl BlockWindowCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            blocks: RwLock::new(VecDeque::with_capacity(capacity + 1)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.blocks.read().expect("window lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Places bootstrap blocks (oldest first) in front of whatever the window
    /// already holds, then trims the oldest entries down to capacity.
    pub fn prepend(&self, blocks: Vec<Block>) {
        let mut guard = self.blocks.write().expect("window lock poisoned");
        for block in blocks.into_iter().rev() {
            if guard.iter().any(|held| held.hash == block.hash) {
                continue;
            }
            guard.push_front(Arc::new(block));
        }
        while guard.len() > self.capacity {
            guard.pop_front();
        }
    }

    /// Appends `block` as the newest entry, evicting the oldest once full.
    pub fn append(&self, block: Block) -> AppendOutcome {
        let mut guard = self.blocks.write().expect("window lock poisoned");
        if guard.iter().any(|held| held.hash == block.hash) {
            return AppendOutcome::Duplicate;
        }

        guard.push_back(Arc::new(block));
        let evicted = if guard.len() > self.capacity {
            guard.pop_front().map(|old| old.hash.clone())
        } else {
            None
        };

        AppendOutcome::Appended { evicted }
    }

    /// Consistent copy of the window, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<Block>> {
        self.blocks
            .read()
            .expect("window lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Marker-bearing transactions of every block with `time >= since`,
    /// scanning oldest to newest.
    pub fn marked_payments_since(&self, since: i64) -> Vec<Transaction> {
        self.snapshot()
            .iter()
            .filter(|block| block.time >= since)
            .flat_map(|block| block.marked_payments().cloned().collect::<Vec<_>>())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Output, ScriptPubKey, MARKER_PREFIX};

    fn marked_tx(id: &str) -> Transaction {
        Transaction {
            id: id.into(),
            outputs: vec![Output {
                value: None,
                script_pub_key: ScriptPubKey {
                    hex: format!("{MARKER_PREFIX}{}", "00".repeat(48)),
                    ..ScriptPubKey::default()
                },
            }],
        }
    }

    fn plain_tx(id: &str) -> Transaction {
        Transaction {
            id: id.into(),
            outputs: vec![],
        }
    }

    fn block(hash: &str, time: i64, transactions: Vec<Transaction>) -> Block {
        Block {
            hash: hash.into(),
            previous_hash: None,
            time,
            transactions,
        }
    }

    fn hashes(cache: &BlockWindowCache) -> Vec<String> {
        cache.snapshot().iter().map(|b| b.hash.clone()).collect()
    }

    #[test]
    fn append_keeps_size_after_bootstrap() {
        let cache = BlockWindowCache::new(3);
        cache.prepend(vec![
            block("a", 1, vec![]),
            block("b", 2, vec![]),
            block("c", 3, vec![]),
        ]);
        assert_eq!(cache.len(), 3);

        for (i, hash) in ["d", "e", "f", "g"].iter().enumerate() {
            cache.append(block(hash, 4 + i as i64, vec![]));
            assert_eq!(cache.len(), 3);
            let snapshot = cache.snapshot();
            assert_eq!(snapshot.last().map(|b| b.hash.as_str()), Some(*hash));
        }
        assert_eq!(hashes(&cache), vec!["e", "f", "g"]);
    }

    #[test]
    fn append_reports_evicted_hash() {
        let cache = BlockWindowCache::new(2);
        cache.prepend(vec![block("a", 1, vec![]), block("b", 2, vec![])]);
        assert_eq!(
            cache.append(block("c", 3, vec![])),
            AppendOutcome::Appended {
                evicted: Some("a".into())
            }
        );
    }

    #[test]
    fn short_window_grows_until_capacity() {
        let cache = BlockWindowCache::new(3);
        cache.prepend(vec![block("genesis", 1, vec![])]);
        assert_eq!(
            cache.append(block("b", 2, vec![])),
            AppendOutcome::Appended { evicted: None }
        );
        cache.append(block("c", 3, vec![]));
        cache.append(block("d", 4, vec![]));
        assert_eq!(hashes(&cache), vec!["b", "c", "d"]);
    }

    #[test]
    fn duplicate_append_is_ignored() {
        let cache = BlockWindowCache::new(2);
        cache.prepend(vec![block("a", 1, vec![]), block("b", 2, vec![])]);
        assert_eq!(cache.append(block("b", 2, vec![])), AppendOutcome::Duplicate);
        assert_eq!(hashes(&cache), vec!["a", "b"]);
    }

    #[test]
    fn prepend_places_bootstrap_before_existing_entries() {
        let cache = BlockWindowCache::new(3);
        cache.append(block("c", 3, vec![]));
        cache.prepend(vec![
            block("a", 1, vec![]),
            block("b", 2, vec![]),
            block("c", 3, vec![]),
        ]);
        assert_eq!(hashes(&cache), vec!["a", "b", "c"]);

        cache.prepend(vec![block("z", 0, vec![])]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn snapshot_stays_sorted_for_linear_feed() {
        let cache = BlockWindowCache::new(4);
        cache.prepend(vec![block("a", 10, vec![]), block("b", 20, vec![])]);
        for (i, hash) in ["c", "d", "e"].iter().enumerate() {
            cache.append(block(hash, 30 + 10 * i as i64, vec![]));
        }
        let times: Vec<i64> = cache.snapshot().iter().map(|b| b.time).collect();
        assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn query_filters_by_block_time() {
        let cache = BlockWindowCache::new(3);
        cache.prepend(vec![
            block("a", 10, vec![marked_tx("x10"), plain_tx("p10")]),
            block("b", 20, vec![plain_tx("p20"), marked_tx("x20")]),
            block("c", 30, vec![marked_tx("x30")]),
        ]);

        let ids = |since| {
            cache
                .marked_payments_since(since)
                .into_iter()
                .map(|tx| tx.id)
                .collect::<Vec<_>>()
        };

        assert_eq!(ids(15), vec!["x20", "x30"]);
        assert_eq!(ids(20), vec!["x20", "x30"]);
        assert!(ids(31).is_empty());
        assert_eq!(ids(0), vec!["x10", "x20", "x30"]);
    }

    #[test]
    fn concurrent_readers_see_full_windows() {
        let cache = Arc::new(BlockWindowCache::new(5));
        cache.prepend((0..5).map(|i| block(&format!("b{i}"), i, vec![])).collect());

        let writer = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for i in 5..200 {
                    cache.append(block(&format!("b{i}"), i, vec![]));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        assert_eq!(cache.snapshot().len(), 5);
                    }
                })
            })
            .collect();

        writer.join().expect("writer finishes");
        for reader in readers {
            reader.join().expect("reader finishes");
        }
        assert_eq!(
            cache.snapshot().last().map(|b| b.hash.clone()),
            Some("b199".to_string())
        );
    }
}
