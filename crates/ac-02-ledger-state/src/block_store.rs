//! # Block Store
//!
//! Blocks keyed by hash, with a height index for the canonical chain and a
//! transaction index over canonical blocks. Blocks off the canonical chain
//! stay stored as fork candidates until pruned.
//!
//! Post-state snapshots are kept per block so a reorg can restart from any
//! retained ancestor.

use crate::domain::error::{LedgerError, LedgerResult};
use parking_lot::RwLock;
use shared_types::{Block, Hash};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A block plus bookkeeping the store keeps for it.
#[derive(Debug, Clone)]
pub struct StoredBlock {
    pub hash: Hash,
    pub block: Arc<Block>,
    /// Ledger snapshot after this block applied, while retained.
    post_state: Option<Arc<Vec<u8>>>,
}

#[derive(Debug, Default)]
struct StoreInner {
    blocks: HashMap<Hash, StoredBlock>,
    children: HashMap<Hash, Vec<Hash>>,
    canonical: BTreeMap<u64, Hash>,
    tx_index: HashMap<Hash, (u64, usize)>,
}

#[derive(Debug, Default)]
pub struct BlockStore {
    inner: RwLock<StoreInner>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `block`. Idempotent; returns its hash.
    pub fn insert(&self, block: Block) -> Hash {
        let hash = block.hash();
        let mut inner = self.inner.write();
        if inner.blocks.contains_key(&hash) {
            return hash;
        }
        inner
            .children
            .entry(block.parent_hash())
            .or_default()
            .push(hash);
        inner.blocks.insert(
            hash,
            StoredBlock {
                hash,
                block: Arc::new(block),
                post_state: None,
            },
        );
        hash
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.read().blocks.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.inner.read().blocks.get(hash).map(|s| s.block.clone())
    }

    /// Canonical block at `number`.
    pub fn get_by_number(&self, number: u64) -> Option<Arc<Block>> {
        let inner = self.inner.read();
        let hash = inner.canonical.get(&number)?;
        inner.blocks.get(hash).map(|s| s.block.clone())
    }

    pub fn is_canonical(&self, hash: &Hash) -> bool {
        let inner = self.inner.read();
        inner
            .blocks
            .get(hash)
            .and_then(|s| inner.canonical.get(&s.block.number()))
            .is_some_and(|h| h == hash)
    }

    /// `(height, hash)` of the canonical tip.
    pub fn tip(&self) -> Option<(u64, Hash)> {
        self.inner
            .read()
            .canonical
            .last_key_value()
            .map(|(n, h)| (*n, *h))
    }

    pub fn height(&self) -> u64 {
        self.tip().map_or(0, |(n, _)| n)
    }

    /// Stored blocks whose parent is `parent`.
    pub fn children_of(&self, parent: &Hash) -> Vec<Hash> {
        self.inner
            .read()
            .children
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    /// Mark `hash` canonical at its height. Canonical entries at that height
    /// and above are dropped first.
    pub fn set_canonical(&self, hash: &Hash) -> LedgerResult<()> {
        let mut inner = self.inner.write();
        let block = inner
            .blocks
            .get(hash)
            .map(|s| s.block.clone())
            .ok_or(LedgerError::BlockNotFound { hash: *hash })?;
        let number = block.number();

        let stale: Vec<u64> = inner.canonical.range(number..).map(|(n, _)| *n).collect();
        for n in stale {
            if let Some(old) = inner.canonical.remove(&n) {
                if let Some(old_block) = inner.blocks.get(&old).map(|s| s.block.clone()) {
                    for tx in &old_block.transactions {
                        inner.tx_index.remove(&tx.hash());
                    }
                }
            }
        }

        inner.canonical.insert(number, *hash);
        for (position, tx) in block.transactions.iter().enumerate() {
            inner.tx_index.insert(tx.hash(), (number, position));
        }
        Ok(())
    }

    /// `(block number, position)` of a canonical transaction.
    pub fn transaction_location(&self, tx_hash: &Hash) -> Option<(u64, usize)> {
        self.inner.read().tx_index.get(tx_hash).copied()
    }

    /// Walk back from `hash` until a canonical block. Returns the common
    /// ancestor and the branch from just after it up to `hash`, oldest first.
    pub fn branch_from_canonical(&self, hash: &Hash) -> LedgerResult<(Hash, Vec<Arc<Block>>)> {
        let inner = self.inner.read();
        let mut branch = Vec::new();
        let mut cursor = *hash;
        loop {
            let stored = inner
                .blocks
                .get(&cursor)
                .ok_or(LedgerError::BlockNotFound { hash: cursor })?;
            let number = stored.block.number();
            if inner.canonical.get(&number) == Some(&cursor) {
                branch.reverse();
                return Ok((cursor, branch));
            }
            branch.push(stored.block.clone());
            cursor = stored.block.parent_hash();
        }
    }

    pub fn set_post_state(&self, hash: &Hash, snapshot: Vec<u8>) {
        if let Some(stored) = self.inner.write().blocks.get_mut(hash) {
            stored.post_state = Some(Arc::new(snapshot));
        }
    }

    pub fn post_state(&self, hash: &Hash) -> Option<Arc<Vec<u8>>> {
        self.inner
            .read()
            .blocks
            .get(hash)
            .and_then(|s| s.post_state.clone())
    }

    /// Drop post-state snapshots of blocks below `min_number`. Returns how
    /// many were dropped.
    pub fn prune_snapshots(&self, min_number: u64) -> usize {
        let mut inner = self.inner.write();
        let mut pruned = 0;
        for stored in inner.blocks.values_mut() {
            if stored.block.number() < min_number && stored.post_state.take().is_some() {
                pruned += 1;
            }
        }
        pruned
    }

    /// Forget fork blocks below `min_number`. Canonical blocks stay.
    /// Returns how many were dropped.
    pub fn prune_forks(&self, min_number: u64) -> usize {
        let mut inner = self.inner.write();
        let stale: Vec<(Hash, Hash)> = inner
            .blocks
            .values()
            .filter(|s| {
                let number = s.block.number();
                number < min_number && inner.canonical.get(&number) != Some(&s.hash)
            })
            .map(|s| (s.hash, s.block.parent_hash()))
            .collect();
        for (hash, parent) in &stale {
            inner.blocks.remove(hash);
            inner.children.remove(hash);
            if let Some(siblings) = inner.children.get_mut(parent) {
                siblings.retain(|h| h != hash);
            }
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
