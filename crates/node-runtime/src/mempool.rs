//! # Transaction Pool
//!
//! Signature-verified transactions waiting for a block.
//!
//! ## Indices
//!
//! - `by_hash`: lookup and duplicate rejection
//! - `by_fee`: lowest fee first, newest arrival first on ties (eviction order)
//! - `by_sender`: nonce-ordered per sender, senders in address order
//!   (block candidate order)
//!
//! One transaction per (sender, nonce) slot; the first one wins. When the
//! pool is full a newcomer evicts the cheapest entry only if it pays
//! strictly more.

use crate::container::config::MempoolConfig;
use parking_lot::RwLock;
use rayon::prelude::*;
use rust_decimal::Decimal;
use shared_crypto::{verify_transaction, CryptoResult};
use shared_types::{to_hex, Address, Amount, Classify, ErrorKind, Hash, Transaction};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MempoolError {
    #[error("Transaction {} already pooled", to_hex(.0))]
    Duplicate(Hash),

    #[error("Nonce {nonce} of {} already pooled", to_hex(.sender))]
    NonceTaken { sender: Address, nonce: u64 },

    #[error("Mempool full ({capacity}) and fee {fee} does not beat the cheapest entry")]
    Full { capacity: usize, fee: Amount },
}

impl Classify for MempoolError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

pub type MempoolResult<T> = Result<T, MempoolError>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct FeeKey {
    fee: Decimal,
    seq: u64,
    hash: Hash,
}

impl Ord for FeeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fee
            .cmp(&other.fee)
            .then_with(|| other.seq.cmp(&self.seq))
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for FeeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct Pooled {
    tx: Transaction,
    key: FeeKey,
}

#[derive(Debug, Default)]
struct Inner {
    by_hash: HashMap<Hash, Pooled>,
    by_fee: BTreeSet<FeeKey>,
    by_sender: BTreeMap<Address, BTreeMap<u64, Hash>>,
    next_seq: u64,
}

impl Inner {
    fn slot(&self, sender: &Address, nonce: u64) -> Option<Hash> {
        self.by_sender.get(sender)?.get(&nonce).copied()
    }

    fn remove(&mut self, hash: &Hash) -> Option<Transaction> {
        let pooled = self.by_hash.remove(hash)?;
        self.by_fee.remove(&pooled.key);
        if let Some(nonces) = self.by_sender.get_mut(&pooled.tx.sender) {
            nonces.remove(&pooled.tx.nonce);
            if nonces.is_empty() {
                self.by_sender.remove(&pooled.tx.sender);
            }
        }
        Some(pooled.tx)
    }

    fn insert(&mut self, tx: Transaction, hash: Hash) {
        let key = FeeKey {
            fee: tx.fee,
            seq: self.next_seq,
            hash,
        };
        self.next_seq += 1;
        self.by_fee.insert(key.clone());
        self.by_sender
            .entry(tx.sender)
            .or_default()
            .insert(tx.nonce, hash);
        self.by_hash.insert(hash, Pooled { tx, key });
    }
}

/// Transaction pool shared by the engine, the inbound worker and the
/// producer loop.
#[derive(Debug)]
pub struct Mempool {
    config: MempoolConfig,
    inner: RwLock<Inner>,
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.read().by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.inner.read().by_hash.get(hash).map(|p| p.tx.clone())
    }

    /// Check many signatures on the rayon pool. Results keep input order.
    pub fn verify_signatures(txs: Vec<Transaction>) -> Vec<(Transaction, CryptoResult<()>)> {
        txs.into_par_iter()
            .map(|tx| {
                let verdict = verify_transaction(&tx);
                (tx, verdict)
            })
            .collect()
    }

    /// Add a transaction whose signature and admission checks passed.
    pub fn insert(&self, tx: Transaction) -> MempoolResult<Hash> {
        let hash = tx.hash();
        let mut inner = self.inner.write();
        if inner.by_hash.contains_key(&hash) {
            return Err(MempoolError::Duplicate(hash));
        }

        if inner.slot(&tx.sender, tx.nonce).is_some() {
            return Err(MempoolError::NonceTaken {
                sender: tx.sender,
                nonce: tx.nonce,
            });
        }

        if inner.by_hash.len() >= self.config.max_transactions {
            let cheapest = inner.by_fee.first().cloned();
            match cheapest {
                Some(lowest) if tx.fee > lowest.fee => {
                    inner.remove(&lowest.hash);
                    debug!(evicted = %to_hex(&lowest.hash), fee = %lowest.fee, "Evicted cheapest transaction");
                }
                _ => {
                    return Err(MempoolError::Full {
                        capacity: self.config.max_transactions,
                        fee: tx.fee,
                    })
                }
            }
        }

        inner.insert(tx, hash);
        Ok(hash)
    }

    /// First nonce at or after `ledger_nonce` with no pooled transaction
    /// from `sender`.
    pub fn next_nonce(&self, sender: &Address, ledger_nonce: u64) -> u64 {
        let inner = self.inner.read();
        let mut nonce = ledger_nonce;
        if let Some(nonces) = inner.by_sender.get(sender) {
            while nonces.contains_key(&nonce) {
                nonce += 1;
            }
        }
        nonce
    }

    /// Up to `max` candidates ordered by (sender, nonce).
    pub fn candidates(&self, max: usize) -> Vec<Transaction> {
        let inner = self.inner.read();
        inner
            .by_sender
            .values()
            .flat_map(|nonces| nonces.values())
            .filter_map(|hash| inner.by_hash.get(hash).map(|p| p.tx.clone()))
            .take(max)
            .collect()
    }

    pub fn remove(&self, hash: &Hash) -> Option<Transaction> {
        self.inner.write().remove(hash)
    }

    /// Drop transactions a block included, plus anything their senders'
    /// nonces have now passed.
    pub fn remove_included(&self, included: &[Transaction]) -> usize {
        let mut inner = self.inner.write();
        let mut removed = 0;
        for tx in included {
            let stale: Vec<Hash> = inner
                .by_sender
                .get(&tx.sender)
                .map(|nonces| nonces.range(..=tx.nonce).map(|(_, h)| *h).collect())
                .unwrap_or_default();
            for hash in stale {
                if inner.remove(&hash).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Drop every transaction whose nonce is below what the ledger expects.
    pub fn prune_stale(&self, next_nonce: impl Fn(&Address) -> u64) -> usize {
        let mut inner = self.inner.write();
        let stale: Vec<Hash> = inner
            .by_sender
            .iter()
            .flat_map(|(sender, nonces)| {
                let expected = next_nonce(sender);
                nonces.range(..expected).map(|(_, h)| *h)
            })
            .collect();
        for hash in &stale {
            inner.remove(hash);
        }
        stale.len()
    }
}
