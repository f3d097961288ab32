//! Local content access for checking storage proofs.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{keccak256, Hash};
use std::collections::HashMap;

/// Where the node keeps its own copy of archived content.
///
/// The archiver pipeline that fills it is outside this crate.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Bytes stored under `content_hash`, if held locally.
    async fn fetch(&self, content_hash: &Hash) -> Option<Vec<u8>>;
}

/// Content addressed by its Keccak-256 digest, held in memory.
#[derive(Debug, Default)]
pub struct InMemoryContentSource {
    blobs: RwLock<HashMap<Hash, Vec<u8>>>,
}

impl InMemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `content`; returns its content hash.
    pub fn put(&self, content: impl Into<Vec<u8>>) -> Hash {
        let content = content.into();
        let hash = keccak256(&content);
        self.blobs.write().insert(hash, content);
        hash
    }

    pub fn remove(&self, content_hash: &Hash) -> bool {
        self.blobs.write().remove(content_hash).is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentSource for InMemoryContentSource {
    async fn fetch(&self, content_hash: &Hash) -> Option<Vec<u8>> {
        self.blobs.read().get(content_hash).cloned()
    }
}
