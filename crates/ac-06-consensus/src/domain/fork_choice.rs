//! # Fork Choice
//!
//! Longest valid chain wins. On equal height the tip with the earlier
//! timestamp wins; equal timestamps keep the current chain.

use shared_types::{Hash, Timestamp};

/// What fork choice compares about a chain tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    pub hash: Hash,
    pub height: u64,
    pub timestamp: Timestamp,
}

/// Whether `candidate` should replace `current` as the canonical tip.
pub fn prefers(candidate: &ChainTip, current: &ChainTip) -> bool {
    match candidate.height.cmp(&current.height) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate.timestamp < current.timestamp,
    }
}
