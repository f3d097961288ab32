//! # Equivocation Detection
//!
//! A validator that signs two different blocks at the same height loses a
//! fraction of its stake. Only headers of blocks that passed the authority
//! checks are observed; the two signed headers are the evidence, which goes
//! on chain so every node slashes at the same block.

use shared_types::{Address, BlockHeader, Hash};
use std::collections::{HashMap, HashSet};

/// Two distinct signed headers from one validator at one height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquivocationEvidence {
    pub first: BlockHeader,
    pub second: BlockHeader,
}

impl EquivocationEvidence {
    pub fn validator(&self) -> Address {
        self.first.validator
    }

    pub fn height(&self) -> u64 {
        self.first.number
    }
}

/// Tracks which header each validator signed per height.
#[derive(Debug, Default)]
pub struct EquivocationDetector {
    signed: HashMap<(Address, u64), (Hash, BlockHeader)>,
    /// (validator, height) pairs already reported.
    reported: HashSet<(Address, u64)>,
}

impl EquivocationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a header that made it into the block store.
    ///
    /// Returns evidence the first time a conflicting header shows up;
    /// repeats of the same offence return `None`.
    pub fn observe(&mut self, header: &BlockHeader) -> Option<EquivocationEvidence> {
        let key = (header.validator, header.number);
        let hash = header.signing_hash();
        let (first_hash, first) = self
            .signed
            .entry(key)
            .or_insert_with(|| (hash, header.clone()));
        if *first_hash == hash || !self.reported.insert(key) {
            return None;
        }
        Some(EquivocationEvidence {
            first: first.clone(),
            second: header.clone(),
        })
    }

    /// Forget headers below `height`.
    pub fn prune_below(&mut self, height: u64) {
        self.signed.retain(|(_, h), _| *h >= height);
        self.reported.retain(|(_, h)| *h >= height);
    }

    pub fn tracked(&self) -> usize {
        self.signed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(validator: u8, number: u64, state_root: u8) -> BlockHeader {
        BlockHeader {
            number,
            parent_hash: [0; 32],
            merkle_root: [0; 32],
            state_root: [state_root; 32],
            timestamp: 10,
            validator: [validator; 20],
            difficulty: 0,
            signature: None,
        }
    }

    #[test]
    fn test_detects_double_sign_once() {
        let mut detector = EquivocationDetector::new();
        assert!(detector.observe(&header(1, 5, 0xA)).is_none());
        assert!(detector.observe(&header(1, 5, 0xA)).is_none());

        let evidence = detector.observe(&header(1, 5, 0xB)).unwrap();
        assert_eq!(evidence.first, header(1, 5, 0xA));
        assert_eq!(evidence.second, header(1, 5, 0xB));
        assert_eq!(evidence.height(), 5);

        // Same offence again, or a third block: already reported.
        assert!(detector.observe(&header(1, 5, 0xB)).is_none());
        assert!(detector.observe(&header(1, 5, 0xC)).is_none());
    }

    #[test]
    fn test_different_validators_do_not_conflict() {
        let mut detector = EquivocationDetector::new();
        assert!(detector.observe(&header(1, 5, 0xA)).is_none());
        assert!(detector.observe(&header(2, 5, 0xB)).is_none());
        assert!(detector.observe(&header(1, 6, 0xB)).is_none());

        detector.prune_below(6);
        assert_eq!(detector.tracked(), 1);
    }
}
