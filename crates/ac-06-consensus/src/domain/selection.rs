//! # Producer Selection
//!
//! 1. Candidates are the validators meeting threshold and stake.
//! 2. The last producer drops out once it hit the consecutive cap, and
//!    otherwise with `rotation_probability`. It stays in when it is the
//!    only candidate.
//! 3. One candidate is drawn with probability proportional to score.
//!
//! The RNG is seeded from the parent hash, so every node computes the same
//! producer for the same parent.

use super::config::ConsensusConfig;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared_types::{Address, Hash};

/// The previous block's producer and its current streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastProducer {
    pub address: Address,
    pub streak: u32,
}

pub fn rng_for_parent(parent_hash: &Hash) -> StdRng {
    StdRng::from_seed(*parent_hash)
}

/// Candidates left after the rotation rule.
pub fn apply_rotation<R: Rng>(
    candidates: &[(Address, f64)],
    last: Option<LastProducer>,
    config: &ConsensusConfig,
    rng: &mut R,
) -> Vec<(Address, f64)> {
    let Some(last) = last else {
        return candidates.to_vec();
    };
    let others: Vec<(Address, f64)> = candidates
        .iter()
        .filter(|(a, _)| *a != last.address)
        .copied()
        .collect();
    if others.is_empty() {
        return candidates.to_vec();
    }

    let capped = last.streak >= config.max_consecutive_blocks;
    // Draw unconditionally so the RNG stream does not depend on the streak.
    let forced = rng.gen_bool(config.rotation_probability.clamp(0.0, 1.0));
    if capped || forced {
        others
    } else {
        candidates.to_vec()
    }
}

/// Weighted draw over `candidates`. `None` if empty or all weights are zero.
pub fn weighted_choice<R: Rng>(candidates: &[(Address, f64)], rng: &mut R) -> Option<Address> {
    let weights = candidates.iter().map(|(_, score)| score.max(0.0));
    let index = WeightedIndex::new(weights).ok()?;
    candidates.get(index.sample(rng)).map(|(a, _)| *a)
}

/// Producer of the block after `parent_hash`.
pub fn select_producer(
    parent_hash: &Hash,
    candidates: &[(Address, f64)],
    last: Option<LastProducer>,
    config: &ConsensusConfig,
) -> Option<Address> {
    let mut rng = rng_for_parent(parent_hash);
    let pool = apply_rotation(candidates, last, config, &mut rng);
    weighted_choice(&pool, &mut rng)
}
