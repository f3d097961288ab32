//! Binary Keccak-256 merkle tree over transaction hashes. An odd node is
//! paired with itself; an empty block has the zero root.

use shared_types::{keccak256, Hash, Transaction, ZERO_HASH};

pub fn merkle_root(transactions: &[Transaction]) -> Hash {
    let leaves: Vec<Hash> = transactions.iter().map(Transaction::hash).collect();
    merkle_root_of(leaves)
}

pub fn merkle_root_of(mut level: Vec<Hash>) -> Hash {
    if level.is_empty() {
        return ZERO_HASH;
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(&pair[0]);
                buf[32..].copy_from_slice(right);
                keccak256(&buf)
            })
            .collect();
    }
    level[0]
}
