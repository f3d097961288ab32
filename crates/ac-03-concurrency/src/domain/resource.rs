//! Lock identities and modes.

use shared_types::{to_hex, Address, ContractId, Hash};
use std::fmt;

/// Name of a lockable resource, e.g. `contract:42`.
///
/// Ordering is lexicographic and is the global acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn contract(id: ContractId) -> Self {
        Self(format!("contract:{id:020}"))
    }

    pub fn account(address: &Address) -> Self {
        Self(format!("account:{}", to_hex(address)))
    }

    pub fn archive(content_hash: &Hash) -> Self {
        Self(format!("archive:{}", to_hex(content_hash)))
    }

    /// The whole ledger. Exclusive while a block applies; every other
    /// mutation holds it shared.
    pub fn ledger() -> Self {
        Self("ledger".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lock strength. Declaration order is strength order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockMode {
    Shared,
    Upgrade,
    Exclusive,
}

impl LockMode {
    /// Whether a guard held in `self` grants at least `wanted`.
    pub fn covers(self, wanted: LockMode) -> bool {
        match (self, wanted) {
            (Self::Exclusive, _) => true,
            (Self::Upgrade, Self::Shared | Self::Upgrade) => true,
            (Self::Shared, Self::Shared) => true,
            _ => false,
        }
    }
}
