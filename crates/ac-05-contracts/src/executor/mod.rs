//! # Contract Executor
//!
//! Synchronous contract logic over a [`LedgerTxn`]. Block application calls
//! it directly under the ledger-wide lock; [`ContractRuntime`] calls it
//! under per-contract locks for operations made outside a block.
//!
//! Every function validates before it writes where it can. Where a later
//! step can still fail (a payout hitting the supply ceiling), the caller's
//! checkpoint restores the entries touched so far. Events are appended to
//! the caller's buffer and must only be published after commit.
//!
//! [`ContractRuntime`]: crate::ContractRuntime

mod archive;
mod bounty;
mod pool;
mod voting;

use crate::domain::{ContractConfig, ContractError, ContractResult};
use ac_02_ledger_state::{
    BountyContract, ContractInstance, ContractKind, LedgerError, LedgerView, PreservationPool,
};
use shared_types::{ContractId, Hash, Timestamp};

/// Where in the chain a contract call happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxContext {
    /// Hash of the transaction, or zero for direct calls.
    pub tx_hash: Hash,
    pub block_number: u64,
    pub timestamp: Timestamp,
}

impl TxContext {
    pub fn new(tx_hash: Hash, block_number: u64, timestamp: Timestamp) -> Self {
        Self {
            tx_hash,
            block_number,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContractExecutor {
    config: ContractConfig,
}

impl ContractExecutor {
    pub fn new(config: ContractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }
}

pub(crate) fn instance<'a>(view: &LedgerView<'a>, id: ContractId) -> ContractResult<&'a ContractInstance> {
    view.contract(id)
        .ok_or(ContractError::Ledger(LedgerError::ContractNotFound { id }))
}

pub(crate) fn load_bounty(view: &LedgerView<'_>, id: ContractId) -> ContractResult<BountyContract> {
    match instance(view, id)? {
        ContractInstance::Bounty(b) => Ok(b.clone()),
        other => Err(ContractError::WrongKind {
            id,
            expected: ContractKind::Bounty,
            actual: other.kind(),
        }),
    }
}

pub(crate) fn load_pool(view: &LedgerView<'_>, id: ContractId) -> ContractResult<PreservationPool> {
    match instance(view, id)? {
        ContractInstance::PreservationPool(p) => Ok(p.clone()),
        other => Err(ContractError::WrongKind {
            id,
            expected: ContractKind::PreservationPool,
            actual: other.kind(),
        }),
    }
}
