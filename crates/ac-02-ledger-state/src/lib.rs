//! # Ledger State
//!
//! Sole owner of accounts, archive records, validator records and contract
//! instances. Other components never keep private copies: they read through
//! [`Ledger::read`] and mutate through [`Ledger::write`] while holding the
//! concurrency-manager locks that [`StateKey::resource`] names.
//!
//! ## Snapshots
//!
//! - [`Ledger`] is [`Snapshottable`](ac_04_recovery::Snapshottable) as a
//!   whole; block application checkpoints the full state.
//! - [`Ledger::scope`] yields a snapshot over a handful of entries, so a
//!   contract vote can roll back without clobbering unrelated concurrent
//!   changes.
//!
//! ## Block store
//!
//! [`BlockStore`] keeps blocks by hash with a canonical height index and the
//! retained post-state snapshots used for reorgs.

pub mod block_store;
pub mod domain;
pub mod ledger;
pub mod metrics;

pub use block_store::{BlockStore, StoredBlock};
pub use domain::contracts::{
    BountyContract, ContractInstance, ContractKind, ContractStatus, PoolStatus, PreservationPool,
    Submission, VerificationContract, VoteTally,
};
pub use domain::entities::{
    Account, ArchiveRecord, LedgerCounters, ValidatorRecord, DEFAULT_REPUTATION_BPS,
};
pub use domain::error::{LedgerError, LedgerResult};
pub use ledger::{Ledger, LedgerTxn, LedgerView, ScopedState, StateKey};
