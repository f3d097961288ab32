//! # Contract Runtime
//!
//! The three built-in contract types of the archive chain:
//!
//! | Contract | Lifecycle |
//! |----------|-----------|
//! | Bounty | Open → InProgress (submission) → Completed / Rejected, or Expired at the deadline |
//! | Verification | Open → Completed / Rejected once the archive reaches quorum |
//! | Preservation pool | Active, paying proven preservers per epoch, Closed when drained |
//!
//! ## Layers
//!
//! - [`ContractExecutor`]: pure ledger logic. Used by block application and
//!   by the runtime; never takes locks itself.
//! - [`ContractRuntime`]: async entry point for direct votes, expiry and
//!   storage proofs. Owns lock acquisition, checkpoints and retries.
//!
//! Quorum is `required_votes` votes cast. At quorum the contract is
//! approved on a strict majority of valid votes and rejected otherwise. Payouts are
//! escrowed at creation, so settlement only ever credits.

pub mod domain;
pub mod executor;
pub mod metrics;
pub mod service;

pub use domain::{
    ContentSource, ContractConfig, ContractError, ContractResult, InMemoryContentSource,
};
pub use executor::{ContractExecutor, TxContext};
pub use service::{ContractDependencies, ContractRuntime};
