//! # Contract Runtime Service
//!
//! Entry point for contract operations made outside block application:
//! direct validator votes and preservation challenges.
//!
//! A node that shares its chain with peers must not write the ledger here;
//! it checks with [`ContractRuntime::preview_vote`] and
//! [`ContractRuntime::check_preservation_proof`], then submits the matching
//! transaction so the change lands in block order. [`ContractRuntime::vote`]
//! is for a ledger nobody else replays.
//!
//! ## Atomicity
//!
//! Every operation follows one sequence:
//!
//! 1. Read the ledger entries the operation may touch.
//! 2. Lock them Exclusive (plus the ledger resource Shared, so block
//!    application cannot interleave) in global order.
//! 3. Re-read the entry set; if it grew while waiting, widen and re-lock.
//! 4. Checkpoint exactly those entries, run the executor, roll back on error.
//! 5. Release, then publish the buffered events.
//!
//! Two votes on one contract therefore serialize on `contract:<id>`, and
//! only one of them can observe the quorum.

use crate::domain::{ContentSource, ContractConfig, ContractError, ContractResult};
use crate::executor::{load_pool, ContractExecutor};
use crate::metrics;
use ac_02_ledger_state::{Ledger, LedgerTxn, LedgerView, StateKey};
use ac_03_concurrency::{LockManager, LockMode, ResourceId};
use ac_04_recovery::RecoveryManager;
use shared_bus::{ChainEvent, EventPublisher};
use shared_crypto::{Challenge, ChallengeId, ChallengeManager, CryptoError, Digest};
use shared_types::{to_hex, Address, ContractId, TimeSource, VoteChoice};
use std::collections::BTreeSet;
use std::iter;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Times a lock set may be widened before the attempt gives up.
const MAX_LOCK_WIDENINGS: u32 = 4;

/// Collaborators of [`ContractRuntime`].
pub struct ContractDependencies {
    pub ledger: Arc<Ledger>,
    pub locks: Arc<LockManager>,
    pub recovery: Arc<RecoveryManager>,
    pub bus: Arc<dyn EventPublisher>,
    pub challenges: Arc<ChallengeManager>,
    pub content: Arc<dyn ContentSource>,
    pub time: Arc<dyn TimeSource>,
    pub config: ContractConfig,
}

pub struct ContractRuntime {
    executor: ContractExecutor,
    ledger: Arc<Ledger>,
    locks: Arc<LockManager>,
    recovery: Arc<RecoveryManager>,
    bus: Arc<dyn EventPublisher>,
    challenges: Arc<ChallengeManager>,
    content: Arc<dyn ContentSource>,
    time: Arc<dyn TimeSource>,
}

impl ContractRuntime {
    pub fn new(deps: ContractDependencies) -> Self {
        Self {
            executor: ContractExecutor::new(deps.config),
            ledger: deps.ledger,
            locks: deps.locks,
            recovery: deps.recovery,
            bus: deps.bus,
            challenges: deps.challenges,
            content: deps.content,
            time: deps.time,
        }
    }

    pub fn executor(&self) -> &ContractExecutor {
        &self.executor
    }

    // =========================================================================
    // VOTING
    // =========================================================================

    /// Cast `voter`'s vote on a bounty or verification contract.
    ///
    /// Returns true if this vote resolved the contract.
    #[instrument(skip(self, voter), fields(voter = %to_hex(&voter)))]
    pub async fn vote(
        &self,
        contract_id: ContractId,
        voter: Address,
        choice: VoteChoice,
    ) -> ContractResult<bool> {
        let executor = &self.executor;
        let time = &self.time;
        self.recovery
            .run("contract.vote", |_| {
                self.locked_section(
                    "contract.vote",
                    contract_id,
                    move |view| executor.vote_scope(view, contract_id, voter),
                    move |txn, events| {
                        executor.apply_vote(txn, contract_id, voter, choice, time.now(), events)
                    },
                )
            })
            .await
    }

    /// Check `voter`'s ballot against current state. Returns true if it
    /// would resolve the contract. Writes nothing.
    pub fn preview_vote(
        &self,
        contract_id: ContractId,
        voter: Address,
        choice: VoteChoice,
    ) -> ContractResult<bool> {
        let now = self.time.now();
        self.ledger.read(|view| {
            self.executor
                .preview_vote(view, contract_id, voter, choice, now)
        })
    }

    /// Validator verdict on a bounty submission or archive.
    pub async fn verify_submission(
        &self,
        contract_id: ContractId,
        validator: Address,
        is_valid: bool,
    ) -> ContractResult<bool> {
        self.vote(contract_id, validator, VoteChoice::from_valid(is_valid))
            .await
    }

    // =========================================================================
    // PRESERVATION
    // =========================================================================

    /// Challenge every preserver of `pool_id` to prove it holds the content.
    pub fn issue_preservation_challenges(
        &self,
        pool_id: ContractId,
    ) -> ContractResult<Vec<Challenge>> {
        let pool = self.ledger.read(|view| load_pool(view, pool_id))?;
        pool.preservers
            .iter()
            .map(|preserver| {
                self.challenges
                    .generate_secure_challenge(*preserver, pool.content_hash)
                    .map_err(ContractError::from)
            })
            .collect()
    }

    /// Check a storage proof for `pool_id` against the local copy of its
    /// content. The challenge is consumed even if the proof is rejected.
    ///
    /// Nothing is credited here: the caller attests the proof on chain.
    #[instrument(skip(self, challenge_id, preserver, response), fields(preserver = %to_hex(&preserver)))]
    pub async fn check_preservation_proof(
        &self,
        pool_id: ContractId,
        challenge_id: ChallengeId,
        preserver: Address,
        response: Digest,
    ) -> ContractResult<()> {
        let pool = self.ledger.read(|view| load_pool(view, pool_id))?;
        if !pool.preservers.contains(&preserver) {
            return Err(ContractError::NotAPreserver { pool_id, preserver });
        }
        let content_hash = pool.content_hash;
        let challenge = self
            .challenges
            .get(&challenge_id)
            .ok_or(CryptoError::ChallengeNotFound)?;
        if challenge.archive_id != content_hash {
            return Err(ContractError::TargetMismatch {
                id: pool_id,
                content_hash: challenge.archive_id,
            });
        }

        let reference = self
            .content
            .fetch(&content_hash)
            .await
            .ok_or(ContractError::ContentUnavailable { content_hash })?;
        self.challenges
            .verify_response(&challenge_id, &preserver, &response, &reference)?;
        debug!(pool_id, "Storage proof accepted");
        Ok(())
    }

    // =========================================================================
    // CRITICAL SECTION
    // =========================================================================

    /// Lock the entries `scope` names, then run `op` under a checkpoint of
    /// exactly those entries. Events `op` emits are published after release.
    async fn locked_section<T, K, F>(
        &self,
        operation: &'static str,
        contract_id: ContractId,
        scope: K,
        op: F,
    ) -> ContractResult<T>
    where
        K: Fn(&LedgerView<'_>) -> ContractResult<BTreeSet<StateKey>> + Send,
        F: FnOnce(&mut LedgerTxn<'_>, &mut Vec<ChainEvent>) -> ContractResult<T> + Send,
        T: Send,
    {
        let timeout = self.executor.config().lock_timeout();
        let session = self.locks.session(operation);
        let mut keys = self.ledger.read(|view| scope(view))?;
        let mut widenings = 0;

        let guard = loop {
            let requests: Vec<(ResourceId, LockMode)> = keys
                .iter()
                .map(|k| (k.resource(), LockMode::Exclusive))
                .chain(iter::once((ResourceId::ledger(), LockMode::Shared)))
                .collect();
            let guard = session.acquire_all(requests, timeout).await?;

            let current = self.ledger.read(|view| scope(view))?;
            if current.is_subset(&keys) {
                break guard;
            }
            drop(guard);
            widenings += 1;
            metrics::record_lock_widening();
            if widenings > MAX_LOCK_WIDENINGS {
                return Err(ContractError::ParticipantsChanged { id: contract_id });
            }
            debug!(contract_id, widenings, "Participants changed; widening lock set");
            keys.extend(current);
        };

        let mut events = Vec::new();
        let value = {
            let scoped = self.ledger.scope(keys.iter().cloned());
            self.recovery.checkpointed(operation, &scoped, || {
                self.ledger.write(|txn| op(txn, &mut events))
            })?
        };
        drop(guard);

        if !events.is_empty() {
            self.bus.publish_all(events).await;
        }
        Ok(value)
    }
}
