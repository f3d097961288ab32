//! # Consensus Engine
//!
//! Imports and produces blocks under Proof of Archive.
//!
//! ## Import pipeline
//!
//! 1. Stateless checks: structure, producer signature, merkle root and
//!    transaction signatures (batch verified).
//! 2. Under the Exclusive ledger lock and a full-ledger checkpoint: authority
//!    (height, timestamp, stake, score, difficulty, rotation, spacing), then
//!    every transaction in order, then block bookkeeping. The resulting state
//!    root must equal the declared one. Any failure restores the checkpoint.
//! 3. Blocks off the canonical tip are executed the same way on a scratch
//!    ledger restored from their parent's post-state, and stored as fork
//!    candidates only if that succeeds. When one wins fork choice the ledger
//!    restarts from the common ancestor's post-state and replays the branch.
//! 4. Every stored header feeds the equivocation detector. Evidence is
//!    queued for [`ConsensusEngine::take_evidence`]; the penalty itself is a
//!    transaction, so all nodes slash in the same block.
//!
//! Only failures intrinsic to a block mark it invalid. A block rejected for
//! a clock or availability reason can be imported again later.
//!
//! Events are published only after the lock is released.

use crate::domain::score::{eligible_validators, score_of, validator_state};
use crate::domain::selection::select_producer;
use crate::domain::{
    merkle_root, prefers, ChainTip, ConsensusConfig, ConsensusError, ConsensusResult,
    EquivocationDetector, EquivocationEvidence, LastProducer, ScoreBreakdown, ValidatorState,
};
use crate::execution::{apply_transaction, execute_body, finish_block};
use crate::metrics;
use crate::validation::BlockValidator;
use ac_02_ledger_state::{BlockStore, Ledger, LedgerError, LedgerView};
use ac_03_concurrency::{LockManager, LockMode, ResourceId};
use ac_04_recovery::{Checkpoint, RecoveryManager, Snapshottable};
use ac_05_contracts::{ContractExecutor, TxContext};
use parking_lot::Mutex;
use shared_bus::{ChainEvent, EventPublisher};
use shared_crypto::{sign_block_header, verify_transaction, PrivateKey};
use shared_types::{
    to_hex, Address, Block, BlockHeader, Hash, TimeSource, Timestamp, Transaction, ZERO_HASH,
};
use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Collaborators of [`ConsensusEngine`].
pub struct ConsensusDependencies {
    pub ledger: Arc<Ledger>,
    pub blocks: Arc<BlockStore>,
    pub locks: Arc<LockManager>,
    pub recovery: Arc<RecoveryManager>,
    pub bus: Arc<dyn EventPublisher>,
    pub time: Arc<dyn TimeSource>,
    pub contracts: ContractExecutor,
    pub config: ConsensusConfig,
}

/// What importing a block did to the chain.
#[derive(Debug, Clone)]
pub enum ImportOutcome {
    AlreadyKnown,
    /// Applied on top of the canonical tip.
    Extended { height: u64 },
    /// Valid so far but on a shorter fork; kept as a candidate.
    ForkStored { height: u64 },
    /// A fork overtook the canonical chain.
    Reorganized {
        old_tip: Hash,
        new_tip: Hash,
        depth: u64,
        /// Transactions of replaced blocks absent from the new branch.
        orphaned: Vec<Transaction>,
    },
}

/// A signed block ready for import and broadcast.
#[derive(Debug, Clone)]
pub struct ProducedBlock {
    pub block: Block,
    /// Candidates left out, with the reason.
    pub skipped: Vec<(Hash, ConsensusError)>,
}

struct Replayed {
    block: Arc<Block>,
    events: Vec<ChainEvent>,
}

pub struct ConsensusEngine {
    ledger: Arc<Ledger>,
    blocks: Arc<BlockStore>,
    locks: Arc<LockManager>,
    recovery: Arc<RecoveryManager>,
    bus: Arc<dyn EventPublisher>,
    time: Arc<dyn TimeSource>,
    contracts: ContractExecutor,
    config: ConsensusConfig,
    detector: Mutex<EquivocationDetector>,
    evidence: Mutex<Vec<EquivocationEvidence>>,
    /// Blocks that failed validation, with their height. Their descendants
    /// are refused.
    invalid: Mutex<HashMap<Hash, u64>>,
}

impl ConsensusEngine {
    pub fn new(deps: ConsensusDependencies) -> Self {
        Self {
            ledger: deps.ledger,
            blocks: deps.blocks,
            locks: deps.locks,
            recovery: deps.recovery,
            bus: deps.bus,
            time: deps.time,
            contracts: deps.contracts,
            config: deps.config,
            detector: Mutex::new(EquivocationDetector::new()),
            evidence: Mutex::new(Vec::new()),
            invalid: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn blocks(&self) -> &Arc<BlockStore> {
        &self.blocks
    }

    /// Seal the current ledger as block 0. Genesis allocations must already
    /// be in the ledger. Returns the existing genesis if one is installed.
    pub fn install_genesis(&self, timestamp: Timestamp) -> ConsensusResult<Block> {
        if let Some(existing) = self.blocks.get_by_number(0) {
            return Ok(existing.as_ref().clone());
        }
        let header = BlockHeader {
            number: 0,
            parent_hash: ZERO_HASH,
            merkle_root: merkle_root(&[]),
            state_root: self.ledger.state_root()?,
            timestamp,
            validator: [0u8; 20],
            difficulty: 0,
            signature: None,
        };
        let block = Block {
            header,
            transactions: Vec::new(),
        };
        let hash = self.blocks.insert(block.clone());
        self.blocks.set_canonical(&hash)?;
        self.blocks.set_post_state(&hash, self.ledger.snapshot()?);
        info!(hash = %to_hex(&hash), "Genesis installed");
        Ok(block)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn tip(&self) -> Option<ChainTip> {
        let (height, hash) = self.blocks.tip()?;
        let block = self.blocks.get(&hash)?;
        Some(ChainTip {
            hash,
            height,
            timestamp: block.header.timestamp,
        })
    }

    pub fn score_breakdown(&self, address: &Address) -> Option<ScoreBreakdown> {
        self.ledger
            .read(|view| score_of(view, address, &self.config))
    }

    pub fn validator_score(&self, address: &Address) -> Option<f64> {
        self.score_breakdown(address).map(|s| s.total)
    }

    pub fn validator_state(&self, address: &Address) -> ValidatorState {
        self.ledger
            .read(|view| validator_state(view, address, &self.config))
    }

    pub fn eligible_validators(&self) -> Vec<(Address, f64)> {
        self.ledger
            .read(|view| eligible_validators(view, &self.config))
    }

    /// Producer selection for the block after the current tip.
    pub fn expected_producer(&self) -> Option<Address> {
        let (_, tip) = self.blocks.tip()?;
        self.ledger.read(|view| self.expected_in(view, &tip))
    }

    fn expected_in(&self, view: &LedgerView<'_>, parent_hash: &Hash) -> Option<Address> {
        let candidates = eligible_validators(view, &self.config);
        let last = view.counters().last_producer.map(|address| LastProducer {
            address,
            streak: view.validator(&address).map_or(0, |v| v.consecutive_blocks),
        });
        select_producer(parent_hash, &candidates, last, &self.config)
    }

    /// Admission check for the mempool: terms, signature, and that the
    /// sender can still pay the fee at a nonce not yet used.
    pub fn check_transaction(&self, tx: &Transaction) -> ConsensusResult<()> {
        verify_transaction(tx)
            .map_err(|source| ConsensusError::TransactionSignature { index: 0, source })?;
        self.check_admission(tx)
    }

    /// [`check_transaction`](Self::check_transaction) for a transaction
    /// whose signature was already verified.
    pub fn check_admission(&self, tx: &Transaction) -> ConsensusResult<()> {
        BlockValidator::validate_transaction_terms(tx, 0, self.time.now(), &self.config)?;
        self.ledger
            .read(|view| {
                let expected = view.nonce(&tx.sender);
                if tx.nonce < expected {
                    return Err(LedgerError::InvalidNonce {
                        address: tx.sender,
                        expected,
                        actual: tx.nonce,
                    });
                }
                let available = view.balance(&tx.sender);
                if available < tx.fee {
                    return Err(LedgerError::InsufficientBalance {
                        address: tx.sender,
                        required: tx.fee,
                        available,
                    });
                }
                Ok(())
            })
            .map_err(|e| ConsensusError::Transaction {
                index: 0,
                source: e.into(),
            })
    }

    // =========================================================================
    // IMPORT
    // =========================================================================

    /// Validate `block` and attach it to the chain.
    #[instrument(skip(self, block), fields(height = block.number()))]
    pub async fn import_block(&self, block: Block) -> ConsensusResult<ImportOutcome> {
        let hash = block.hash();
        let result = self.import(&block, hash).await;
        if let Err(e) = &result {
            metrics::record_block_rejected(e.reason());
            warn!(hash = %to_hex(&hash), reason = e.reason(), error = %e, "Block rejected");
            self.bus
                .publish(ChainEvent::BlockRejected {
                    hash,
                    reason: e.to_string(),
                })
                .await;
        }
        result
    }

    async fn import(&self, block: &Block, hash: Hash) -> ConsensusResult<ImportOutcome> {
        if self.is_known_invalid(&hash, &block.parent_hash()) {
            self.mark_invalid([(hash, block.number())]);
            return Err(ConsensusError::KnownInvalid(hash));
        }
        if self.blocks.contains(&hash) {
            return Ok(ImportOutcome::AlreadyKnown);
        }

        BlockValidator::validate_stateless(block, &self.config)?;

        self.recovery
            .run("consensus.block", |_| self.import_locked(block, hash))
            .await
    }

    async fn import_locked(&self, block: &Block, hash: Hash) -> ConsensusResult<ImportOutcome> {
        let session = self.locks.session("consensus.block");
        let guard = session
            .acquire_within(
                ResourceId::ledger(),
                LockMode::Exclusive,
                self.config.block_lock_timeout(),
            )
            .await?;

        if self.blocks.contains(&hash) {
            return Ok(ImportOutcome::AlreadyKnown);
        }
        let parent_hash = block.parent_hash();
        let parent = self
            .blocks
            .get(&parent_hash)
            .ok_or(ConsensusError::UnknownParent(parent_hash))?;
        let tip = self.tip().ok_or(ConsensusError::MissingGenesis)?;

        if parent_hash == tip.hash {
            let applied = self
                .recovery
                .checkpointed("consensus.block", self.ledger.as_ref(), || {
                    self.apply_block(&self.ledger, block, &parent.header)
                });
            let events = match applied {
                Ok(events) => events,
                Err(e) => {
                    if e.is_block_fault() {
                        self.mark_invalid([(hash, block.number())]);
                    }
                    return Err(e);
                }
            };
            let post_state = self.ledger.snapshot()?;
            self.blocks.insert(block.clone());
            self.blocks.set_canonical(&hash)?;
            self.blocks.set_post_state(&hash, post_state);
            self.observe(&block.header);
            self.prune(block.number());
            drop(guard);

            self.announce(block, hash, events).await;
            return Ok(ImportOutcome::Extended {
                height: block.number(),
            });
        }

        self.store_fork(block, hash, &parent)?;
        let candidate = ChainTip {
            hash,
            height: block.number(),
            timestamp: block.header.timestamp,
        };
        if !prefers(&candidate, &tip) {
            debug!(hash = %to_hex(&hash), tip = tip.height, "Stored fork block");
            return Ok(ImportOutcome::ForkStored {
                height: block.number(),
            });
        }

        let (outcome, replayed) = self.reorganize(hash, &tip)?;
        drop(guard);

        for step in replayed {
            self.announce(&step.block, step.block.hash(), step.events)
                .await;
        }
        if let ImportOutcome::Reorganized {
            old_tip,
            new_tip,
            depth,
            ..
        } = &outcome
        {
            self.bus
                .publish(ChainEvent::ChainReorganized {
                    old_tip: *old_tip,
                    new_tip: *new_tip,
                    depth: *depth,
                })
                .await;
        }
        Ok(outcome)
    }

    /// Execute a block that does not extend the tip against its parent's
    /// post-state on a scratch ledger, then keep it with its own post-state.
    fn store_fork(&self, block: &Block, hash: Hash, parent: &Block) -> ConsensusResult<()> {
        let parent_hash = block.parent_hash();
        let base = self
            .blocks
            .post_state(&parent_hash)
            .ok_or(ConsensusError::StateUnavailable(parent_hash))?;
        let scratch = Ledger::new(self.ledger.math());
        scratch.restore(base.as_slice())?;
        if let Err(e) = self.apply_block(&scratch, block, &parent.header) {
            if e.is_block_fault() {
                self.mark_invalid([(hash, block.number())]);
            }
            return Err(e);
        }
        let post_state = scratch.snapshot()?;
        self.blocks.insert(block.clone());
        self.blocks.set_post_state(&hash, post_state);
        self.observe(&block.header);
        Ok(())
    }

    /// Switch the canonical chain to end at `new_tip`. Caller holds the
    /// ledger lock.
    fn reorganize(
        &self,
        new_tip: Hash,
        current: &ChainTip,
    ) -> ConsensusResult<(ImportOutcome, Vec<Replayed>)> {
        let (ancestor, branch) = self.blocks.branch_from_canonical(&new_tip)?;
        let ancestor_block = self
            .blocks
            .get(&ancestor)
            .ok_or(ConsensusError::UnknownParent(ancestor))?;
        let depth = current.height.saturating_sub(ancestor_block.number());
        if depth > self.config.max_reorg_depth {
            return Err(ConsensusError::ReorgTooDeep {
                depth,
                limit: self.config.max_reorg_depth,
            });
        }
        let base = self
            .blocks
            .post_state(&ancestor)
            .ok_or(ConsensusError::StateUnavailable(ancestor))?;

        let mut failed_at = None;
        let result = self.recovery.checkpointed(
            "consensus.reorg",
            self.ledger.as_ref(),
            || -> ConsensusResult<Vec<(Replayed, Vec<u8>)>> {
                self.ledger.restore(base.as_slice())?;
                let mut parent = ancestor_block.header.clone();
                let mut replayed = Vec::with_capacity(branch.len());
                for (index, block) in branch.iter().enumerate() {
                    let events = self.apply_block(&self.ledger, block, &parent).map_err(|e| {
                        failed_at = Some(index);
                        e
                    })?;
                    let post_state = self.ledger.snapshot()?;
                    replayed.push((
                        Replayed {
                            block: block.clone(),
                            events,
                        },
                        post_state,
                    ));
                    parent = block.header.clone();
                }
                Ok(replayed)
            },
        );
        let replayed = match result {
            Ok(replayed) => replayed,
            Err(e) => {
                if let Some(index) = failed_at.filter(|_| e.is_block_fault()) {
                    self.mark_invalid(branch[index..].iter().map(|b| (b.hash(), b.number())));
                }
                return Err(e);
            }
        };

        let orphaned = self.orphaned_transactions(ancestor_block.number(), current.height, &branch);
        let mut steps = Vec::with_capacity(replayed.len());
        for (step, post_state) in replayed {
            let hash = step.block.hash();
            self.blocks.set_canonical(&hash)?;
            self.blocks.set_post_state(&hash, post_state);
            steps.push(step);
        }
        let height = branch.last().map_or(current.height, |b| b.number());
        self.prune(height);

        metrics::record_reorg();
        info!(
            old_tip = %to_hex(&current.hash),
            new_tip = %to_hex(&new_tip),
            depth,
            orphaned = orphaned.len(),
            "Chain reorganized"
        );
        Ok((
            ImportOutcome::Reorganized {
                old_tip: current.hash,
                new_tip,
                depth,
                orphaned,
            },
            steps,
        ))
    }

    /// Transactions in canonical blocks above `ancestor` that `branch` does
    /// not include.
    fn orphaned_transactions(
        &self,
        ancestor: u64,
        old_height: u64,
        branch: &[Arc<Block>],
    ) -> Vec<Transaction> {
        let kept: HashSet<Hash> = branch
            .iter()
            .flat_map(|b| b.transactions.iter().map(Transaction::hash))
            .collect();
        (ancestor + 1..=old_height)
            .filter_map(|n| self.blocks.get_by_number(n))
            .flat_map(|b| b.transactions.clone())
            .filter(|tx| !kept.contains(&tx.hash()))
            .collect()
    }

    /// Authority checks, body execution and the state root comparison,
    /// against `ledger` as it stands at `parent`.
    fn apply_block(
        &self,
        ledger: &Ledger,
        block: &Block,
        parent: &BlockHeader,
    ) -> ConsensusResult<Vec<ChainEvent>> {
        let now = self.time.now();
        let expected = ledger.read(|view| {
            self.check_authority(view, &block.header, parent, now)?;
            Ok::<_, ConsensusError>(self.expected_in(view, &block.header.parent_hash))
        })?;

        let mut events = Vec::new();
        ledger.write(|txn| {
            execute_body(
                &self.contracts,
                &self.config,
                txn,
                &block.header,
                &block.transactions,
                expected,
                &mut events,
            )
        })?;

        let computed = ledger.state_root()?;
        if computed != block.header.state_root {
            return Err(ConsensusError::StateRootMismatch {
                declared: block.header.state_root,
                computed,
            });
        }
        Ok(events)
    }

    /// May `header.validator` produce this block on top of `parent`?
    fn check_authority(
        &self,
        view: &LedgerView<'_>,
        header: &BlockHeader,
        parent: &BlockHeader,
        now: Timestamp,
    ) -> ConsensusResult<()> {
        let config = &self.config;
        if header.number != parent.number + 1 {
            return Err(ConsensusError::InvalidHeight {
                expected: parent.number + 1,
                actual: header.number,
            });
        }
        if header.timestamp <= parent.timestamp {
            return Err(ConsensusError::InvalidTimestamp {
                block: header.timestamp,
                parent: parent.timestamp,
            });
        }
        if header.timestamp > now.saturating_add(config.max_future_drift_secs) {
            return Err(ConsensusError::FutureTimestamp {
                timestamp: header.timestamp,
                current: now,
            });
        }

        let validator = header.validator;
        if view.staked(&validator) < config.min_validator_stake {
            return Err(ConsensusError::InsufficientStake { validator });
        }
        let score =
            score_of(view, &validator, config).ok_or(ConsensusError::InsufficientStake { validator })?;
        if score.total < config.min_score_threshold {
            return Err(ConsensusError::BelowThreshold {
                validator,
                score: score.total,
                threshold: config.min_score_threshold,
            });
        }
        if header.difficulty != score.bps() {
            return Err(ConsensusError::DifficultyMismatch {
                declared: header.difficulty,
                expected: score.bps(),
            });
        }

        let record = view.validator(&validator);
        if view.counters().last_producer == Some(validator) {
            let streak = record.map_or(0, |v| v.consecutive_blocks);
            let others = eligible_validators(view, config)
                .iter()
                .any(|(a, _)| *a != validator);
            if streak >= config.max_consecutive_blocks && others {
                return Err(ConsensusError::RotationViolated {
                    validator,
                    streak: streak + 1,
                });
            }
        }
        if let Some(last) = record.and_then(|v| v.last_block_at) {
            let elapsed = header.timestamp.saturating_sub(last);
            if elapsed < config.min_block_interval_secs {
                return Err(ConsensusError::BlockTooSoon {
                    validator,
                    elapsed,
                    required: config.min_block_interval_secs,
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // SLASHING
    // =========================================================================

    fn observe(&self, header: &BlockHeader) {
        let Some(evidence) = self.detector.lock().observe(header) else {
            return;
        };
        warn!(
            validator = %to_hex(&evidence.validator()),
            height = evidence.height(),
            "Validator signed two blocks at one height"
        );
        self.evidence.lock().push(evidence);
    }

    /// Drain equivocation evidence found since the last call. Reporting it
    /// on chain is up to the caller.
    pub fn take_evidence(&self) -> Vec<EquivocationEvidence> {
        mem::take(&mut *self.evidence.lock())
    }

    // =========================================================================
    // PRODUCTION
    // =========================================================================

    /// Build and sign the next block as `key`'s validator.
    ///
    /// Candidates are applied in order; any that fails is skipped and its
    /// effects rolled back. The ledger is left as it was: the block still
    /// has to go through [`import_block`](Self::import_block).
    #[instrument(skip(self, key, candidates), fields(candidates = candidates.len()))]
    pub async fn produce_block(
        &self,
        key: &PrivateKey,
        candidates: Vec<Transaction>,
    ) -> ConsensusResult<ProducedBlock> {
        let session = self.locks.session("consensus.produce");
        let _guard = session
            .acquire_within(
                ResourceId::ledger(),
                LockMode::Exclusive,
                self.config.block_lock_timeout(),
            )
            .await?;

        let validator = key.address();
        let tip = self.tip().ok_or(ConsensusError::MissingGenesis)?;
        let parent = self
            .blocks
            .get(&tip.hash)
            .ok_or(ConsensusError::UnknownParent(tip.hash))?;
        let now = self.time.now();
        let difficulty = self
            .score_breakdown(&validator)
            .map_or(0, |s| s.bps());

        let mut header = BlockHeader {
            number: tip.height + 1,
            parent_hash: tip.hash,
            merkle_root: ZERO_HASH,
            state_root: ZERO_HASH,
            timestamp: now.max(parent.header.timestamp + 1),
            validator,
            difficulty,
            signature: None,
        };
        let expected = self.ledger.read(|view| {
            self.check_authority(view, &header, &parent.header, now)?;
            Ok::<_, ConsensusError>(self.expected_in(view, &tip.hash))
        })?;

        let pre_state = Checkpoint::capture("consensus.produce", self.ledger.as_ref(), now)?;
        let built = self.build_body(&header, candidates, expected);
        if let Err(e) = pre_state.restore_into(self.ledger.as_ref()) {
            error!(error = %e, "Failed to restore ledger after block production");
            return Err(e.into());
        }
        let (transactions, skipped, state_root) = built?;

        header.merkle_root = merkle_root(&transactions);
        header.state_root = state_root;
        sign_block_header(&mut header, key).map_err(ConsensusError::InvalidSignature)?;

        info!(
            height = header.number,
            txs = transactions.len(),
            skipped = skipped.len(),
            "Block produced"
        );
        Ok(ProducedBlock {
            block: Block {
                header,
                transactions,
            },
            skipped,
        })
    }

    #[allow(clippy::type_complexity)]
    fn build_body(
        &self,
        header: &BlockHeader,
        candidates: Vec<Transaction>,
        expected: Option<Address>,
    ) -> ConsensusResult<(Vec<Transaction>, Vec<(Hash, ConsensusError)>, Hash)> {
        let mut included = Vec::new();
        let mut skipped = Vec::new();
        let mut events = Vec::new();

        for (index, tx) in candidates.into_iter().enumerate() {
            if included.len() >= self.config.max_txs_per_block {
                break;
            }
            let admissible = BlockValidator::validate_transaction_terms(
                &tx,
                index,
                header.timestamp,
                &self.config,
            )
            .and_then(|()| {
                verify_transaction(&tx)
                    .map_err(|source| ConsensusError::TransactionSignature { index, source })
            });
            if let Err(e) = admissible {
                skipped.push((tx.hash(), e));
                continue;
            }

            let ctx = TxContext::new(tx.hash(), header.number, header.timestamp);
            let applied = self
                .recovery
                .checkpointed("consensus.produce.tx", self.ledger.as_ref(), || {
                    self.ledger.write(|txn| {
                        apply_transaction(
                            &self.contracts,
                            &self.config,
                            txn,
                            &ctx,
                            header.validator,
                            &tx,
                            &mut events,
                        )
                    })
                });
            match applied {
                Ok(()) => included.push(tx),
                Err(source) => {
                    debug!(tx = %to_hex(&tx.hash()), error = %source, "Skipping transaction");
                    skipped.push((tx.hash(), ConsensusError::Transaction { index, source }));
                }
            }
        }

        self.ledger.write(|txn| {
            finish_block(&self.contracts, &self.config, txn, header, expected, &mut events)
        })?;
        let state_root = self.ledger.state_root()?;
        Ok((included, skipped, state_root))
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn announce(&self, block: &Block, hash: Hash, mut events: Vec<ChainEvent>) {
        metrics::record_block_applied(block.number());
        for _ in events
            .iter()
            .filter(|e| matches!(e, ChainEvent::ValidatorSlashed { .. }))
        {
            metrics::record_slashing();
        }
        info!(
            height = block.number(),
            hash = %to_hex(&hash),
            validator = %to_hex(&block.header.validator),
            txs = block.transactions.len(),
            "Block applied"
        );
        events.push(ChainEvent::BlockApplied {
            height: block.number(),
            hash,
            validator: block.header.validator,
            tx_count: block.transactions.len(),
        });
        self.bus.publish_all(events).await;
    }

    /// Drop everything a reorg can no longer reach: snapshots, fork blocks,
    /// equivocation records and invalid markers.
    fn prune(&self, height: u64) {
        let floor = height.saturating_sub(self.config.max_reorg_depth);
        self.blocks.prune_snapshots(floor);
        let forks = self.blocks.prune_forks(floor);
        self.detector.lock().prune_below(floor);
        self.invalid.lock().retain(|_, number| *number >= floor);
        if forks > 0 {
            debug!(floor, forks, "Pruned fork blocks");
        }
    }

    fn is_known_invalid(&self, hash: &Hash, parent: &Hash) -> bool {
        let invalid = self.invalid.lock();
        invalid.contains_key(hash) || invalid.contains_key(parent)
    }

    fn mark_invalid(&self, blocks: impl IntoIterator<Item = (Hash, u64)>) {
        self.invalid.lock().extend(blocks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_01_safe_math::SafeMath;
    use ac_03_concurrency::LockConfig;
    use ac_04_recovery::RecoveryConfig;
    use rust_decimal::Decimal;
    use shared_bus::{EventFilter, InMemoryEventBus};
    use shared_crypto::sign_transaction;
    use shared_types::{ManualTimeSource, TokenAction, TransactionPayload};

    const GENESIS_TIME: Timestamp = 1_000;
    const RECIPIENT: Address = [0x99; 20];

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    /// Seeds 1 and 2 are validators, seed 3 a funded user.
    fn key(seed: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[seed; 32]).unwrap()
    }

    struct Node {
        engine: ConsensusEngine,
        ledger: Arc<Ledger>,
        blocks: Arc<BlockStore>,
        bus: Arc<InMemoryEventBus>,
        recovery: Arc<RecoveryManager>,
        time: Arc<ManualTimeSource>,
    }

    fn create_test_node() -> Node {
        let time = Arc::new(ManualTimeSource::new(GENESIS_TIME));
        let ledger = Arc::new(Ledger::new(SafeMath::new(dec("1000000"))));
        ledger.write(|txn| {
            for seed in [1u8, 2] {
                let address = key(seed).address();
                txn.credit(address, dec("1000")).unwrap();
                txn.stake(address, dec("100"), GENESIS_TIME).unwrap();
            }
            txn.credit(key(3).address(), dec("500")).unwrap();
        });
        let blocks = Arc::new(BlockStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let recovery = Arc::new(RecoveryManager::new(RecoveryConfig::default(), time.clone()));
        let engine = ConsensusEngine::new(ConsensusDependencies {
            ledger: ledger.clone(),
            blocks: blocks.clone(),
            locks: LockManager::new(LockConfig::default()),
            recovery: recovery.clone(),
            bus: bus.clone(),
            time: time.clone(),
            contracts: ContractExecutor::default(),
            config: ConsensusConfig::default(),
        });
        engine.install_genesis(GENESIS_TIME).unwrap();
        Node {
            engine,
            ledger,
            blocks,
            bus,
            recovery,
            time,
        }
    }

    fn transfer(nonce: u64, amount: &str) -> Transaction {
        let user = key(3);
        let mut tx = Transaction::new(
            user.address(),
            nonce,
            GENESIS_TIME,
            Decimal::ONE,
            TransactionPayload::Token {
                recipient: RECIPIENT,
                amount: dec(amount),
                action: TokenAction::Transfer,
            },
        );
        sign_transaction(&mut tx, &user).unwrap();
        tx
    }

    async fn produce(node: &Node, seed: u8, txs: Vec<Transaction>) -> Block {
        node.engine.produce_block(&key(seed), txs).await.unwrap().block
    }

    #[tokio::test]
    async fn test_produced_block_extends_chain() {
        let node = create_test_node();
        let root_before = node.ledger.state_root().unwrap();
        node.time.set(1_010);

        let produced = node
            .engine
            .produce_block(&key(1), vec![transfer(0, "10")])
            .await
            .unwrap();
        assert!(produced.skipped.is_empty());
        assert_eq!(node.ledger.state_root().unwrap(), root_before);

        let block = produced.block;
        let tx_hash = block.transactions[0].hash();
        let outcome = node.engine.import_block(block.clone()).await.unwrap();
        assert!(matches!(outcome, ImportOutcome::Extended { height: 1 }));
        assert_eq!(node.ledger.state_root().unwrap(), block.header.state_root);

        node.ledger.read(|view| {
            assert_eq!(view.balance(&key(3).address()), dec("489"));
            assert_eq!(view.balance(&RECIPIENT), dec("10"));
            assert_eq!(view.balance(&key(1).address()), dec("901"));
            assert_eq!(view.counters().height, 1);
        });
        assert_eq!(node.blocks.transaction_location(&tx_hash), Some((1, 0)));
        assert!(matches!(
            node.engine.import_block(block).await,
            Ok(ImportOutcome::AlreadyKnown)
        ));
    }

    #[tokio::test]
    async fn test_production_skips_failing_transactions() {
        let node = create_test_node();
        node.time.set(1_010);
        let candidates = vec![transfer(0, "10"), transfer(5, "1"), transfer(1, "10000")];

        let produced = node.engine.produce_block(&key(1), candidates).await.unwrap();
        assert_eq!(produced.block.transactions.len(), 1);
        assert_eq!(produced.skipped.len(), 2);
        assert!(matches!(
            produced.skipped[0].1,
            ConsensusError::Transaction { index: 1, .. }
        ));
        assert!(node.engine.import_block(produced.block).await.is_ok());
        assert_eq!(
            node.ledger.read(|view| view.balance(&key(3).address())),
            dec("489")
        );
    }

    #[tokio::test]
    async fn test_failed_transaction_rolls_back_block() {
        let node = create_test_node();
        node.time.set(1_010);
        let block = produce(&node, 1, vec![transfer(0, "10"), transfer(1, "400")]).await;
        assert_eq!(block.transactions.len(), 2);

        // The sender spends elsewhere before the block arrives.
        node.ledger
            .write(|txn| txn.debit(key(3).address(), dec("300")))
            .unwrap();
        let root = node.ledger.state_root().unwrap();
        let rollbacks = node.recovery.stats().rollbacks;
        let mut sub = node.bus.subscribe(EventFilter::all());

        let err = node.engine.import_block(block.clone()).await.unwrap_err();
        assert!(matches!(err, ConsensusError::Transaction { index: 1, .. }));
        assert_eq!(node.ledger.state_root().unwrap(), root);
        assert_eq!(node.recovery.stats().rollbacks, rollbacks + 1);
        assert_eq!(node.blocks.height(), 0);

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ChainEvent::BlockRejected { .. }));

        assert!(matches!(
            node.engine.import_block(block).await,
            Err(ConsensusError::KnownInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_state_root_mismatch_rejected() {
        let node = create_test_node();
        node.time.set(1_010);
        let mut block = produce(&node, 1, vec![transfer(0, "10")]).await;
        block.header.state_root = [0xEE; 32];
        sign_block_header(&mut block.header, &key(1)).unwrap();
        let root = node.ledger.state_root().unwrap();

        let result = node.engine.import_block(block).await;
        assert!(matches!(result, Err(ConsensusError::StateRootMismatch { .. })));
        assert_eq!(node.ledger.state_root().unwrap(), root);
    }

    #[tokio::test]
    async fn test_rotation_after_consecutive_blocks() {
        let node = create_test_node();
        let v1 = key(1).address();
        for now in [1_010, 1_020] {
            node.time.set(now);
            let block = produce(&node, 1, vec![]).await;
            node.engine.import_block(block).await.unwrap();
        }
        assert_eq!(node.engine.validator_state(&v1), ValidatorState::CoolingDown);

        node.time.set(1_030);
        let err = node.engine.produce_block(&key(1), vec![]).await.unwrap_err();
        assert!(matches!(err, ConsensusError::RotationViolated { streak: 3, .. }));

        let block = produce(&node, 2, vec![]).await;
        assert!(node.engine.import_block(block).await.is_ok());
        assert_eq!(node.engine.validator_state(&v1), ValidatorState::Eligible);
    }

    fn report(nonce: u64, evidence: EquivocationEvidence) -> Transaction {
        let user = key(3);
        let mut tx = Transaction::new(
            user.address(),
            nonce,
            GENESIS_TIME,
            Decimal::ONE,
            TransactionPayload::Token {
                recipient: [0; 20],
                amount: Decimal::ZERO,
                action: TokenAction::ReportEquivocation {
                    first: Box::new(evidence.first),
                    second: Box::new(evidence.second),
                },
            },
        );
        sign_transaction(&mut tx, &user).unwrap();
        tx
    }

    #[tokio::test]
    async fn test_equivocation_slashes_stake() {
        let a = create_test_node();
        let b = create_test_node();
        a.time.set(1_010);
        b.time.set(1_011);
        let first = produce(&a, 1, vec![]).await;
        let second = produce(&b, 1, vec![]).await;
        assert_ne!(first.hash(), second.hash());

        a.engine.import_block(first).await.unwrap();
        assert!(a.engine.take_evidence().is_empty());
        assert!(matches!(
            a.engine.import_block(second).await,
            Ok(ImportOutcome::ForkStored { height: 1 })
        ));
        let mut evidence = a.engine.take_evidence();
        assert_eq!(evidence.len(), 1);
        assert!(a.engine.take_evidence().is_empty());
        let evidence = evidence.remove(0);
        assert_eq!(evidence.validator(), key(1).address());

        // Nothing is burned until the report is in a block.
        assert_eq!(a.ledger.read(|view| view.staked(&key(1).address())), dec("100"));

        a.time.set(1_020);
        let mut sub = a.bus.subscribe(EventFilter::all());
        let block = produce(&a, 2, vec![report(0, evidence.clone())]).await;
        assert_eq!(block.transactions.len(), 1);
        a.engine.import_block(block).await.unwrap();
        a.ledger.read(|view| {
            assert_eq!(view.staked(&key(1).address()), dec("90"));
            assert_eq!(view.counters().burned, dec("10"));
        });
        assert!(sub
            .drain()
            .iter()
            .any(|e| matches!(e, ChainEvent::ValidatorSlashed { height: 1, .. })));

        a.time.set(1_030);
        let again = produce(&a, 2, vec![report(1, evidence)]).await;
        assert_eq!(again.transactions.len(), 1);
        a.engine.import_block(again).await.unwrap();
        assert_eq!(a.ledger.read(|view| view.staked(&key(1).address())), dec("90"));
    }

    #[tokio::test]
    async fn test_future_block_importable_once_clock_catches_up() {
        let a = create_test_node();
        let b = create_test_node();
        a.time.set(2_000);
        let block = produce(&a, 1, vec![]).await;

        b.time.set(1_010);
        assert!(matches!(
            b.engine.import_block(block.clone()).await,
            Err(ConsensusError::FutureTimestamp { .. })
        ));
        assert_eq!(b.blocks.height(), 0);

        b.time.set(2_000);
        assert!(matches!(
            b.engine.import_block(block).await,
            Ok(ImportOutcome::Extended { height: 1 })
        ));
        assert_eq!(b.ledger.state_root().unwrap(), a.ledger.state_root().unwrap());
    }

    #[tokio::test]
    async fn test_fork_block_from_unstaked_key_not_stored() {
        let node = create_test_node();
        node.time.set(1_010);
        let tip = produce(&node, 1, vec![]).await;
        node.engine.import_block(tip).await.unwrap();

        let outsider = key(3);
        let genesis = node.blocks.get_by_number(0).unwrap();
        let mut header = BlockHeader {
            number: 1,
            parent_hash: genesis.hash(),
            merkle_root: merkle_root(&[]),
            state_root: genesis.header.state_root,
            timestamp: 1_005,
            validator: outsider.address(),
            difficulty: 0,
            signature: None,
        };
        sign_block_header(&mut header, &outsider).unwrap();
        let forged = Block {
            header,
            transactions: Vec::new(),
        };

        let err = node.engine.import_block(forged.clone()).await.unwrap_err();
        assert!(matches!(err, ConsensusError::InsufficientStake { .. }));
        assert!(!node.blocks.contains(&forged.hash()));
        assert_eq!(node.blocks.len(), 2);
        assert!(matches!(
            node.engine.import_block(forged).await,
            Err(ConsensusError::KnownInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_longer_fork_reorganizes() {
        let a = create_test_node();
        let b = create_test_node();

        a.time.set(1_010);
        let a1 = produce(&a, 1, vec![transfer(0, "20")]).await;
        a.engine.import_block(a1.clone()).await.unwrap();

        b.time.set(1_012);
        let b1 = produce(&b, 2, vec![transfer(0, "10")]).await;
        b.engine.import_block(b1.clone()).await.unwrap();
        b.time.set(1_020);
        let b2 = produce(&b, 2, vec![]).await;
        b.engine.import_block(b2.clone()).await.unwrap();

        a.time.set(1_020);
        let mut sub = a.bus.subscribe(EventFilter::all());
        assert!(matches!(
            a.engine.import_block(b1).await,
            Ok(ImportOutcome::ForkStored { height: 1 })
        ));
        match a.engine.import_block(b2.clone()).await.unwrap() {
            ImportOutcome::Reorganized {
                old_tip,
                new_tip,
                depth,
                orphaned,
            } => {
                assert_eq!(old_tip, a1.hash());
                assert_eq!(new_tip, b2.hash());
                assert_eq!(depth, 1);
                assert_eq!(orphaned, a1.transactions);
            }
            other => panic!("expected reorg, got {other:?}"),
        }

        assert_eq!(a.engine.tip(), b.engine.tip());
        assert_eq!(a.ledger.state_root().unwrap(), b.ledger.state_root().unwrap());
        assert!(!a.blocks.is_canonical(&a1.hash()));
        assert!(sub
            .drain()
            .iter()
            .any(|e| matches!(e, ChainEvent::ChainReorganized { depth: 1, .. })));
    }

    #[tokio::test]
    async fn test_mempool_admission_checks() {
        let node = create_test_node();
        assert!(node.engine.check_transaction(&transfer(0, "10")).is_ok());

        let mut unsigned = transfer(0, "10");
        unsigned.signature = None;
        assert!(matches!(
            node.engine.check_transaction(&unsigned),
            Err(ConsensusError::TransactionSignature { .. })
        ));
        assert!(node.engine.check_admission(&unsigned).is_ok());

        node.ledger
            .write(|txn| txn.use_nonce(key(3).address(), 0))
            .unwrap();
        assert!(matches!(
            node.engine.check_transaction(&transfer(0, "10")),
            Err(ConsensusError::Transaction { .. })
        ));
    }

    #[test]
    fn test_genesis_validators_are_eligible() {
        let node = create_test_node();
        let eligible = node.engine.eligible_validators();
        assert_eq!(eligible.len(), 2);
        assert!(node.engine.expected_producer().is_some());
        let score = node.engine.validator_score(&key(1).address()).unwrap();
        assert!(score >= node.engine.config().min_score_threshold);
        assert!(node.engine.validator_score(&key(3).address()).is_none());
    }
}
