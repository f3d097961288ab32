//! # Archive Engine
//!
//! The surface the RPC layer calls, and the glue between consensus, the
//! mempool and the network bridge.
//!
//! ## Flows
//!
//! ```text
//! submit_transaction ─→ verify ─→ admission check ─→ mempool ─→ broadcast
//! producer tick ──────→ mempool candidates ─→ produce ─→ import ─→ broadcast
//! inbound block ──────→ import ─→ prune mempool / re-queue orphans
//!                                 └→ equivocation evidence ─→ report tx
//! ```
//!
//! Validator actions (votes, storage attestations, epoch closes, slashing
//! reports) are checked against local state, then signed and submitted as
//! ordinary transactions. The ledger only changes when a block carries them.

use crate::container::NodeServices;
use crate::engine::error::{EngineError, EngineResult};
use ac_02_ledger_state::LedgerError;
use ac_05_contracts::ContractError;
use ac_06_consensus::{ConsensusError, EquivocationEvidence, ImportOutcome};
use ac_07_network_bridge::{NetworkBridge, NetworkMessage, PeerId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared_bus::{ChainEvent, EventPublisher};
use shared_crypto::{sign_transaction, verify_transaction, ChallengeId, Digest, PrivateKey};
use shared_types::{
    to_hex, Address, Block, ContractId, Hash, Timestamp, TokenAction, Transaction,
    TransactionPayload, VoteChoice, ZERO_HASH,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Proof a transaction entered the mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: Hash,
    pub sender: Address,
    pub nonce: u64,
    pub accepted_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Synced,
    /// A peer announced a block above our tip.
    Syncing { target: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainInfo {
    pub height: u64,
    pub tip_hash: Hash,
    pub peer_count: usize,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveVerification {
    pub verified: bool,
    pub tx_hash: Hash,
    pub block_number: u64,
    /// Canonical blocks from the archive's block to the tip, inclusive.
    pub confirmations: u64,
}

pub struct ArchiveEngine {
    services: Arc<NodeServices>,
    network: Arc<dyn NetworkBridge>,
    validator_key: Option<PrivateKey>,
    /// Highest block number seen from any source.
    best_seen: AtomicU64,
}

impl ArchiveEngine {
    pub fn new(
        services: Arc<NodeServices>,
        network: Arc<dyn NetworkBridge>,
        validator_key: Option<PrivateKey>,
    ) -> Self {
        Self {
            services,
            network,
            validator_key,
            best_seen: AtomicU64::new(0),
        }
    }

    pub fn services(&self) -> &Arc<NodeServices> {
        &self.services
    }

    pub fn network(&self) -> &Arc<dyn NetworkBridge> {
        &self.network
    }

    /// Address this node produces and votes as, if it holds a key.
    pub fn validator_address(&self) -> Option<Address> {
        self.validator_key.as_ref().map(PrivateKey::address)
    }

    fn key(&self) -> EngineResult<&PrivateKey> {
        self.validator_key.as_ref().ok_or(EngineError::NotValidator)
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    /// Verify, pool and gossip a client transaction.
    #[instrument(skip(self, tx), fields(sender = %to_hex(&tx.sender), nonce = tx.nonce))]
    pub async fn submit_transaction(&self, tx: Transaction) -> EngineResult<TxReceipt> {
        verify_transaction(&tx)?;
        let receipt = self.admit(tx.clone()).await?;
        self.network
            .broadcast(NetworkMessage::Transaction(tx))
            .await;
        Ok(receipt)
    }

    /// Admission for a transaction whose signature is already verified.
    pub(crate) async fn admit(&self, tx: Transaction) -> EngineResult<TxReceipt> {
        self.services.consensus.check_admission(&tx)?;
        let receipt = TxReceipt {
            tx_hash: tx.hash(),
            sender: tx.sender,
            nonce: tx.nonce,
            accepted_at: self.services.time.now(),
        };
        self.services.mempool.insert(tx)?;
        debug!(hash = %to_hex(&receipt.tx_hash), pooled = self.services.mempool.len(), "Transaction pooled");
        self.services
            .bus
            .publish(ChainEvent::TransactionAccepted {
                hash: receipt.tx_hash,
                sender: receipt.sender,
            })
            .await;
        Ok(receipt)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn get_blockchain_info(&self) -> BlockchainInfo {
        let (height, tip_hash) = self
            .services
            .consensus
            .tip()
            .map_or((0, ZERO_HASH), |tip| (tip.height, tip.hash));
        let best = self.best_seen.load(Ordering::Relaxed);
        BlockchainInfo {
            height,
            tip_hash,
            peer_count: self.network.peer_count(),
            sync_status: if best > height {
                SyncStatus::Syncing { target: best }
            } else {
                SyncStatus::Synced
            },
        }
    }

    pub fn verify_archive(&self, content_hash: &Hash) -> EngineResult<ArchiveVerification> {
        let height = self.services.blocks.height();
        self.services
            .ledger
            .read(|view| {
                view.archive(content_hash).map(|record| ArchiveVerification {
                    verified: record.verified,
                    tx_hash: record.tx_hash,
                    block_number: record.block_number,
                    confirmations: height.saturating_sub(record.block_number) + 1,
                })
            })
            .ok_or(EngineError::ArchiveNotFound(*content_hash))
    }

    pub fn get_validator_score(&self, address: &Address) -> EngineResult<f64> {
        self.services
            .consensus
            .validator_score(address)
            .ok_or(EngineError::ValidatorNotFound(*address))
    }

    // =========================================================================
    // VALIDATOR ACTIONS
    // =========================================================================

    /// Vote as this node's validator. The ballot is checked here and lands
    /// on chain with the block that includes it.
    ///
    /// Returns true if the vote would resolve the contract at current state.
    #[instrument(skip(self))]
    pub async fn vote(&self, contract_id: ContractId, choice: VoteChoice) -> EngineResult<bool> {
        let key = self.key()?;
        let resolves = self
            .services
            .contracts
            .preview_vote(contract_id, key.address(), choice)?;
        self.submit_as_validator(TransactionPayload::Governance {
            proposal_id: contract_id,
            choice,
        })
        .await?;
        Ok(resolves)
    }

    /// Check a preserver's storage proof and attest it on chain.
    #[instrument(skip(self, challenge_id, response), fields(preserver = %to_hex(&preserver)))]
    pub async fn attest_preservation(
        &self,
        pool_id: ContractId,
        challenge_id: ChallengeId,
        preserver: Address,
        response: Digest,
    ) -> EngineResult<TxReceipt> {
        self.key()?;
        self.services
            .contracts
            .check_preservation_proof(pool_id, challenge_id, preserver, response)
            .await?;
        self.submit_as_validator(validator_action(TokenAction::AttestPreservation {
            pool_id,
            preserver,
        }))
        .await
    }

    /// Ask the chain to pay out the current epoch of `pool_id`.
    pub async fn close_epoch(&self, pool_id: ContractId) -> EngineResult<TxReceipt> {
        self.submit_as_validator(validator_action(TokenAction::CloseEpoch { pool_id }))
            .await
    }

    /// Sign `payload` with the validator key at the next free nonce and
    /// submit it like any client transaction.
    async fn submit_as_validator(&self, payload: TransactionPayload) -> EngineResult<TxReceipt> {
        let key = self.key()?;
        let sender = key.address();
        let ledger_nonce = self.services.ledger.read(|view| view.nonce(&sender));
        let mut tx = Transaction::new(
            sender,
            self.services.mempool.next_nonce(&sender, ledger_nonce),
            self.services.time.now(),
            self.services.consensus.config().min_fee,
            payload,
        );
        sign_transaction(&mut tx, key)?;
        self.submit_transaction(tx).await
    }

    /// Report evidence found during import. Evidence against this node's
    /// own key is skipped.
    async fn report_equivocations(&self, evidence: Vec<EquivocationEvidence>) {
        let Some(me) = self.validator_address() else {
            return;
        };
        for found in evidence {
            let validator = found.validator();
            if validator == me {
                continue;
            }
            let action = TokenAction::ReportEquivocation {
                first: Box::new(found.first),
                second: Box::new(found.second),
            };
            match self.submit_as_validator(validator_action(action)).await {
                Ok(receipt) => info!(validator = %to_hex(&validator), hash = %to_hex(&receipt.tx_hash), "Equivocation reported"),
                Err(e) => warn!(validator = %to_hex(&validator), error = %e, "Equivocation report failed"),
            }
        }
    }

    // =========================================================================
    // BLOCKS
    // =========================================================================

    /// Import a block and bring the mempool in line with the new chain.
    pub async fn import_block(&self, block: Block) -> EngineResult<ImportOutcome> {
        let number = block.number();
        self.best_seen.fetch_max(number, Ordering::Relaxed);
        let included = block.transactions.clone();

        let outcome = self.services.consensus.import_block(block).await?;
        match &outcome {
            ImportOutcome::Extended { .. } => {
                self.services.mempool.remove_included(&included);
            }
            ImportOutcome::Reorganized { orphaned, .. } => {
                let ledger = &self.services.ledger;
                let pruned = self
                    .services
                    .mempool
                    .prune_stale(|sender| ledger.read(|view| view.nonce(sender)));
                let requeued = self.requeue(orphaned.clone()).await;
                info!(pruned, requeued, orphaned = orphaned.len(), "Mempool realigned after reorg");
            }
            ImportOutcome::AlreadyKnown | ImportOutcome::ForkStored { .. } => {}
        }
        self.report_equivocations(self.services.consensus.take_evidence())
            .await;
        Ok(outcome)
    }

    async fn requeue(&self, orphaned: Vec<Transaction>) -> usize {
        let mut requeued = 0;
        for tx in orphaned {
            let hash = tx.hash();
            match self.admit(tx).await {
                Ok(_) => requeued += 1,
                Err(e) => debug!(hash = %to_hex(&hash), error = %e, "Orphaned transaction dropped"),
            }
        }
        requeued
    }

    /// Build, import and gossip the next block as this node's validator.
    #[instrument(skip(self))]
    pub async fn produce_block(&self) -> EngineResult<Block> {
        let key = self.key()?;
        let consensus = &self.services.consensus;
        let candidates = self
            .services
            .mempool
            .candidates(consensus.config().max_txs_per_block);

        let produced = consensus.produce_block(key, candidates).await?;
        for (hash, reason) in &produced.skipped {
            if !retry_later(reason) {
                self.services.mempool.remove(hash);
            }
            debug!(hash = %to_hex(hash), reason = %reason, "Candidate left out of block");
        }

        let block = produced.block;
        self.import_block(block.clone()).await?;
        self.network
            .broadcast(NetworkMessage::Block(block.clone()))
            .await;
        info!(
            height = block.number(),
            txs = block.transactions.len(),
            "Produced block"
        );
        Ok(block)
    }

    /// Every `interval`, produce a block if this node's validator is
    /// selected for the next height. Stops when `shutdown` flips to true.
    pub fn spawn_producer(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(me) = self.validator_address() else {
                            continue;
                        };
                        if self.services.consensus.expected_producer() != Some(me) {
                            continue;
                        }
                        match self.produce_block().await {
                            Ok(_) => {}
                            Err(EngineError::Consensus(e)) if e.reason() == "authority" => {
                                debug!(error = %e, "Not producing this round");
                            }
                            Err(e) => warn!(error = %e, "Block production failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Block producer stopping");
                            break;
                        }
                    }
                }
            }
        })
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Apply one gossiped message.
    pub async fn handle_message(&self, from: PeerId, message: NetworkMessage) -> EngineResult<()> {
        match message {
            NetworkMessage::Block(block) => {
                let outcome = self.import_block(block).await?;
                debug!(peer = %from, ?outcome, "Imported gossiped block");
            }
            NetworkMessage::Transaction(tx) => {
                verify_transaction(&tx)?;
                self.admit(tx).await?;
            }
        }
        Ok(())
    }
}

/// Value-free token payload for a validator action.
fn validator_action(action: TokenAction) -> TransactionPayload {
    TransactionPayload::Token {
        recipient: [0; 20],
        amount: Decimal::ZERO,
        action,
    }
}

/// Skipped candidates worth keeping: a nonce ahead of the account may
/// become valid once the gap fills.
fn retry_later(reason: &ConsensusError) -> bool {
    matches!(
        reason,
        ConsensusError::Transaction {
            source: ContractError::Ledger(LedgerError::InvalidNonce { expected, actual, .. }),
            ..
        } if actual > expected
    )
}
