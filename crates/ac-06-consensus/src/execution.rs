//! # Block Body Execution
//!
//! Replays transactions against a [`LedgerTxn`] in block order. The caller
//! holds the ledger lock and a checkpoint; any error here means the whole
//! block is rolled back.
//!
//! Per transaction: consume the nonce, pay the fee to the producer, then
//! dispatch the payload. Plain token movements go straight to the ledger;
//! everything contract-shaped goes through the [`ContractExecutor`].

use crate::domain::{ConsensusConfig, ConsensusError, ConsensusResult};
use ac_02_ledger_state::LedgerTxn;
use ac_05_contracts::{ContractError, ContractExecutor, ContractResult, TxContext};
use shared_bus::ChainEvent;
use shared_crypto::verify_block_header;
use shared_types::{Address, Amount, BlockHeader, TokenAction, Transaction, TransactionPayload};

/// Apply one transaction produced into a block by `producer`.
pub fn apply_transaction(
    contracts: &ContractExecutor,
    config: &ConsensusConfig,
    txn: &mut LedgerTxn<'_>,
    ctx: &TxContext,
    producer: Address,
    tx: &Transaction,
    events: &mut Vec<ChainEvent>,
) -> ContractResult<()> {
    txn.use_nonce(tx.sender, tx.nonce)?;
    txn.transfer(tx.sender, producer, tx.fee)?;

    match &tx.payload {
        TransactionPayload::Archive {
            content_hash,
            metadata_hash,
            bounty_id,
        } => {
            contracts.record_archive(
                txn,
                ctx,
                tx.sender,
                *content_hash,
                *metadata_hash,
                *bounty_id,
                events,
            )?;
        }
        TransactionPayload::Token {
            recipient,
            amount,
            action,
        } => {
            if action.moves_value() && *amount <= Amount::ZERO {
                return Err(ContractError::InvalidAmount(*amount));
            }
            let call = TokenCall {
                contracts,
                config,
                ctx,
                sender: tx.sender,
                recipient: *recipient,
                amount: *amount,
            };
            call.apply(txn, action, events)?;
        }
        TransactionPayload::Governance { proposal_id, choice } => {
            contracts.apply_vote(txn, *proposal_id, tx.sender, *choice, ctx.timestamp, events)?;
        }
    }
    Ok(())
}

struct TokenCall<'a> {
    contracts: &'a ContractExecutor,
    config: &'a ConsensusConfig,
    ctx: &'a TxContext,
    sender: Address,
    recipient: Address,
    amount: Amount,
}

impl TokenCall<'_> {
    fn apply(
        &self,
        txn: &mut LedgerTxn<'_>,
        action: &TokenAction,
        events: &mut Vec<ChainEvent>,
    ) -> ContractResult<()> {
        let (contracts, sender, amount) = (self.contracts, self.sender, self.amount);
        match action {
            TokenAction::Transfer => txn.transfer(sender, self.recipient, amount)?,
            TokenAction::Stake => txn.stake(sender, amount, self.ctx.timestamp)?,
            TokenAction::Unstake => txn.unstake(sender, amount)?,
            TokenAction::FundBounty {
                target_content_hash,
                deadline,
                required_votes,
            } => {
                contracts.create_bounty(
                    txn,
                    self.ctx,
                    sender,
                    amount,
                    *target_content_hash,
                    *deadline,
                    *required_votes,
                    events,
                )?;
            }
            TokenAction::CreatePool {
                content_hash,
                epoch_reward,
            } => {
                contracts.create_pool(
                    txn,
                    self.ctx,
                    sender,
                    *content_hash,
                    amount,
                    *epoch_reward,
                    events,
                )?;
            }
            TokenAction::ContributePool { pool_id } => {
                contracts.contribute_pool(txn, *pool_id, sender, amount, events)?;
            }
            TokenAction::JoinPool { pool_id } => {
                contracts.join_pool(txn, *pool_id, sender, events)?
            }
            TokenAction::AttestPreservation { pool_id, preserver } => {
                contracts.ensure_voter(&txn.view(), sender)?;
                if *preserver == sender {
                    return Err(ContractError::SelfVote {
                        id: *pool_id,
                        voter: sender,
                    });
                }
                contracts.record_preservation_proof(txn, *pool_id, *preserver)?;
            }
            TokenAction::CloseEpoch { pool_id } => {
                contracts.ensure_voter(&txn.view(), sender)?;
                contracts.close_epoch(txn, *pool_id, events)?;
            }
            TokenAction::ReportEquivocation { first, second } => {
                check_evidence(first, second)?;
                let slashed =
                    txn.slash(first.validator, first.number, self.config.slash_fraction)?;
                if let Some(amount) = slashed {
                    events.push(ChainEvent::ValidatorSlashed {
                        validator: first.validator,
                        amount,
                        height: first.number,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Two different headers for one height, both signed by the same validator.
pub fn check_evidence(first: &BlockHeader, second: &BlockHeader) -> ContractResult<()> {
    if first.validator != second.validator {
        return Err(ContractError::InvalidEvidence {
            reason: "different validators",
        });
    }
    if first.number != second.number {
        return Err(ContractError::InvalidEvidence {
            reason: "different heights",
        });
    }
    if first.signing_hash() == second.signing_hash() {
        return Err(ContractError::InvalidEvidence {
            reason: "same block",
        });
    }
    verify_block_header(first)?;
    verify_block_header(second)?;
    Ok(())
}

/// Apply every transaction of a block body, then the block bookkeeping.
///
/// `expected` is the producer selection picked for this slot; if someone
/// else produced, it is recorded as offline.
pub fn execute_body(
    contracts: &ContractExecutor,
    config: &ConsensusConfig,
    txn: &mut LedgerTxn<'_>,
    header: &BlockHeader,
    transactions: &[Transaction],
    expected: Option<Address>,
    events: &mut Vec<ChainEvent>,
) -> ConsensusResult<()> {
    for (index, tx) in transactions.iter().enumerate() {
        let ctx = TxContext::new(tx.hash(), header.number, header.timestamp);
        apply_transaction(contracts, config, txn, &ctx, header.validator, tx, events)
            .map_err(|source| ConsensusError::Transaction { index, source })?;
    }
    finish_block(contracts, config, txn, header, expected, events)
}

/// Producer bookkeeping, uptime samples and bounty expiry at block time.
pub fn finish_block(
    contracts: &ContractExecutor,
    config: &ConsensusConfig,
    txn: &mut LedgerTxn<'_>,
    header: &BlockHeader,
    expected: Option<Address>,
    events: &mut Vec<ChainEvent>,
) -> ConsensusResult<()> {
    let producer = header.validator;
    txn.record_block_produced(producer, header.number, header.timestamp);
    txn.record_liveness(&producer, true, config.uptime_sample_weight);
    if let Some(missed) = expected.filter(|e| *e != producer) {
        txn.record_liveness(&missed, false, config.uptime_sample_weight);
    }

    contracts
        .expire_overdue(txn, header.timestamp, events)
        .map_err(ConsensusError::Finalization)?;
    Ok(())
}
