use super::{load_bounty, ContractExecutor, TxContext};
use crate::domain::{ContractError, ContractResult};
use crate::metrics;
use ac_02_ledger_state::{
    ArchiveRecord, ContractInstance, ContractKind, ContractStatus, LedgerTxn, Submission,
    VerificationContract, VoteTally,
};
use shared_bus::ChainEvent;
use shared_types::{to_hex, Address, ContractId, Hash, ZERO_HASH};
use tracing::debug;

impl ContractExecutor {
    /// Apply an Archive transaction.
    ///
    /// New content gets an [`ArchiveRecord`] and the contract that decides
    /// its verification: the named bounty, or a fresh verification contract.
    /// Content someone already archived still counts toward the archiver's
    /// submissions but creates nothing. Returns the deciding contract.
    #[allow(clippy::too_many_arguments)]
    pub fn record_archive(
        &self,
        txn: &mut LedgerTxn<'_>,
        ctx: &TxContext,
        archiver: Address,
        content_hash: Hash,
        metadata_hash: Hash,
        bounty_id: Option<ContractId>,
        events: &mut Vec<ChainEvent>,
    ) -> ContractResult<Option<ContractId>> {
        let duplicate = txn.view().archive(&content_hash).is_some();

        if let Some(id) = bounty_id {
            let contract = load_bounty(&txn.view(), id)?;
            if contract.status != ContractStatus::Open {
                return Err(ContractError::InvalidStatus {
                    id,
                    status: contract.status,
                    operation: "accept a submission",
                });
            }
            if ctx.timestamp > contract.deadline {
                return Err(ContractError::DeadlinePassed {
                    id,
                    deadline: contract.deadline,
                });
            }
            if contract.target_content_hash != content_hash {
                return Err(ContractError::TargetMismatch { id, content_hash });
            }
            if duplicate {
                return Err(ContractError::DuplicateContent { content_hash });
            }
        }

        let stats = txn.ensure_validator(archiver, ctx.timestamp);
        stats.archives_submitted += 1;
        if metadata_hash != ZERO_HASH {
            stats.complete_metadata += 1;
        }
        stats.last_active = ctx.timestamp;

        if duplicate {
            debug!(archiver = %to_hex(&archiver), "Archive of known content counted without a record");
            return Ok(None);
        }
        txn.ensure_validator(archiver, ctx.timestamp).unique_archives += 1;

        let deciding = match bounty_id {
            Some(id) => id,
            None => txn.allocate_contract_id(),
        };
        txn.insert_archive(ArchiveRecord {
            content_hash,
            metadata_hash,
            archiver,
            tx_hash: ctx.tx_hash,
            block_number: ctx.block_number,
            submitted_at: ctx.timestamp,
            verification_votes: 0,
            verified: false,
            quality_bps: 0,
            verification_contract: Some(deciding),
        })?;
        events.push(ChainEvent::ArchiveRecorded {
            content_hash,
            archiver,
            block_number: ctx.block_number,
        });

        match bounty_id {
            Some(id) => {
                if let ContractInstance::Bounty(b) = txn.contract_mut(id)? {
                    b.submission = Some(Submission {
                        archiver,
                        content_hash,
                        tx_hash: ctx.tx_hash,
                        submitted_at: ctx.timestamp,
                    });
                    b.status = ContractStatus::InProgress;
                }
                events.push(ChainEvent::SubmissionReceived {
                    contract_id: id,
                    archiver,
                    content_hash,
                });
            }
            None => {
                txn.insert_contract(ContractInstance::Verification(VerificationContract {
                    id: deciding,
                    content_hash,
                    archiver,
                    required_votes: self.config.required_votes,
                    status: ContractStatus::Open,
                    tally: VoteTally::default(),
                    created_at: ctx.timestamp,
                }));
                metrics::record_contract_created(ContractKind::Verification);
                events.push(ChainEvent::ContractCreated {
                    contract_id: deciding,
                    kind: ContractKind::Verification.to_string(),
                    creator: archiver,
                });
            }
        }

        Ok(Some(deciding))
    }
}
