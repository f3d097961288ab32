use super::{instance, ContractExecutor};
use crate::domain::{ContractError, ContractResult};
use crate::metrics;
use ac_02_ledger_state::{
    BountyContract, ContractInstance, ContractKind, ContractStatus, LedgerTxn, LedgerView,
    StateKey, VerificationContract, VoteTally,
};
use shared_bus::ChainEvent;
use shared_types::{to_hex, Address, ContractId, Hash, Timestamp, VoteChoice};
use std::collections::BTreeSet;
use tracing::{debug, info};

impl ContractExecutor {
    /// Ledger entries a vote on `id` by `voter` may touch.
    ///
    /// Grows as votes arrive (every earlier voter's reputation moves at
    /// finalization), so callers taking locks from it must re-check after
    /// acquiring.
    pub fn vote_scope(
        &self,
        view: &LedgerView<'_>,
        id: ContractId,
        voter: Address,
    ) -> ContractResult<BTreeSet<StateKey>> {
        let contract = instance(view, id)?;
        let mut keys = BTreeSet::from([
            StateKey::Contract(id),
            StateKey::Account(voter),
            StateKey::Validator(voter),
        ]);
        match contract {
            ContractInstance::Bounty(b) => {
                keys.insert(StateKey::Account(b.creator));
                if let Some(s) = &b.submission {
                    keys.insert(StateKey::Archive(s.content_hash));
                    keys.insert(StateKey::Account(s.archiver));
                    keys.insert(StateKey::Validator(s.archiver));
                }
            }
            ContractInstance::Verification(v) => {
                keys.insert(StateKey::Archive(v.content_hash));
                keys.insert(StateKey::Validator(v.archiver));
            }
            ContractInstance::PreservationPool(_) => {}
        }
        if let Some(tally) = contract.tally() {
            keys.extend(tally.iter().map(|(v, _)| StateKey::Account(*v)));
        }
        Ok(keys)
    }

    /// `voter` must be a registered validator holding the voting stake.
    pub fn ensure_voter(&self, view: &LedgerView<'_>, voter: Address) -> ContractResult<()> {
        let eligible = view.validator(&voter).is_some()
            && view.staked(&voter) >= self.config.min_voter_stake;
        if !eligible {
            return Err(ContractError::NotEligibleVoter { voter });
        }
        Ok(())
    }

    /// The contract as it would stand with `voter`'s ballot counted, plus
    /// the votes it needs and the archive it is about. Writes nothing.
    fn cast(
        &self,
        view: &LedgerView<'_>,
        id: ContractId,
        voter: Address,
        choice: VoteChoice,
        now: Timestamp,
    ) -> ContractResult<(ContractInstance, u32, Hash)> {
        self.ensure_voter(view, voter)?;
        let mut contract = instance(view, id)?.clone();

        let (required, subject) = match &contract {
            ContractInstance::Bounty(b) => {
                if now > b.deadline {
                    return Err(ContractError::DeadlinePassed {
                        id,
                        deadline: b.deadline,
                    });
                }
                let submission = match (&b.submission, b.status) {
                    (Some(s), ContractStatus::InProgress) => s,
                    _ => {
                        return Err(ContractError::InvalidStatus {
                            id,
                            status: b.status,
                            operation: "vote",
                        })
                    }
                };
                if submission.archiver == voter {
                    return Err(ContractError::SelfVote { id, voter });
                }
                (b.required_votes, submission.content_hash)
            }
            ContractInstance::Verification(v) => {
                if v.status != ContractStatus::Open {
                    return Err(ContractError::InvalidStatus {
                        id,
                        status: v.status,
                        operation: "vote",
                    });
                }
                if v.archiver == voter {
                    return Err(ContractError::SelfVote { id, voter });
                }
                (v.required_votes, v.content_hash)
            }
            ContractInstance::PreservationPool(_) => {
                return Err(ContractError::NotVotable {
                    id,
                    kind: ContractKind::PreservationPool,
                })
            }
        };

        let Some(tally) = tally_mut(&mut contract) else {
            return Err(ContractError::NotVotable {
                id,
                kind: ContractKind::PreservationPool,
            });
        };
        if !tally.record(voter, choice) {
            return Err(ContractError::DuplicateVote { id, voter });
        }
        Ok((contract, required, subject))
    }

    /// Would this vote be accepted, and would it reach quorum?
    pub fn preview_vote(
        &self,
        view: &LedgerView<'_>,
        id: ContractId,
        voter: Address,
        choice: VoteChoice,
        now: Timestamp,
    ) -> ContractResult<bool> {
        let (contract, required, _) = self.cast(view, id, voter, choice, now)?;
        Ok(contract
            .tally()
            .is_some_and(|tally| tally.quorum_reached(required)))
    }

    /// Record one validator vote and, on quorum, resolve the contract.
    ///
    /// Returns true when this vote finalized the contract. The contract is
    /// written back before any payout, so a failing payout leaves a partial
    /// write behind for the caller's checkpoint to undo.
    pub fn apply_vote(
        &self,
        txn: &mut LedgerTxn<'_>,
        id: ContractId,
        voter: Address,
        choice: VoteChoice,
        now: Timestamp,
        events: &mut Vec<ChainEvent>,
    ) -> ContractResult<bool> {
        let (mut contract, required, subject) = self.cast(&txn.view(), id, voter, choice, now)?;
        let Some(tally) = tally_mut(&mut contract) else {
            return Err(ContractError::NotVotable {
                id,
                kind: ContractKind::PreservationPool,
            });
        };
        let (valid_votes, total_votes) = (tally.valid(), tally.total());
        let finalized = tally.quorum_reached(required);
        let outcome = tally.outcome();
        let voters: Vec<(Address, VoteChoice)> = tally.iter().map(|(a, c)| (*a, *c)).collect();

        txn.record_archive_vote(&subject)?;
        metrics::record_vote(choice);
        events.push(ChainEvent::VerificationVote {
            contract_id: id,
            voter,
            choice,
            valid_votes,
            total_votes,
            required_votes: required,
        });
        debug!(
            contract_id = id,
            voter = %to_hex(&voter),
            valid_votes,
            total_votes,
            required,
            "Vote recorded"
        );

        if !finalized {
            *txn.contract_mut(id)? = contract;
            return Ok(false);
        }

        let status = if outcome.is_valid() {
            ContractStatus::Completed
        } else {
            ContractStatus::Rejected
        };
        set_status(&mut contract, status);
        *txn.contract_mut(id)? = contract.clone();
        events.push(ChainEvent::VerificationResultCalculated {
            contract_id: id,
            outcome,
            valid_votes,
            total_votes,
        });

        let quality_bps = if total_votes == 0 {
            0
        } else {
            valid_votes.saturating_mul(10_000) / total_votes
        };
        match contract {
            ContractInstance::Bounty(b) => {
                self.settle_bounty(txn, &b, subject, outcome, quality_bps, events)?
            }
            ContractInstance::Verification(v) => {
                self.settle_verification(txn, &v, outcome, quality_bps, events)?
            }
            ContractInstance::PreservationPool(_) => {}
        }

        for (address, cast) in voters {
            let delta = if cast == outcome {
                i32::try_from(self.config.reputation_reward_bps).unwrap_or(i32::MAX)
            } else {
                -i32::try_from(self.config.reputation_penalty_bps).unwrap_or(i32::MAX)
            };
            txn.adjust_reputation(address, delta);
        }

        metrics::record_resolution(status);
        info!(
            contract_id = id,
            status = %status,
            valid_votes,
            total_votes,
            "Contract resolved"
        );
        Ok(true)
    }

    fn settle_bounty(
        &self,
        txn: &mut LedgerTxn<'_>,
        bounty: &BountyContract,
        content_hash: Hash,
        outcome: VoteChoice,
        quality_bps: u32,
        events: &mut Vec<ChainEvent>,
    ) -> ContractResult<()> {
        let verified = outcome.is_valid();
        txn.finalize_archive(&content_hash, verified, quality_bps)?;
        events.push(ChainEvent::ArchiveVerified {
            content_hash,
            verified,
        });

        match (&bounty.submission, verified) {
            (Some(submission), true) => {
                txn.credit(submission.archiver, bounty.reward)?;
                if let Ok(stats) = txn.validator_mut(&submission.archiver) {
                    stats.archives_verified += 1;
                }
                events.push(ChainEvent::BountyPaid {
                    contract_id: bounty.id,
                    recipient: submission.archiver,
                    amount: bounty.reward,
                });
            }
            _ => {
                txn.credit(bounty.creator, bounty.reward)?;
                events.push(ChainEvent::BountyRefunded {
                    contract_id: bounty.id,
                    creator: bounty.creator,
                    amount: bounty.reward,
                });
            }
        }
        Ok(())
    }

    fn settle_verification(
        &self,
        txn: &mut LedgerTxn<'_>,
        contract: &VerificationContract,
        outcome: VoteChoice,
        quality_bps: u32,
        events: &mut Vec<ChainEvent>,
    ) -> ContractResult<()> {
        let verified = outcome.is_valid();
        txn.finalize_archive(&contract.content_hash, verified, quality_bps)?;
        if verified {
            if let Ok(stats) = txn.validator_mut(&contract.archiver) {
                stats.archives_verified += 1;
            }
        }
        events.push(ChainEvent::ArchiveVerified {
            content_hash: contract.content_hash,
            verified,
        });
        Ok(())
    }
}

fn tally_mut(contract: &mut ContractInstance) -> Option<&mut VoteTally> {
    match contract {
        ContractInstance::Bounty(b) => Some(&mut b.tally),
        ContractInstance::Verification(v) => Some(&mut v.tally),
        ContractInstance::PreservationPool(_) => None,
    }
}

fn set_status(contract: &mut ContractInstance, status: ContractStatus) {
    match contract {
        ContractInstance::Bounty(b) => b.status = status,
        ContractInstance::Verification(v) => v.status = status,
        ContractInstance::PreservationPool(_) => {}
    }
}
