use super::{ContractExecutor, TxContext};
use crate::domain::{ContractError, ContractResult};
use crate::metrics;
use ac_02_ledger_state::{
    BountyContract, ContractInstance, ContractKind, ContractStatus, LedgerTxn, VoteTally,
};
use shared_bus::ChainEvent;
use shared_types::{Address, Amount, ContractId, Hash, Timestamp};
use tracing::info;

impl ContractExecutor {
    /// Open a bounty, escrowing `reward` from `creator`.
    ///
    /// `required_votes == 0` takes the configured quorum.
    #[allow(clippy::too_many_arguments)]
    pub fn create_bounty(
        &self,
        txn: &mut LedgerTxn<'_>,
        ctx: &TxContext,
        creator: Address,
        reward: Amount,
        target_content_hash: Hash,
        deadline: Timestamp,
        required_votes: u32,
        events: &mut Vec<ChainEvent>,
    ) -> ContractResult<ContractId> {
        if reward <= Amount::ZERO {
            return Err(ContractError::InvalidAmount(reward));
        }
        let latest = ctx
            .timestamp
            .saturating_add(self.config.max_bounty_duration_secs);
        if deadline <= ctx.timestamp || deadline > latest {
            return Err(ContractError::InvalidDeadline {
                deadline,
                now: ctx.timestamp,
            });
        }

        txn.debit(creator, reward)?;
        let id = txn.allocate_contract_id();
        let required_votes = if required_votes == 0 {
            self.config.required_votes
        } else {
            required_votes
        };
        txn.insert_contract(ContractInstance::Bounty(BountyContract {
            id,
            creator,
            reward,
            target_content_hash,
            deadline,
            required_votes,
            status: ContractStatus::Open,
            submission: None,
            tally: VoteTally::default(),
            created_at: ctx.timestamp,
        }));

        metrics::record_contract_created(ContractKind::Bounty);
        events.push(ChainEvent::ContractCreated {
            contract_id: id,
            kind: ContractKind::Bounty.to_string(),
            creator,
        });
        Ok(id)
    }

    /// Expire every Open or InProgress bounty whose deadline is before `now`,
    /// refunding its creator. Returns the expired ids.
    pub fn expire_overdue(
        &self,
        txn: &mut LedgerTxn<'_>,
        now: Timestamp,
        events: &mut Vec<ChainEvent>,
    ) -> ContractResult<Vec<ContractId>> {
        let overdue: Vec<BountyContract> = txn
            .view()
            .contracts()
            .filter_map(|c| match c {
                ContractInstance::Bounty(b) if !b.status.is_terminal() && now > b.deadline => {
                    Some(b.clone())
                }
                _ => None,
            })
            .collect();

        let mut expired = Vec::with_capacity(overdue.len());
        for mut contract in overdue {
            contract.status = ContractStatus::Expired;
            txn.credit(contract.creator, contract.reward)?;
            let (id, creator, reward) = (contract.id, contract.creator, contract.reward);
            *txn.contract_mut(id)? = ContractInstance::Bounty(contract);

            metrics::record_resolution(ContractStatus::Expired);
            info!(contract_id = id, "Bounty expired; reward refunded");
            events.push(ChainEvent::ContractExpired { contract_id: id });
            events.push(ChainEvent::BountyRefunded {
                contract_id: id,
                creator,
                amount: reward,
            });
            expired.push(id);
        }
        Ok(expired)
    }
}
