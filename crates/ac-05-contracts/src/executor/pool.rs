use super::{load_pool, ContractExecutor, TxContext};
use crate::domain::{ContractError, ContractResult};
use crate::metrics;
use ac_01_safe_math::TOKEN_SCALE;
use ac_02_ledger_state::{ContractInstance, ContractKind, LedgerTxn, PoolStatus, PreservationPool};
use rust_decimal::{Decimal, RoundingStrategy};
use shared_bus::ChainEvent;
use shared_types::{Address, Amount, ContractId, Hash};
use std::collections::BTreeSet;
use tracing::{debug, info};

fn ensure_active(pool: &PreservationPool) -> ContractResult<()> {
    match pool.status {
        PoolStatus::Active => Ok(()),
        PoolStatus::Closed => Err(ContractError::PoolClosed { pool_id: pool.id }),
    }
}

impl ContractExecutor {
    /// Open a pool for `content_hash` seeded with `seed` from `creator`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_pool(
        &self,
        txn: &mut LedgerTxn<'_>,
        ctx: &TxContext,
        creator: Address,
        content_hash: Hash,
        seed: Amount,
        epoch_reward: Amount,
        events: &mut Vec<ChainEvent>,
    ) -> ContractResult<ContractId> {
        if seed <= Amount::ZERO {
            return Err(ContractError::InvalidAmount(seed));
        }
        if epoch_reward <= Amount::ZERO {
            return Err(ContractError::InvalidAmount(epoch_reward));
        }
        txn.math().ensure_valid(epoch_reward)?;

        txn.debit(creator, seed)?;
        let id = txn.allocate_contract_id();
        txn.insert_contract(ContractInstance::PreservationPool(PreservationPool {
            id,
            creator,
            content_hash,
            balance: seed,
            epoch_reward,
            preservers: BTreeSet::new(),
            epoch_proofs: BTreeSet::new(),
            epoch: 0,
            status: PoolStatus::Active,
            created_at: ctx.timestamp,
        }));

        metrics::record_contract_created(ContractKind::PreservationPool);
        events.push(ChainEvent::ContractCreated {
            contract_id: id,
            kind: ContractKind::PreservationPool.to_string(),
            creator,
        });
        events.push(ChainEvent::PoolContribution {
            pool_id: id,
            contributor: creator,
            amount: seed,
            balance: seed,
        });
        Ok(id)
    }

    pub fn contribute_pool(
        &self,
        txn: &mut LedgerTxn<'_>,
        pool_id: ContractId,
        contributor: Address,
        amount: Amount,
        events: &mut Vec<ChainEvent>,
    ) -> ContractResult<Amount> {
        if amount <= Amount::ZERO {
            return Err(ContractError::InvalidAmount(amount));
        }
        let mut pool = load_pool(&txn.view(), pool_id)?;
        ensure_active(&pool)?;
        let balance = txn.math().safe_add(pool.balance, amount)?;

        txn.debit(contributor, amount)?;
        pool.balance = balance;
        *txn.contract_mut(pool_id)? = ContractInstance::PreservationPool(pool);

        events.push(ChainEvent::PoolContribution {
            pool_id,
            contributor,
            amount,
            balance,
        });
        Ok(balance)
    }

    pub fn join_pool(
        &self,
        txn: &mut LedgerTxn<'_>,
        pool_id: ContractId,
        preserver: Address,
        events: &mut Vec<ChainEvent>,
    ) -> ContractResult<()> {
        let mut pool = load_pool(&txn.view(), pool_id)?;
        ensure_active(&pool)?;
        if !pool.preservers.insert(preserver) {
            return Err(ContractError::AlreadyJoined { pool_id, preserver });
        }
        *txn.contract_mut(pool_id)? = ContractInstance::PreservationPool(pool);
        events.push(ChainEvent::PreserverJoined { pool_id, preserver });
        Ok(())
    }

    /// Note that `preserver` answered a storage challenge this epoch.
    ///
    /// The challenge itself is checked by the caller. Returns false if the
    /// preserver had already proven this epoch.
    pub fn record_preservation_proof(
        &self,
        txn: &mut LedgerTxn<'_>,
        pool_id: ContractId,
        preserver: Address,
    ) -> ContractResult<bool> {
        let mut pool = load_pool(&txn.view(), pool_id)?;
        ensure_active(&pool)?;
        if !pool.preservers.contains(&preserver) {
            return Err(ContractError::NotAPreserver { pool_id, preserver });
        }
        let fresh = pool.epoch_proofs.insert(preserver);
        *txn.contract_mut(pool_id)? = ContractInstance::PreservationPool(pool);
        Ok(fresh)
    }

    /// Pay this epoch's reward in equal shares to every preserver that
    /// proved storage, then start the next epoch. The pool closes once its
    /// balance is gone.
    pub fn close_epoch(
        &self,
        txn: &mut LedgerTxn<'_>,
        pool_id: ContractId,
        events: &mut Vec<ChainEvent>,
    ) -> ContractResult<Vec<(Address, Amount)>> {
        let mut pool = load_pool(&txn.view(), pool_id)?;
        ensure_active(&pool)?;
        let epoch = pool.epoch;
        let provers: Vec<Address> = pool.epoch_proofs.iter().copied().collect();

        let mut payouts = Vec::with_capacity(provers.len());
        if !provers.is_empty() {
            let math = txn.math();
            let budget = pool.epoch_reward.min(pool.balance);
            let count = Decimal::from(provers.len() as u64);
            // Round down so the shares never sum past the budget.
            let share = math
                .safe_div(budget, count)?
                .round_dp_with_strategy(TOKEN_SCALE, RoundingStrategy::ToZero);
            let paid = math.safe_mul(share, count)?;
            pool.balance = math.safe_sub(pool.balance, paid)?;

            for preserver in provers {
                txn.credit(preserver, share)?;
                events.push(ChainEvent::PreservationRewarded {
                    pool_id,
                    preserver,
                    amount: share,
                    epoch,
                });
                payouts.push((preserver, share));
            }
        } else {
            debug!(pool_id, epoch, "Epoch closed without proofs");
        }

        pool.epoch += 1;
        pool.epoch_proofs.clear();
        if pool.balance.is_zero() {
            pool.status = PoolStatus::Closed;
            info!(pool_id, epoch, "Preservation pool drained and closed");
        }
        *txn.contract_mut(pool_id)? = ContractInstance::PreservationPool(pool);
        Ok(payouts)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn create_test_pool(
        ledger: &ac_02_ledger_state::Ledger,
        executor: &ContractExecutor,
        seed: &str,
        epoch_reward: &str,
    ) -> ContractId {
        let mut events = Vec::new();
        ledger
            .write(|txn| {
                executor.create_pool(
                    txn,
                    &TxContext::new([0; 32], 1, 100),
                    CREATOR,
                    [7; 32],
                    dec(seed),
                    dec(epoch_reward),
                    &mut events,
                )
            })
            .unwrap()
    }

    #[test]
    fn test_join_and_contribute() {
        let ledger = create_test_ledger("1000000");
        let executor = ContractExecutor::default();
        let id = create_test_pool(&ledger, &executor, "100", "10");
        let mut events = Vec::new();

        ledger
            .write(|txn| executor.join_pool(txn, id, VOTERS[0], &mut events))
            .unwrap();
        let again = ledger.write(|txn| executor.join_pool(txn, id, VOTERS[0], &mut events));
        assert!(matches!(again, Err(ContractError::AlreadyJoined { .. })));

        let balance = ledger
            .write(|txn| executor.contribute_pool(txn, id, ARCHIVER, dec("5"), &mut events))
            .unwrap();
        assert_eq!(balance, dec("105"));
        ledger.read(|view| {
            assert_eq!(view.balance(&CREATOR), dec("900"));
            assert_eq!(view.balance(&ARCHIVER), dec("5"));
        });
    }

    #[test]
    fn test_epoch_pays_only_provers() {
        let ledger = create_test_ledger("1000000");
        let executor = ContractExecutor::default();
        let id = create_test_pool(&ledger, &executor, "100", "30");
        let mut events = Vec::new();
        ledger.write(|txn| {
            for voter in VOTERS {
                executor.join_pool(txn, id, voter, &mut events).unwrap();
            }
            executor.record_preservation_proof(txn, id, VOTERS[0]).unwrap();
            executor.record_preservation_proof(txn, id, VOTERS[1]).unwrap();
        });

        let payouts = ledger
            .write(|txn| executor.close_epoch(txn, id, &mut events))
            .unwrap();
        assert_eq!(payouts, vec![(VOTERS[0], dec("15")), (VOTERS[1], dec("15"))]);
        ledger.read(|view| {
            assert_eq!(view.balance(&VOTERS[0]), dec("65"));
            assert_eq!(view.balance(&VOTERS[2]), dec("50"));
            match view.contract(id).unwrap() {
                ContractInstance::PreservationPool(p) => {
                    assert_eq!(p.balance, dec("70"));
                    assert_eq!(p.epoch, 1);
                    assert!(p.epoch_proofs.is_empty());
                }
                other => panic!("unexpected {other:?}"),
            }
        });
    }

    #[test]
    fn test_outsider_cannot_prove() {
        let ledger = create_test_ledger("1000000");
        let executor = ContractExecutor::default();
        let id = create_test_pool(&ledger, &executor, "100", "30");
        let err = ledger
            .write(|txn| executor.record_preservation_proof(txn, id, ARCHIVER))
            .unwrap_err();
        assert!(matches!(err, ContractError::NotAPreserver { .. }));
    }

    #[test]
    fn test_pool_closes_when_drained() {
        let ledger = create_test_ledger("1000000");
        let executor = ContractExecutor::default();
        let id = create_test_pool(&ledger, &executor, "10", "30");
        let mut events = Vec::new();
        ledger.write(|txn| {
            executor.join_pool(txn, id, VOTERS[0], &mut events).unwrap();
            executor.record_preservation_proof(txn, id, VOTERS[0]).unwrap();
        });

        let payouts = ledger
            .write(|txn| executor.close_epoch(txn, id, &mut events))
            .unwrap();
        assert_eq!(payouts, vec![(VOTERS[0], dec("10"))]);

        let closed = ledger.write(|txn| executor.join_pool(txn, id, VOTERS[1], &mut events));
        assert!(matches!(closed, Err(ContractError::PoolClosed { .. })));
    }
}
