//! # Ledger Store
//!
//! In-memory state behind a short-lived `RwLock`. The lock only protects the
//! maps themselves; logical isolation between callers is the job of the
//! concurrency manager, whose resource ids [`StateKey::resource`] maps onto.
//!
//! Maps are ordered so that serialization, and with it the state root and
//! every snapshot, is deterministic.

use crate::domain::contracts::ContractInstance;
use crate::domain::entities::{Account, ArchiveRecord, LedgerCounters, ValidatorRecord};
use crate::domain::error::{LedgerError, LedgerResult};
use crate::metrics;
use ac_01_safe_math::SafeMath;
use ac_03_concurrency::ResourceId;
use ac_04_recovery::{RecoveryError, RecoveryResult, Snapshottable};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared_types::{keccak256, to_hex, Address, Amount, ContractId, Hash, Timestamp};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct LedgerData {
    accounts: BTreeMap<Address, Account>,
    archives: BTreeMap<Hash, ArchiveRecord>,
    validators: BTreeMap<Address, ValidatorRecord>,
    contracts: BTreeMap<ContractId, ContractInstance>,
    counters: LedgerCounters,
}

/// Identity of one ledger entry, used for scoped checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StateKey {
    Account(Address),
    Archive(Hash),
    Validator(Address),
    Contract(ContractId),
    Counters,
}

impl StateKey {
    /// Lock guarding this entry. Validator counters share their account's lock.
    pub fn resource(&self) -> ResourceId {
        match self {
            Self::Account(a) | Self::Validator(a) => ResourceId::account(a),
            Self::Archive(h) => ResourceId::archive(h),
            Self::Contract(id) => ResourceId::contract(*id),
            Self::Counters => ResourceId::ledger(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum StateEntry {
    Account(Option<Account>),
    Archive(Option<ArchiveRecord>),
    Validator(Option<ValidatorRecord>),
    Contract(Option<ContractInstance>),
    Counters(LedgerCounters),
}

fn encode<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| LedgerError::Serialization(e.to_string()))
}

// =============================================================================
// LEDGER
// =============================================================================

pub struct Ledger {
    math: SafeMath,
    data: RwLock<LedgerData>,
}

impl Ledger {
    pub fn new(math: SafeMath) -> Self {
        Self {
            math,
            data: RwLock::new(LedgerData::default()),
        }
    }

    pub fn math(&self) -> SafeMath {
        self.math
    }

    /// Read-only access for the duration of `f`.
    pub fn read<R>(&self, f: impl FnOnce(&LedgerView<'_>) -> R) -> R {
        let data = self.data.read();
        f(&LedgerView { data: &*data })
    }

    /// Mutable access for the duration of `f`. Not re-entrant: `f` must not
    /// call back into this ledger.
    pub fn write<R>(&self, f: impl FnOnce(&mut LedgerTxn<'_>) -> R) -> R {
        let mut data = self.data.write();
        let mut txn = LedgerTxn {
            data: &mut *data,
            math: self.math,
        };
        f(&mut txn)
    }

    /// Keccak-256 over the canonical serialization of the whole state.
    pub fn state_root(&self) -> LedgerResult<Hash> {
        let bytes = encode(&*self.data.read())?;
        Ok(keccak256(&bytes))
    }

    /// Snapshot view restricted to `keys`. Restoring it touches nothing else.
    pub fn scope(&self, keys: impl IntoIterator<Item = StateKey>) -> ScopedState<'_> {
        let mut keys: Vec<StateKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        ScopedState { ledger: self, keys }
    }

    fn snapshot_bytes(&self) -> LedgerResult<Vec<u8>> {
        let bytes = encode(&*self.data.read())?;
        metrics::record_snapshot(bytes.len());
        Ok(bytes)
    }

    fn restore_bytes(&self, bytes: &[u8]) -> LedgerResult<()> {
        let data: LedgerData =
            bincode::deserialize(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let height = data.counters.height;
        *self.data.write() = data;
        metrics::record_restore();
        debug!(height, bytes = bytes.len(), "Ledger restored from snapshot");
        Ok(())
    }
}

impl Snapshottable for Ledger {
    fn snapshot(&self) -> RecoveryResult<Vec<u8>> {
        self.snapshot_bytes().map_err(|e| RecoveryError::SnapshotFailed {
            operation: "ledger".to_string(),
            reason: e.to_string(),
        })
    }

    fn restore(&self, snapshot: &[u8]) -> RecoveryResult<()> {
        self.restore_bytes(snapshot)
            .map_err(|e| RecoveryError::RestoreFailed {
                operation: "ledger".to_string(),
                reason: e.to_string(),
            })
    }
}

/// The entries named by a set of [`StateKey`]s.
pub struct ScopedState<'a> {
    ledger: &'a Ledger,
    keys: Vec<StateKey>,
}

impl ScopedState<'_> {
    pub fn keys(&self) -> &[StateKey] {
        &self.keys
    }

    fn capture(&self) -> Vec<(StateKey, StateEntry)> {
        let data = self.ledger.data.read();
        self.keys
            .iter()
            .map(|key| {
                let entry = match key {
                    StateKey::Account(a) => StateEntry::Account(data.accounts.get(a).cloned()),
                    StateKey::Archive(h) => StateEntry::Archive(data.archives.get(h).cloned()),
                    StateKey::Validator(a) => {
                        StateEntry::Validator(data.validators.get(a).cloned())
                    }
                    StateKey::Contract(id) => {
                        StateEntry::Contract(data.contracts.get(id).cloned())
                    }
                    StateKey::Counters => StateEntry::Counters(data.counters.clone()),
                };
                (key.clone(), entry)
            })
            .collect()
    }

    fn apply(&self, entries: Vec<(StateKey, StateEntry)>) {
        fn put<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, value: Option<V>) {
            match value {
                Some(v) => {
                    map.insert(key, v);
                }
                None => {
                    map.remove(&key);
                }
            }
        }

        let mut data = self.ledger.data.write();
        for (key, entry) in entries {
            match (key, entry) {
                (StateKey::Account(a), StateEntry::Account(v)) => put(&mut data.accounts, a, v),
                (StateKey::Archive(h), StateEntry::Archive(v)) => put(&mut data.archives, h, v),
                (StateKey::Validator(a), StateEntry::Validator(v)) => {
                    put(&mut data.validators, a, v)
                }
                (StateKey::Contract(id), StateEntry::Contract(v)) => {
                    put(&mut data.contracts, id, v)
                }
                (StateKey::Counters, StateEntry::Counters(c)) => data.counters = c,
                _ => {}
            }
        }
    }
}

impl Snapshottable for ScopedState<'_> {
    fn snapshot(&self) -> RecoveryResult<Vec<u8>> {
        let bytes = encode(&self.capture()).map_err(|e| RecoveryError::SnapshotFailed {
            operation: "ledger.scope".to_string(),
            reason: e.to_string(),
        })?;
        metrics::record_snapshot(bytes.len());
        Ok(bytes)
    }

    fn restore(&self, snapshot: &[u8]) -> RecoveryResult<()> {
        let entries: Vec<(StateKey, StateEntry)> =
            bincode::deserialize(snapshot).map_err(|e| RecoveryError::RestoreFailed {
                operation: "ledger.scope".to_string(),
                reason: e.to_string(),
            })?;
        let restored = entries.len();
        self.apply(entries);
        metrics::record_restore();
        debug!(entries = restored, "Scoped ledger entries restored");
        Ok(())
    }
}

// =============================================================================
// READ VIEW
// =============================================================================

pub struct LedgerView<'a> {
    data: &'a LedgerData,
}

impl<'a> LedgerView<'a> {
    pub fn account(&self, address: &Address) -> Option<&'a Account> {
        self.data.accounts.get(address)
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.account(address).map_or(Decimal::ZERO, Account::balance)
    }

    pub fn staked(&self, address: &Address) -> Amount {
        self.account(address).map_or(Decimal::ZERO, Account::staked)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.account(address).map_or(0, Account::nonce)
    }

    pub fn reputation(&self, address: &Address) -> f64 {
        self.account(address)
            .map_or_else(|| Account::new().reputation(), Account::reputation)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&'a Address, &'a Account)> {
        self.data.accounts.iter()
    }

    pub fn archive(&self, content_hash: &Hash) -> Option<&'a ArchiveRecord> {
        self.data.archives.get(content_hash)
    }

    pub fn archives(&self) -> impl Iterator<Item = &'a ArchiveRecord> {
        self.data.archives.values()
    }

    pub fn validator(&self, address: &Address) -> Option<&'a ValidatorRecord> {
        self.data.validators.get(address)
    }

    pub fn validators(&self) -> impl Iterator<Item = &'a ValidatorRecord> {
        self.data.validators.values()
    }

    /// Largest stake held by any validator.
    pub fn max_stake(&self) -> Amount {
        self.validators()
            .map(|v| self.staked(&v.address))
            .max()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn contract(&self, id: ContractId) -> Option<&'a ContractInstance> {
        self.data.contracts.get(&id)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &'a ContractInstance> {
        self.data.contracts.values()
    }

    pub fn counters(&self) -> &'a LedgerCounters {
        &self.data.counters
    }
}

// =============================================================================
// WRITE TRANSACTION
// =============================================================================

/// Mutable access to the ledger. Every value change goes through `SafeMath`.
///
/// Methods validate before they write, so a failing call leaves the entry it
/// targeted untouched. Multi-step operations that can fail part-way must run
/// under a recovery checkpoint.
pub struct LedgerTxn<'a> {
    data: &'a mut LedgerData,
    math: SafeMath,
}

impl LedgerTxn<'_> {
    pub fn view(&self) -> LedgerView<'_> {
        LedgerView { data: &*self.data }
    }

    pub fn math(&self) -> SafeMath {
        self.math
    }

    fn account_mut(&mut self, address: Address) -> &mut Account {
        self.data.accounts.entry(address).or_insert_with(Account::new)
    }

    // -------------------------------------------------------------------------
    // Value
    // -------------------------------------------------------------------------

    /// Returns the new balance.
    pub fn credit(&mut self, address: Address, amount: Amount) -> LedgerResult<Amount> {
        let current = self.view().balance(&address);
        let updated = self.math.safe_add(current, amount)?;
        self.account_mut(address).balance = updated;
        Ok(updated)
    }

    /// Returns the new balance.
    pub fn debit(&mut self, address: Address, amount: Amount) -> LedgerResult<Amount> {
        let available = self.view().balance(&address);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                address,
                required: amount,
                available,
            });
        }
        let updated = self.math.safe_sub(available, amount)?;
        self.account_mut(address).balance = updated;
        Ok(updated)
    }

    /// Both legs are checked before either is written.
    pub fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> LedgerResult<()> {
        let from_balance = self.view().balance(&from);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                address: from,
                required: amount,
                available: from_balance,
            });
        }
        if from == to {
            self.math.ensure_valid(amount)?;
            return Ok(());
        }
        let from_after = self.math.safe_sub(from_balance, amount)?;
        let to_after = self.math.safe_add(self.view().balance(&to), amount)?;
        self.account_mut(from).balance = from_after;
        self.account_mut(to).balance = to_after;
        Ok(())
    }

    /// Move balance into stake. Registers a validator record on first stake.
    pub fn stake(&mut self, address: Address, amount: Amount, now: Timestamp) -> LedgerResult<()> {
        let balance = self.view().balance(&address);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                address,
                required: amount,
                available: balance,
            });
        }
        let balance_after = self.math.safe_sub(balance, amount)?;
        let staked_after = self.math.safe_add(self.view().staked(&address), amount)?;
        let account = self.account_mut(address);
        account.balance = balance_after;
        account.staked = staked_after;
        self.ensure_validator(address, now);
        Ok(())
    }

    pub fn unstake(&mut self, address: Address, amount: Amount) -> LedgerResult<()> {
        let staked = self.view().staked(&address);
        if staked < amount {
            return Err(LedgerError::InsufficientStake {
                address,
                required: amount,
                staked,
            });
        }
        let staked_after = self.math.safe_sub(staked, amount)?;
        let balance_after = self.math.safe_add(self.view().balance(&address), amount)?;
        let account = self.account_mut(address);
        account.staked = staked_after;
        account.balance = balance_after;
        Ok(())
    }

    /// Burn `fraction` of the stake for an offence at `height`.
    ///
    /// Only registered validators can be slashed, once per height. Returns
    /// the amount burned, or `None` when there was nothing to punish.
    pub fn slash(
        &mut self,
        address: Address,
        height: u64,
        fraction: Decimal,
    ) -> LedgerResult<Option<Amount>> {
        let already = match self.data.validators.get(&address) {
            Some(v) => v.slashed_heights.contains(&height),
            None => return Ok(None),
        };
        if already {
            return Ok(None);
        }
        let staked = self.view().staked(&address);
        let penalty = self.math.safe_fraction(staked, fraction)?;
        let staked_after = self.math.safe_sub(staked, penalty)?;
        let burned_after = self.math.safe_add(self.data.counters.burned, penalty)?;
        let slashed_after = match self.data.validators.get(&address) {
            Some(v) => self.math.safe_add(v.total_slashed, penalty)?,
            None => penalty,
        };

        self.account_mut(address).staked = staked_after;
        self.data.counters.burned = burned_after;
        if let Some(v) = self.data.validators.get_mut(&address) {
            v.total_slashed = slashed_after;
            v.slashed_heights.insert(height);
        }
        warn!(address = %to_hex(&address), height, %penalty, "Stake slashed");
        Ok(Some(penalty))
    }

    /// Consume `nonce` if it is the account's next one.
    pub fn use_nonce(&mut self, address: Address, nonce: u64) -> LedgerResult<()> {
        let expected = self.view().nonce(&address);
        if nonce != expected {
            return Err(LedgerError::InvalidNonce {
                address,
                expected,
                actual: nonce,
            });
        }
        self.account_mut(address).nonce = expected + 1;
        Ok(())
    }

    /// Shift reputation by `delta_bps`, clamped to [0, 10_000].
    pub fn adjust_reputation(&mut self, address: Address, delta_bps: i32) {
        let account = self.account_mut(address);
        let next = i64::from(account.reputation_bps) + i64::from(delta_bps);
        account.reputation_bps = next.clamp(0, 10_000) as u32;
    }

    // -------------------------------------------------------------------------
    // Archives
    // -------------------------------------------------------------------------

    pub fn insert_archive(&mut self, record: ArchiveRecord) -> LedgerResult<()> {
        if self.data.archives.contains_key(&record.content_hash) {
            return Err(LedgerError::ArchiveExists {
                content_hash: record.content_hash,
            });
        }
        self.data.archives.insert(record.content_hash, record);
        Ok(())
    }

    fn mutable_archive(&mut self, content_hash: &Hash) -> LedgerResult<&mut ArchiveRecord> {
        let record = self
            .data
            .archives
            .get_mut(content_hash)
            .ok_or(LedgerError::ArchiveNotFound {
                content_hash: *content_hash,
            })?;
        if record.verified {
            return Err(LedgerError::ArchiveImmutable {
                content_hash: *content_hash,
            });
        }
        Ok(record)
    }

    /// Returns the running vote count.
    pub fn record_archive_vote(&mut self, content_hash: &Hash) -> LedgerResult<u32> {
        let record = self.mutable_archive(content_hash)?;
        record.verification_votes = record.verification_votes.saturating_add(1);
        Ok(record.verification_votes)
    }

    /// Set the verdict. A verified record is frozen afterwards.
    pub fn finalize_archive(
        &mut self,
        content_hash: &Hash,
        verified: bool,
        quality_bps: u32,
    ) -> LedgerResult<()> {
        let record = self.mutable_archive(content_hash)?;
        record.verified = verified;
        record.quality_bps = quality_bps.min(10_000);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Validators
    // -------------------------------------------------------------------------

    pub fn ensure_validator(&mut self, address: Address, now: Timestamp) -> &mut ValidatorRecord {
        self.data
            .validators
            .entry(address)
            .or_insert_with(|| ValidatorRecord::new(address, now))
    }

    pub fn validator_mut(&mut self, address: &Address) -> LedgerResult<&mut ValidatorRecord> {
        self.data
            .validators
            .get_mut(address)
            .ok_or(LedgerError::ValidatorNotFound { address: *address })
    }

    /// Bookkeeping after `producer` made block `height`.
    pub fn record_block_produced(&mut self, producer: Address, height: u64, timestamp: Timestamp) {
        let previous = self.data.counters.last_producer;
        let streak = match previous {
            Some(prev) if prev == producer => self
                .data
                .validators
                .get(&producer)
                .map_or(1, |v| v.consecutive_blocks.saturating_add(1)),
            Some(prev) => {
                if let Some(v) = self.data.validators.get_mut(&prev) {
                    v.consecutive_blocks = 0;
                }
                1
            }
            None => 1,
        };

        let record = self.ensure_validator(producer, timestamp);
        record.consecutive_blocks = streak;
        record.blocks_produced += 1;
        record.last_block_at = Some(timestamp);
        record.last_active = timestamp;

        self.data.counters.last_producer = Some(producer);
        self.data.counters.height = height;
    }

    /// Fold one availability observation into the uptime moving average.
    pub fn record_liveness(&mut self, address: &Address, online: bool, weight: f64) {
        if let Some(v) = self.data.validators.get_mut(address) {
            let sample = if online { 1.0 } else { 0.0 };
            v.uptime = (v.uptime * (1.0 - weight) + sample * weight).clamp(0.0, 1.0);
        }
    }

    // -------------------------------------------------------------------------
    // Contracts
    // -------------------------------------------------------------------------

    pub fn allocate_contract_id(&mut self) -> ContractId {
        self.data.counters.next_contract_id += 1;
        self.data.counters.next_contract_id
    }

    pub fn insert_contract(&mut self, instance: ContractInstance) {
        self.data.contracts.insert(instance.id(), instance);
    }

    pub fn contract_mut(&mut self, id: ContractId) -> LedgerResult<&mut ContractInstance> {
        self.data
            .contracts
            .get_mut(&id)
            .ok_or(LedgerError::ContractNotFound { id })
    }
}
