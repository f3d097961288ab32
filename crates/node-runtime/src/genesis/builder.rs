//! # Genesis Block Builder
//!
//! Writes the configured allocations into an empty ledger and seals that
//! state as block 0.

use crate::container::config::GenesisConfig;
use ac_02_ledger_state::{Ledger, LedgerError};
use ac_06_consensus::{ConsensusEngine, ConsensusError};
use rust_decimal::Decimal;
use shared_types::{to_hex, Address, Amount, Block, Timestamp};
use std::collections::HashSet;
use thiserror::Error;
use tracing::info;

/// Genesis creation errors.
#[derive(Debug, Error)]
pub enum GenesisError {
    /// Invalid genesis configuration.
    #[error("Invalid genesis configuration: {0}")]
    InvalidConfig(String),

    /// Allocations could not be written.
    #[error("Failed to initialize genesis state: {0}")]
    State(#[from] LedgerError),

    #[error("Failed to seal genesis block: {0}")]
    Seal(#[from] ConsensusError),
}

/// One parsed allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub address: Address,
    pub balance: Amount,
    pub stake: Amount,
}

/// Parse a hex address, `0x` prefix optional.
pub fn parse_address(raw: &str) -> Result<Address, GenesisError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(digits)
        .map_err(|e| GenesisError::InvalidConfig(format!("address {raw}: {e}")))?;
    Address::try_from(bytes.as_slice()).map_err(|_| {
        GenesisError::InvalidConfig(format!("address {raw}: expected 20 bytes, got {}", bytes.len()))
    })
}

pub struct GenesisBuilder {
    config: GenesisConfig,
}

impl GenesisBuilder {
    pub fn new(config: GenesisConfig) -> Self {
        Self { config }
    }

    /// Parsed allocations, rejecting malformed and repeated addresses.
    pub fn allocations(&self) -> Result<Vec<Allocation>, GenesisError> {
        let mut seen = HashSet::new();
        let mut parsed = Vec::with_capacity(self.config.allocations.len());
        for entry in &self.config.allocations {
            let address = parse_address(&entry.address)?;
            if !seen.insert(address) {
                return Err(GenesisError::InvalidConfig(format!(
                    "address {} allocated twice",
                    to_hex(&address)
                )));
            }
            if entry.stake < Decimal::ZERO || entry.stake > entry.balance {
                return Err(GenesisError::InvalidConfig(format!(
                    "address {}: stake must be within [0, balance]",
                    to_hex(&address)
                )));
            }
            parsed.push(Allocation {
                address,
                balance: entry.balance,
                stake: entry.stake,
            });
        }
        Ok(parsed)
    }

    /// Install genesis unless block 0 already exists.
    ///
    /// `now` is used when the config pins no timestamp.
    pub fn build(
        &self,
        ledger: &Ledger,
        consensus: &ConsensusEngine,
        now: Timestamp,
    ) -> Result<Block, GenesisError> {
        if let Some(existing) = consensus.blocks().get_by_number(0) {
            info!(hash = %to_hex(&existing.hash()), "Genesis block found, chain initialized");
            return Ok(existing.as_ref().clone());
        }

        let allocations = self.allocations()?;
        let timestamp = self.config.timestamp.unwrap_or(now);
        ledger.write(|txn| {
            for allocation in &allocations {
                txn.credit(allocation.address, allocation.balance)?;
                if allocation.stake > Decimal::ZERO {
                    txn.stake(allocation.address, allocation.stake, timestamp)?;
                }
            }
            Ok::<_, LedgerError>(())
        })?;

        let block = consensus.install_genesis(timestamp)?;
        info!(
            chain_id = self.config.chain_id,
            accounts = allocations.len(),
            validators = allocations.iter().filter(|a| a.stake > Decimal::ZERO).count(),
            state_root = %to_hex(&block.header.state_root),
            "Genesis block created"
        );
        Ok(block)
    }
}
