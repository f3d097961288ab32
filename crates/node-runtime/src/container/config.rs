//! # Node Configuration
//!
//! Unified configuration for every component and the runtime loops.
//!
//! ## Sources (later wins)
//!
//! 1. `Default` of each section.
//! 2. JSON file named by `AC_CONFIG`. Missing fields keep their defaults.
//! 3. `AC_*` environment overrides.
//!
//! [`NodeConfig::validate`] runs last and rejects inconsistent values.

use ac_01_safe_math::DEFAULT_MAX_SUPPLY;
use ac_03_concurrency::LockConfig;
use ac_04_recovery::RecoveryConfig;
use ac_05_contracts::ContractConfig;
use ac_06_consensus::ConsensusConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared_crypto::DEFAULT_CHALLENGE_TTL_SECS;
use shared_types::{Address, Timestamp};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub consensus: ConsensusConfig,
    pub contracts: ContractConfig,
    pub locks: LockConfig,
    pub recovery: RecoveryConfig,
    pub crypto: CryptoConfig,
    pub mempool: MempoolConfig,
    pub genesis: GenesisConfig,
    pub log: LogConfig,
    pub runtime: RuntimeConfig,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// SECTIONS
// =============================================================================

/// Signature and challenge settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Lifetime of a storage challenge.
    pub challenge_ttl_secs: u64,
    /// How often expired challenges are purged.
    pub challenge_purge_interval_secs: u64,
    /// Hex secret key of this node's validator. Without one the node
    /// follows the chain but never produces or votes.
    #[serde(skip_serializing)]
    pub validator_key: Option<String>,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            challenge_ttl_secs: DEFAULT_CHALLENGE_TTL_SECS,
            challenge_purge_interval_secs: 60,
            validator_key: None,
        }
    }
}

impl fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("challenge_ttl_secs", &self.challenge_ttl_secs)
            .field(
                "challenge_purge_interval_secs",
                &self.challenge_purge_interval_secs,
            )
            .field(
                "validator_key",
                &self.validator_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Mempool limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum transactions in pool.
    pub max_transactions: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
        }
    }
}

/// One funded account at genesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    /// Hex address, `0x` prefix optional.
    pub address: String,
    pub balance: Decimal,
    /// Part of `balance` staked as validator stake.
    #[serde(default)]
    pub stake: Decimal,
}

/// Initial chain state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    pub chain_id: u64,
    /// Genesis timestamp (Unix seconds). Nodes of one network must agree on
    /// it; `None` uses the current time and suits single-node setups only.
    pub timestamp: Option<Timestamp>,
    /// Supply ceiling enforced by SafeMath.
    pub max_supply: Decimal,
    pub allocations: Vec<GenesisAllocation>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            timestamp: None,
            max_supply: DEFAULT_MAX_SUPPLY,
            allocations: Vec::new(),
        }
    }
}

impl GenesisConfig {
    /// Single-network development chain: every validator gets `balance`,
    /// `stake` of which is staked.
    pub fn devnet(validators: &[Address], balance: Decimal, stake: Decimal) -> Self {
        Self {
            chain_id: 31337,
            timestamp: Some(0),
            allocations: validators
                .iter()
                .map(|address| GenesisAllocation {
                    address: hex::encode(address),
                    balance,
                    stake,
                })
                .collect(),
            ..Self::default()
        }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `ac_06_consensus=debug,info`.
    pub level: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Background loops and queues of the node process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    /// Inbound network messages buffered before peers see drops.
    pub inbound_queue_capacity: usize,
    /// How often a validator node checks whether it should produce.
    pub production_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            inbound_queue_capacity: 1_024,
            production_interval_ms: 1_000,
        }
    }
}

impl RuntimeConfig {
    pub fn production_interval(&self) -> Duration {
        Duration::from_millis(self.production_interval_ms)
    }
}

// =============================================================================
// LOADING
// =============================================================================

/// Load configuration from `AC_CONFIG` and the process environment.
pub fn load_config() -> Result<NodeConfig, ConfigError> {
    load_config_from(|key| std::env::var(key).ok())
}

/// [`load_config`] against an arbitrary variable lookup.
pub fn load_config_from(
    env: impl Fn(&str) -> Option<String>,
) -> Result<NodeConfig, ConfigError> {
    let mut config = match env("AC_CONFIG") {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    config.apply_env(&env)?;
    config.validate()?;
    Ok(config)
}

fn parse_env<T: FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
    }
}

impl NodeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `AC_*` overrides.
    pub fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = parse_env(env, "AC_MAX_SUPPLY")? {
            self.genesis.max_supply = v;
        }
        if let Some(v) = parse_env(env, "AC_ROTATION_PROBABILITY")? {
            self.consensus.rotation_probability = v;
        }
        if let Some(v) = parse_env(env, "AC_SLASH_FRACTION")? {
            self.consensus.slash_fraction = v;
        }
        if let Some(v) = parse_env(env, "AC_LOCK_TIMEOUT_MS")? {
            self.locks.acquire_timeout_ms = v;
            self.contracts.lock_timeout_ms = v;
        }
        if let Some(v) = parse_env(env, "AC_REQUIRED_VOTES")? {
            self.contracts.required_votes = v;
        }
        if let Some(v) = env("AC_VALIDATOR_KEY") {
            self.crypto.validator_key = Some(v);
        }
        if let Some(v) = env("AC_DATA_DIR") {
            self.runtime.data_dir = PathBuf::from(v);
        }
        if let Some(v) = parse_env(env, "AC_PRODUCTION_INTERVAL_MS")? {
            self.runtime.production_interval_ms = v;
        }
        if let Some(level) = env("AC_LOG_LEVEL").or_else(|| env("RUST_LOG")) {
            self.log.level = level;
        }
        if let Some(v) = parse_env(env, "AC_JSON_LOGS")? {
            self.log.json = v;
        }
        Ok(())
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        let c = &self.consensus;

        if !c.weights.is_normalized() {
            return invalid("consensus.weights must be non-negative and sum to 1");
        }
        if !c.quality_weights.is_normalized() {
            return invalid("consensus.quality_weights must be non-negative and sum to 1");
        }
        if !(0.0..=1.0).contains(&c.rotation_probability) {
            return invalid("consensus.rotation_probability must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&c.min_score_threshold) {
            return invalid("consensus.min_score_threshold must be within [0, 1]");
        }
        if c.max_consecutive_blocks == 0 {
            return invalid("consensus.max_consecutive_blocks must be positive");
        }
        if c.slash_fraction < Decimal::ZERO || c.slash_fraction > Decimal::ONE {
            return invalid("consensus.slash_fraction must be within [0, 1]");
        }
        if c.min_fee < Decimal::ZERO {
            return invalid("consensus.min_fee must not be negative");
        }
        if c.max_txs_per_block == 0 || c.max_reorg_depth == 0 {
            return invalid("consensus block and reorg limits must be positive");
        }
        if c.block_lock_timeout_ms == 0 {
            return invalid("consensus.block_lock_timeout_ms must be positive");
        }

        if self.contracts.required_votes == 0 {
            return invalid("contracts.required_votes must be positive");
        }
        if self.contracts.lock_timeout_ms == 0 || self.locks.acquire_timeout_ms == 0 {
            return invalid("lock timeouts must be positive");
        }
        if self.locks.stale_after_ms == 0 || self.locks.sweep_interval_ms == 0 {
            return invalid("locks.stale_after_ms and locks.sweep_interval_ms must be positive");
        }
        if self.recovery.retry.max_attempts == 0 {
            return invalid("recovery.retry.max_attempts must be positive");
        }
        if self.recovery.breaker.failure_threshold == 0
            || self.recovery.breaker.success_threshold == 0
        {
            return invalid("recovery.breaker thresholds must be positive");
        }

        if self.crypto.challenge_ttl_secs == 0 || self.crypto.challenge_purge_interval_secs == 0 {
            return invalid("challenge ttl and purge interval must be positive");
        }
        if self.mempool.max_transactions == 0 {
            return invalid("mempool limits must be positive");
        }
        if self.runtime.inbound_queue_capacity == 0 || self.runtime.production_interval_ms == 0 {
            return invalid("runtime queue and intervals must be positive");
        }

        self.validate_genesis()
    }

    fn validate_genesis(&self) -> Result<(), ConfigError> {
        let genesis = &self.genesis;
        if genesis.max_supply <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "genesis.max_supply must be positive".to_string(),
            ));
        }
        let mut total = Decimal::ZERO;
        for allocation in &genesis.allocations {
            if allocation.balance < Decimal::ZERO
                || allocation.stake < Decimal::ZERO
                || allocation.stake > allocation.balance
            {
                return Err(ConfigError::Invalid(format!(
                    "genesis allocation {} must satisfy 0 <= stake <= balance",
                    allocation.address
                )));
            }
            total = total.checked_add(allocation.balance).ok_or_else(|| {
                ConfigError::Invalid("genesis allocations overflow".to_string())
            })?;
        }
        if total > genesis.max_supply {
            return Err(ConfigError::Invalid(format!(
                "genesis allocations {total} exceed max supply {}",
                genesis.max_supply
            )));
        }
        Ok(())
    }
}
