//! # Service Container
//!
//! Configuration plus the explicitly constructed component graph of one
//! node.

pub mod config;
pub mod services;

pub use config::{
    load_config, load_config_from, ConfigError, CryptoConfig, GenesisAllocation, GenesisConfig,
    LogConfig, MempoolConfig, NodeConfig, RuntimeConfig,
};
pub use services::NodeServices;
