//! # Test Fixtures
//!
//! Seeds below 10 are validators, seeds from 10 up are plain users. Every
//! node built here starts from the same genesis, so nodes on one hub agree
//! on block 0.

use ac_05_contracts::InMemoryContentSource;
use ac_07_network_bridge::InMemoryNetwork;
use node_runtime::container::{GenesisAllocation, GenesisConfig, NodeConfig, NodeServices};
use node_runtime::genesis::GenesisBuilder;
use node_runtime::ArchiveEngine;
use rust_decimal::Decimal;
use shared_crypto::{sign_transaction, PrivateKey};
use shared_types::{
    Address, ManualTimeSource, Timestamp, TokenAction, Transaction, TransactionPayload,
};
use std::sync::Arc;

pub const GENESIS_TIME: Timestamp = 1_000;

/// Gap that keeps one validator clear of the anti-spam interval.
pub const BLOCK_SPACING: u64 = 6;

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn key(seed: u8) -> PrivateKey {
    PrivateKey::from_bytes(&[seed; 32]).unwrap()
}

pub fn address(seed: u8) -> Address {
    key(seed).address()
}

/// Genesis funding `validators` (seed, stake) with 1000 each and `users`
/// with 500 each.
pub fn create_test_genesis(validators: &[(u8, &str)], users: &[u8]) -> GenesisConfig {
    let mut allocations: Vec<GenesisAllocation> = validators
        .iter()
        .map(|(seed, stake)| GenesisAllocation {
            address: format!("0x{}", hex_address(*seed)),
            balance: dec("1000"),
            stake: dec(stake),
        })
        .collect();
    allocations.extend(users.iter().map(|seed| GenesisAllocation {
        address: hex_address(*seed),
        balance: dec("500"),
        stake: Decimal::ZERO,
    }));
    GenesisConfig {
        chain_id: 31337,
        timestamp: Some(GENESIS_TIME),
        allocations,
        ..GenesisConfig::default()
    }
}

fn hex_address(seed: u8) -> String {
    address(seed).iter().map(|b| format!("{b:02x}")).collect()
}

/// One wired node with genesis installed and a controllable clock.
pub struct TestNode {
    pub services: Arc<NodeServices>,
    pub engine: Arc<ArchiveEngine>,
    pub time: Arc<ManualTimeSource>,
}

impl TestNode {
    pub fn new(genesis: GenesisConfig, hub: &Arc<InMemoryNetwork>, validator: Option<u8>) -> Self {
        Self::with_config(
            NodeConfig {
                genesis,
                ..NodeConfig::default()
            },
            hub,
            validator,
        )
    }

    pub fn with_config(config: NodeConfig, hub: &Arc<InMemoryNetwork>, validator: Option<u8>) -> Self {
        let time = Arc::new(ManualTimeSource::new(GENESIS_TIME));
        let genesis = config.genesis.clone();
        let services = Arc::new(NodeServices::new(
            config,
            time.clone(),
            Arc::new(InMemoryContentSource::new()),
        ));
        GenesisBuilder::new(genesis)
            .build(&services.ledger, &services.consensus, GENESIS_TIME)
            .unwrap();
        let engine = Arc::new(ArchiveEngine::new(
            services.clone(),
            Arc::new(hub.connect()),
            validator.map(key),
        ));
        Self {
            services,
            engine,
            time,
        }
    }

    pub fn advance(&self, secs: u64) {
        self.time.advance(secs);
    }

    pub fn balance(&self, seed: u8) -> Decimal {
        self.services.ledger.read(|view| view.balance(&address(seed)))
    }
}

pub fn signed(seed: u8, nonce: u64, payload: TransactionPayload) -> Transaction {
    let sender = key(seed);
    let mut tx = Transaction::new(sender.address(), nonce, GENESIS_TIME, dec("1"), payload);
    sign_transaction(&mut tx, &sender).unwrap();
    tx
}

pub fn signed_transfer(seed: u8, nonce: u64, recipient: Address, amount: &str) -> Transaction {
    signed(
        seed,
        nonce,
        TransactionPayload::Token {
            recipient,
            amount: dec(amount),
            action: TokenAction::Transfer,
        },
    )
}
