//! # Node Runtime
//!
//! Owns the engine and every background task of one node.
//!
//! ## Startup Sequence
//!
//! 1. Build services from the validated config
//! 2. Create genesis block (if not exists)
//! 3. Spawn lock sweeper and challenge purge
//! 4. Spawn the inbound worker on the network bridge's queue
//! 5. Spawn the block producer if the node holds a validator key
//!
//! ## Shutdown Sequence
//!
//! 1. Flip the shared watch channel to true
//! 2. Await each task, giving up after [`SHUTDOWN_GRACE`]

use crate::container::{NodeConfig, NodeServices};
use crate::engine::ArchiveEngine;
use crate::genesis::GenesisBuilder;
use crate::handlers::spawn_inbound_worker;
use ac_05_contracts::ContentSource;
use ac_07_network_bridge::NetworkBridge;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use shared_crypto::PrivateKey;
use shared_types::{to_hex, Block, TimeSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long shutdown waits for each task.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

enum Task {
    Loop(&'static str, JoinHandle<()>),
    Inbound(JoinHandle<usize>),
}

pub struct NodeRuntime {
    engine: Arc<ArchiveEngine>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<Task>>,
}

impl NodeRuntime {
    /// Build every component. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: NodeConfig,
        time: Arc<dyn TimeSource>,
        content: Arc<dyn ContentSource>,
        network: Arc<dyn NetworkBridge>,
    ) -> Result<Self> {
        let validator_key = config
            .crypto
            .validator_key
            .as_deref()
            .map(PrivateKey::from_hex)
            .transpose()
            .context("invalid validator key")?;
        if let Some(key) = &validator_key {
            info!(validator = %to_hex(&key.address()), "Running as validator");
        }

        let services = Arc::new(NodeServices::new(config, time, content));
        let engine = Arc::new(ArchiveEngine::new(services, network, validator_key));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            engine,
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn engine(&self) -> &Arc<ArchiveEngine> {
        &self.engine
    }

    /// Install genesis and spawn the background tasks. Returns the genesis
    /// block.
    pub async fn start(&self) -> Result<Block> {
        let services = self.engine.services();
        let config = &services.config;

        let genesis = GenesisBuilder::new(config.genesis.clone())
            .build(&services.ledger, &services.consensus, services.time.now())
            .context("failed to initialize genesis")?;

        let inbound = self
            .engine
            .network()
            .on_receive()
            .context("network bridge inbound queue unavailable")?;

        let mut tasks = self.tasks.lock();
        tasks.push(Task::Loop(
            "lock_sweeper",
            services.locks.spawn_sweeper(self.shutdown_rx.clone()),
        ));
        tasks.push(Task::Loop(
            "challenge_purge",
            services.challenges.clone().spawn_purge_task(
                Duration::from_secs(config.crypto.challenge_purge_interval_secs),
                self.shutdown_rx.clone(),
            ),
        ));
        tasks.push(Task::Inbound(spawn_inbound_worker(
            self.engine.clone(),
            inbound,
            self.shutdown_rx.clone(),
        )));
        if self.engine.validator_address().is_some() {
            tasks.push(Task::Loop(
                "block_producer",
                self.engine
                    .clone()
                    .spawn_producer(config.runtime.production_interval(), self.shutdown_rx.clone()),
            ));
        }

        info!(
            genesis = %to_hex(&genesis.hash()),
            tasks = tasks.len(),
            peer = %self.engine.network().local_id(),
            data_dir = %config.runtime.data_dir.display(),
            "Node started"
        );
        Ok(genesis)
    }

    /// Stop every background task. Safe to call more than once.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        if self.shutdown_tx.send(true).is_err() {
            warn!("No task was listening for shutdown");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            match task {
                Task::Loop(name, handle) => {
                    match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!(task = name, error = %e, "Task ended abnormally"),
                        Err(_) => warn!(task = name, "Task did not stop in time"),
                    }
                }
                Task::Inbound(handle) => match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                    Ok(Ok(cancelled)) if cancelled > 0 => {
                        warn!(cancelled, "Queued network messages dropped at shutdown");
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!(task = "inbound", error = %e, "Task ended abnormally"),
                    Err(_) => warn!(task = "inbound", "Task did not stop in time"),
                },
            }
        }
        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::GenesisConfig;
    use ac_05_contracts::InMemoryContentSource;
    use ac_07_network_bridge::{InMemoryNetwork, NetworkMessage};
    use rust_decimal::Decimal;
    use shared_types::ManualTimeSource;

    const VALIDATOR_HEX: &str = "0x0101010101010101010101010101010101010101010101010101010101010101";

    fn create_test_config(key: Option<&str>) -> NodeConfig {
        let validator = PrivateKey::from_hex(VALIDATOR_HEX).unwrap().address();
        let mut config = NodeConfig {
            genesis: GenesisConfig::devnet(&[validator], Decimal::from(1_000), Decimal::from(100)),
            ..NodeConfig::default()
        };
        config.genesis.timestamp = Some(1_000);
        config.crypto.validator_key = key.map(str::to_string);
        config.runtime.production_interval_ms = 20;
        config
    }

    fn create_test_runtime(config: NodeConfig, hub: &Arc<InMemoryNetwork>) -> NodeRuntime {
        NodeRuntime::new(
            config,
            Arc::new(ManualTimeSource::new(1_100)),
            Arc::new(InMemoryContentSource::new()),
            Arc::new(hub.connect()),
        )
        .unwrap()
    }

    #[test]
    fn test_bad_validator_key_rejected() {
        let hub = InMemoryNetwork::new();
        let result = NodeRuntime::new(
            create_test_config(Some("0xnothex")),
            Arc::new(ManualTimeSource::new(0)),
            Arc::new(InMemoryContentSource::new()),
            Arc::new(hub.connect()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_validator_node_produces_and_gossips() {
        let hub = InMemoryNetwork::new();
        let observer = hub.connect();
        let mut observed = observer.on_receive().unwrap();
        let runtime = create_test_runtime(create_test_config(Some(VALIDATOR_HEX)), &hub);

        let genesis = runtime.start().await.unwrap();
        assert_eq!(genesis.number(), 0);

        let gossiped = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(inbound) = observed.recv().await {
                    if let NetworkMessage::Block(block) = inbound.message {
                        return block;
                    }
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(gossiped.number(), 1);
        assert_eq!(gossiped.parent_hash(), genesis.hash());
        assert!(runtime.engine().get_blockchain_info().height >= 1);

        runtime.shutdown().await;
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_observer_node_follows_gossip() {
        let hub = InMemoryNetwork::new();
        let validator = create_test_runtime(create_test_config(Some(VALIDATOR_HEX)), &hub);
        let follower = create_test_runtime(create_test_config(None), &hub);

        let genesis = follower.start().await.unwrap();
        assert_eq!(validator.start().await.unwrap(), genesis);

        tokio::time::timeout(Duration::from_secs(5), async {
            while follower.engine().get_blockchain_info().height == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        validator.shutdown().await;
        follower.shutdown().await;
    }
}
