//! # Service Container
//!
//! Builds every engine component from a [`NodeConfig`] and hands each one
//! the handles it needs. Nothing here is global: two containers in one
//! process are two independent nodes.
//!
//! ## Construction order
//!
//! ```text
//! Level 0: time, SafeMath, ledger, block store, event bus
//! Level 1: lock manager, recovery manager, challenge manager
//! Level 2: contract runtime
//! Level 3: consensus engine (shares the contract executor)
//! Level 4: mempool
//! ```

use crate::container::config::NodeConfig;
use crate::mempool::Mempool;
use ac_01_safe_math::SafeMath;
use ac_02_ledger_state::{BlockStore, Ledger};
use ac_03_concurrency::LockManager;
use ac_04_recovery::RecoveryManager;
use ac_05_contracts::{ContentSource, ContractDependencies, ContractRuntime};
use ac_06_consensus::{ConsensusDependencies, ConsensusEngine};
use shared_bus::InMemoryEventBus;
use shared_crypto::ChallengeManager;
use shared_types::TimeSource;
use std::sync::Arc;
use tracing::{info, instrument};

/// Every component of one node.
pub struct NodeServices {
    /// Immutable after construction.
    pub config: NodeConfig,
    pub time: Arc<dyn TimeSource>,

    pub ledger: Arc<Ledger>,
    pub blocks: Arc<BlockStore>,
    pub bus: Arc<InMemoryEventBus>,

    pub locks: Arc<LockManager>,
    pub recovery: Arc<RecoveryManager>,
    pub challenges: Arc<ChallengeManager>,

    pub contracts: Arc<ContractRuntime>,
    pub consensus: Arc<ConsensusEngine>,
    pub mempool: Arc<Mempool>,
}

impl NodeServices {
    #[instrument(name = "services_init", skip_all)]
    pub fn new(
        config: NodeConfig,
        time: Arc<dyn TimeSource>,
        content: Arc<dyn ContentSource>,
    ) -> Self {
        let ledger = Arc::new(Ledger::new(SafeMath::new(config.genesis.max_supply)));
        let blocks = Arc::new(BlockStore::new());
        let bus = Arc::new(InMemoryEventBus::new());

        let locks = LockManager::new(config.locks);
        let recovery = Arc::new(RecoveryManager::new(config.recovery, time.clone()));
        let challenges = Arc::new(ChallengeManager::new(
            time.clone(),
            config.crypto.challenge_ttl_secs,
        ));

        let contracts = Arc::new(ContractRuntime::new(ContractDependencies {
            ledger: ledger.clone(),
            locks: locks.clone(),
            recovery: recovery.clone(),
            bus: bus.clone(),
            challenges: challenges.clone(),
            content,
            time: time.clone(),
            config: config.contracts.clone(),
        }));

        let consensus = Arc::new(ConsensusEngine::new(ConsensusDependencies {
            ledger: ledger.clone(),
            blocks: blocks.clone(),
            locks: locks.clone(),
            recovery: recovery.clone(),
            bus: bus.clone(),
            time: time.clone(),
            contracts: contracts.executor().clone(),
            config: config.consensus.clone(),
        }));

        let mempool = Arc::new(Mempool::new(config.mempool.clone()));
        info!(
            max_supply = %config.genesis.max_supply,
            required_votes = config.contracts.required_votes,
            "Node services initialized"
        );

        Self {
            config,
            time,
            ledger,
            blocks,
            bus,
            locks,
            recovery,
            challenges,
            contracts,
            consensus,
            mempool,
        }
    }
}
