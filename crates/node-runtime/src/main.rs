//! # ArchiveChain Node
//!
//! 1. Load configuration (`AC_CONFIG` file, then `AC_*` variables)
//! 2. Install the log subscriber
//! 3. Build the runtime, create genesis, spawn background tasks
//! 4. Run until Ctrl+C, then shut down gracefully

use std::sync::Arc;

use ac_05_contracts::InMemoryContentSource;
use ac_07_network_bridge::InMemoryNetwork;
use anyhow::{Context, Result};
use node_runtime::{init_logging, load_config, NodeRuntime};
use shared_types::SystemTimeSource;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_logging(&config.log)?;

    // Single-process hub until a socket transport implements NetworkBridge.
    let hub = InMemoryNetwork::with_capacity(config.runtime.inbound_queue_capacity);
    let network = Arc::new(hub.connect());

    let runtime = NodeRuntime::new(
        config,
        Arc::new(SystemTimeSource),
        Arc::new(InMemoryContentSource::new()),
        network,
    )?;
    runtime.start().await?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
