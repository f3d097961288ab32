//! # Inbound Worker
//!
//! Drains the network bridge's queue into the engine. Gossiped
//! transactions arriving together have their signatures verified as one
//! parallel batch; blocks are applied one at a time, in arrival order.
//!
//! On shutdown the worker stops between messages, never inside one. What
//! is still queued is dropped and counted.

use crate::engine::ArchiveEngine;
use crate::mempool::Mempool;
use ac_07_network_bridge::{InboundMessage, NetworkMessage};
use shared_types::{to_hex, Classify};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Most messages taken from the queue per wakeup.
pub const INBOUND_BATCH_LIMIT: usize = 256;

/// Run until `shutdown` flips to true or the queue closes. The handle
/// yields how many queued messages were left unprocessed.
pub fn spawn_inbound_worker(
    engine: Arc<ArchiveEngine>,
    mut queue: mpsc::Receiver<InboundMessage>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        loop {
            let first = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                next = queue.recv() => match next {
                    Some(message) => message,
                    None => {
                        info!("Inbound queue closed");
                        return 0;
                    }
                },
            };

            let mut batch = vec![first];
            while batch.len() < INBOUND_BATCH_LIMIT {
                match queue.try_recv() {
                    Ok(message) => batch.push(message),
                    Err(_) => break,
                }
            }
            process_batch(&engine, batch, &shutdown).await;
        }

        queue.close();
        let mut cancelled = 0;
        while queue.try_recv().is_ok() {
            cancelled += 1;
        }
        info!(cancelled, "Inbound worker stopped");
        cancelled
    })
}

async fn process_batch(
    engine: &ArchiveEngine,
    batch: Vec<InboundMessage>,
    shutdown: &watch::Receiver<bool>,
) {
    let (transactions, others): (Vec<_>, Vec<_>) = batch
        .into_iter()
        .partition(|inbound| matches!(inbound.message, NetworkMessage::Transaction(_)));

    for inbound in others {
        if *shutdown.borrow() {
            return;
        }
        let kind = inbound.message.kind();
        if let Err(e) = engine.handle_message(inbound.from, inbound.message).await {
            debug!(peer = %inbound.from, kind, error = %e, error_kind = %e.kind(), "Inbound message rejected");
        }
    }

    let transactions: Vec<_> = transactions
        .into_iter()
        .filter_map(|inbound| match inbound.message {
            NetworkMessage::Transaction(tx) => Some(tx),
            _ => None,
        })
        .collect();
    if transactions.is_empty() || *shutdown.borrow() {
        return;
    }
    let total = transactions.len();
    let verdicts =
        match tokio::task::spawn_blocking(move || Mempool::verify_signatures(transactions)).await {
            Ok(verdicts) => verdicts,
            Err(e) => {
                warn!(total, error = %e, "Signature batch worker failed");
                return;
            }
        };

    let mut accepted = 0;
    for (tx, verdict) in verdicts {
        let hash = tx.hash();
        let result = match verdict {
            Ok(()) => engine.admit(tx).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => accepted += 1,
            Err(e) => debug!(hash = %to_hex(&hash), error = %e, "Gossiped transaction rejected"),
        }
    }
    debug!(total, accepted, "Gossiped transactions processed");
}
