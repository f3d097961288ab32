//! # In-Process Network
//!
//! A hub connecting any number of endpoints inside one process. Each
//! endpoint owns a bounded inbound queue; a broadcast copies the message
//! into every other endpoint's queue without waiting. Used by tests and
//! single-process multi-node setups.

use crate::domain::{InboundMessage, NetworkError, NetworkMessage, NetworkResult, PeerId};
use crate::metrics;
use crate::ports::NetworkBridge;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Default inbound queue length per endpoint.
pub const DEFAULT_INBOUND_CAPACITY: usize = 1_024;

pub struct InMemoryNetwork {
    peers: RwLock<HashMap<PeerId, mpsc::Sender<InboundMessage>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_INBOUND_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            peers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        })
    }

    /// Attach a new endpoint.
    pub fn connect(self: &Arc<Self>) -> InMemoryBridge {
        let id = PeerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.capacity);
        self.peers.write().insert(id, tx);
        debug!(peer = %id, "Endpoint connected");
        InMemoryBridge {
            id,
            hub: Arc::clone(self),
            inbound: Mutex::new(Some(rx)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn disconnect(&self, peer: PeerId) {
        if self.peers.write().remove(&peer).is_some() {
            debug!(%peer, "Endpoint disconnected");
        }
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn deliver(&self, from: PeerId, message: &NetworkMessage) -> (usize, u64) {
        let targets: Vec<(PeerId, mpsc::Sender<InboundMessage>)> = self
            .peers
            .read()
            .iter()
            .filter(|(id, _)| **id != from)
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut dropped = 0;
        for (peer, tx) in targets {
            let inbound = InboundMessage {
                from,
                message: message.clone(),
            };
            match tx.try_send(inbound) {
                Ok(()) => {
                    delivered += 1;
                    metrics::record_sent(message.kind());
                }
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    metrics::record_dropped(message.kind());
                    warn!(%peer, kind = message.kind(), "Peer queue full; message dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    dropped += 1;
                    metrics::record_dropped(message.kind());
                    self.disconnect(peer);
                }
            }
        }
        (delivered, dropped)
    }
}

/// One endpoint of an [`InMemoryNetwork`]. Disconnects on drop.
pub struct InMemoryBridge {
    id: PeerId,
    hub: Arc<InMemoryNetwork>,
    inbound: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    dropped: AtomicU64,
}

impl InMemoryBridge {
    /// Messages this endpoint failed to hand to a peer.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Point-to-point send, used to answer a specific peer.
    pub fn send_to(&self, peer: PeerId, message: NetworkMessage) -> NetworkResult<()> {
        let tx = self
            .hub
            .peers
            .read()
            .get(&peer)
            .cloned()
            .ok_or(NetworkError::Disconnected(peer))?;
        tx.try_send(InboundMessage {
            from: self.id,
            message,
        })
        .map_err(|_| NetworkError::Disconnected(peer))
    }
}

#[async_trait]
impl NetworkBridge for InMemoryBridge {
    fn local_id(&self) -> PeerId {
        self.id
    }

    async fn broadcast(&self, message: NetworkMessage) -> usize {
        let (delivered, dropped) = self.hub.deliver(self.id, &message);
        if dropped > 0 {
            self.dropped.fetch_add(dropped, Ordering::Relaxed);
        }
        delivered
    }

    fn on_receive(&self) -> NetworkResult<mpsc::Receiver<InboundMessage>> {
        self.inbound
            .lock()
            .take()
            .ok_or(NetworkError::AlreadySubscribed(self.id))
    }

    fn peer_count(&self) -> usize {
        self.hub.len().saturating_sub(1)
    }
}

impl Drop for InMemoryBridge {
    fn drop(&mut self) {
        self.hub.disconnect(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared_types::{TokenAction, Transaction, TransactionPayload};

    fn create_test_message() -> NetworkMessage {
        NetworkMessage::Transaction(Transaction::new(
            [1; 20],
            0,
            100,
            Decimal::ONE,
            TransactionPayload::Token {
                recipient: [2; 20],
                amount: Decimal::TEN,
                action: TokenAction::Transfer,
            },
        ))
    }

    #[tokio::test]
    async fn test_broadcast_reaches_other_peers() {
        let hub = InMemoryNetwork::new();
        let a = hub.connect();
        let b = hub.connect();
        let c = hub.connect();
        let mut rx_a = a.on_receive().unwrap();
        let mut rx_b = b.on_receive().unwrap();
        let mut rx_c = c.on_receive().unwrap();
        assert_eq!(a.peer_count(), 2);

        assert_eq!(a.broadcast(create_test_message()).await, 2);
        assert_eq!(rx_b.recv().await.unwrap().from, a.local_id());
        assert_eq!(rx_c.recv().await.unwrap().message, create_test_message());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_inbound_channel_taken_once() {
        let hub = InMemoryNetwork::new();
        let a = hub.connect();
        assert!(a.on_receive().is_ok());
        assert_eq!(a.on_receive().err(), Some(NetworkError::AlreadySubscribed(a.local_id())));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let hub = InMemoryNetwork::with_capacity(1);
        let a = hub.connect();
        let b = hub.connect();
        let _rx_b = b.on_receive().unwrap();

        assert_eq!(a.broadcast(create_test_message()).await, 1);
        assert_eq!(a.broadcast(create_test_message()).await, 0);
        assert_eq!(a.dropped(), 1);
    }

    #[tokio::test]
    async fn test_dropped_endpoint_leaves_hub() {
        let hub = InMemoryNetwork::new();
        let a = hub.connect();
        let b = hub.connect();
        let b_id = b.local_id();
        drop(b);
        assert_eq!(a.peer_count(), 0);

        assert_eq!(
            a.send_to(b_id, create_test_message()),
            Err(NetworkError::Disconnected(b_id))
        );
    }
}
