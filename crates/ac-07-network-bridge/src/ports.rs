//! The port the node uses to reach its peers. Transports (in-process hub,
//! TCP, QUIC) implement it; the engine never sees connection details.

use crate::domain::{InboundMessage, NetworkMessage, NetworkResult, PeerId};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait NetworkBridge: Send + Sync {
    fn local_id(&self) -> PeerId;

    /// Fire-and-forget delivery to every connected peer. Returns how many
    /// peers accepted the message; slow peers may miss it.
    async fn broadcast(&self, message: NetworkMessage) -> usize;

    /// Take the inbound channel. Succeeds once per endpoint.
    fn on_receive(&self) -> NetworkResult<mpsc::Receiver<InboundMessage>>;

    /// Peers currently reachable, excluding this node.
    fn peer_count(&self) -> usize;
}
