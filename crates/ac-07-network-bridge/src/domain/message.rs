//! Gossip payloads and their wire form.

use super::error::{NetworkError, NetworkResult};
use serde::{Deserialize, Serialize};
use shared_types::{Block, Transaction};
use std::fmt;

/// Upper bound on an encoded message.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Opaque endpoint identity assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Everything nodes gossip to each other. Validator actions such as votes
/// travel as signed transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkMessage {
    Block(Block),
    Transaction(Transaction),
}

impl NetworkMessage {
    /// Label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Block(_) => "block",
            Self::Transaction(_) => "transaction",
        }
    }

    pub fn encode(&self) -> NetworkResult<Vec<u8>> {
        let bytes = bincode::serialize(self).map_err(|e| NetworkError::Codec(e.to_string()))?;
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(NetworkError::MessageTooLarge {
                size: bytes.len(),
                limit: MAX_MESSAGE_SIZE,
            });
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> NetworkResult<Self> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(NetworkError::MessageTooLarge {
                size: bytes.len(),
                limit: MAX_MESSAGE_SIZE,
            });
        }
        bincode::deserialize(bytes).map_err(|e| NetworkError::Codec(e.to_string()))
    }
}

/// A message together with the peer it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub from: PeerId,
    pub message: NetworkMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{BlockHeader, TransactionPayload, VoteChoice, ZERO_HASH};

    #[test]
    fn test_wire_format() {
        let vote = Transaction::new(
            [7; 20],
            3,
            100,
            Default::default(),
            TransactionPayload::Governance {
                proposal_id: 9,
                choice: VoteChoice::Reject,
            },
        );
        let message = NetworkMessage::Block(Block {
            header: BlockHeader {
                number: 1,
                parent_hash: [1; 32],
                merkle_root: ZERO_HASH,
                state_root: ZERO_HASH,
                timestamp: 100,
                validator: [7; 20],
                difficulty: 0,
                signature: None,
            },
            transactions: vec![vote],
        });
        assert_eq!(message.kind(), "block");
        let bytes = message.encode().unwrap();
        assert_eq!(NetworkMessage::decode(&bytes).unwrap(), message);

        assert!(matches!(
            NetworkMessage::decode(&bytes[..bytes.len() / 2]),
            Err(NetworkError::Codec(_))
        ));
        let oversized = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            NetworkMessage::decode(&oversized),
            Err(NetworkError::MessageTooLarge { .. })
        ));
    }
}
