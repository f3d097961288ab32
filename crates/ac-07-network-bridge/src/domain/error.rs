use super::message::PeerId;
use shared_types::{Classify, ErrorKind};
use thiserror::Error;

/// Network bridge errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// `on_receive` may hand out the inbound channel only once.
    #[error("Inbound channel of peer {0} already taken")]
    AlreadySubscribed(PeerId),

    #[error("Peer {0} is not connected")]
    Disconnected(PeerId),

    #[error("Message of {size} bytes exceeds limit {limit}")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Codec error: {0}")]
    Codec(String),
}

impl Classify for NetworkError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::MessageTooLarge { .. } | Self::Codec(_) => ErrorKind::Validation,
            Self::AlreadySubscribed(_) | Self::Disconnected(_) => ErrorKind::Internal,
        }
    }
}

pub type NetworkResult<T> = Result<T, NetworkError>;
