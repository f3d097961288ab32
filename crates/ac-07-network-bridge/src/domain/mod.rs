pub mod error;
pub mod message;

pub use error::{NetworkError, NetworkResult};
pub use message::{InboundMessage, NetworkMessage, PeerId, MAX_MESSAGE_SIZE};
