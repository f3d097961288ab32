//! Crypto error types.

use shared_types::{Classify, ErrorKind};
use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Secret key bytes are not a valid secp256k1 scalar.
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Public key bytes are not a valid curve point.
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// r/s bytes do not form a signature.
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Recovery byte outside 0..=3.
    #[error("Invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    /// S in the upper half of the curve order.
    #[error("Malleable signature: high S value")]
    MalleableSignature,

    /// Public key could not be recovered.
    #[error("Public key recovery failed")]
    RecoveryFailed,

    /// Recovered signer differs from the claimed address.
    #[error("Signer mismatch")]
    SignerMismatch,

    /// A signature was required but absent.
    #[error("Missing signature")]
    MissingSignature,

    /// Signing backend failure.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Salt requested without a context label.
    #[error("Salt context must not be empty")]
    EmptyContext,

    /// Challenge id unknown or already consumed.
    #[error("Challenge not found")]
    ChallengeNotFound,

    /// Challenge window elapsed.
    #[error("Challenge expired at {expires_at}")]
    ChallengeExpired { expires_at: u64 },

    /// Response does not match the challenge.
    #[error("Challenge response rejected")]
    ChallengeFailed,
}

impl Classify for CryptoError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::ChallengeNotFound => ErrorKind::NotFound,
            Self::SigningFailed(_) => ErrorKind::Internal,
            _ => ErrorKind::Validation,
        }
    }
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
