//! # Shared Crypto
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-256, HMAC-SHA256 | Salts, salted digests |
//! | `constant_time` | `subtle` | Digest/signature comparison |
//! | `challenge` | salted digest | Proof-of-storage challenges |
//! | `ecdsa` | secp256k1 | Transaction, block and vote signatures |
//!
//! Nothing here holds global state. The only stateful piece,
//! [`ChallengeManager`], is constructed explicitly and shared by `Arc`.

#![warn(clippy::all)]

pub mod challenge;
pub mod constant_time;
pub mod ecdsa;
pub mod errors;
pub mod hashing;

pub use challenge::{Challenge, ChallengeId, ChallengeManager, DEFAULT_CHALLENGE_TTL_SECS};
pub use constant_time::constant_time_compare;
pub use ecdsa::{
    derive_address, generate_keypair, recover_address, sign, sign_block_header, sign_prehash,
    sign_transaction, verify, verify_batch, verify_block_header, verify_signer,
    verify_transaction, PrivateKey, PublicKey, VerificationRequest,
};
pub use errors::{CryptoError, CryptoResult};
pub use hashing::{generate_secure_salt, secure_hash_with_salt, sha256, Digest, Salt, SALT_LEN};
