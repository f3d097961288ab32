//! # Salts and Salted Hashing
//!
//! Salts are 32 bytes of OS randomness bound to a context label. Salted
//! digests are HMAC-SHA256 keyed by the salt, so the salt never appears as a
//! plain prefix that length-extension could exploit.

use crate::errors::{CryptoError, CryptoResult};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest as _, Sha256};
use std::fmt;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

/// Salt length in bytes.
pub const SALT_LEN: usize = 32;

/// Random salt. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    pub fn from_bytes(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Salt(..)")
    }
}

impl Drop for Salt {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// 32-byte SHA-256 class digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", shared_types::to_hex(&self.0[..8]))
    }
}

/// Generate a fresh salt for `context`.
///
/// The OS RNG supplies the entropy; the context is mixed in so salts drawn
/// for different purposes never collide even if the RNG repeated.
pub fn generate_secure_salt(context: &str) -> CryptoResult<Salt> {
    if context.is_empty() {
        return Err(CryptoError::EmptyContext);
    }

    let mut entropy = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut entropy);

    let mut hasher = Sha256::new();
    hasher.update(b"archivechain.salt.v1");
    hasher.update((context.len() as u64).to_le_bytes());
    hasher.update(context.as_bytes());
    hasher.update(entropy);
    entropy.zeroize();

    Ok(Salt(hasher.finalize().into()))
}

/// Salted digest of `data`.
pub fn secure_hash_with_salt(data: &[u8], salt: &Salt) -> Digest {
    // HMAC accepts keys of any length, so this cannot fail for a 32-byte key.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(salt.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(data);
    Digest(mac.finalize().into_bytes().into())
}

/// Plain SHA-256.
pub fn sha256(data: &[u8]) -> Digest {
    Digest(Sha256::digest(data).into())
}
