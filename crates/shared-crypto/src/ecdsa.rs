//! # Signature Service (secp256k1)
//!
//! Recoverable ECDSA over secp256k1. Messages are Keccak-256 hashed before
//! signing; addresses are the last 20 bytes of Keccak-256 over the
//! uncompressed public key without its `0x04` prefix.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces
//! - Low-S enforced on verify (signing already normalizes)
//! - Address comparison in constant time
//! - Secret scalars zeroized on drop

use crate::constant_time::constant_time_compare;
use crate::errors::{CryptoError, CryptoResult};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rayon::prelude::*;
use shared_types::{keccak256, Address, BlockHeader, Hash, RecoverableSignature, Transaction};
use std::fmt;
use zeroize::Zeroize;

// =============================================================================
// KEYS
// =============================================================================

/// secp256k1 secret key.
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Create from 32 secret bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> CryptoResult<Self> {
        SigningKey::from_bytes(bytes.into())
            .map(Self)
            .map_err(|_| CryptoError::InvalidPrivateKey)
    }

    /// Parse a hex secret, with or without `0x`.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let trimmed = s.trim().trim_start_matches("0x");
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(trimmed, &mut bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(*self.0.verifying_key())
    }

    pub fn address(&self) -> Address {
        derive_address(&self.public_key())
    }

    /// Secret bytes, for persisting a node key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        let mut bytes: [u8; 32] = self.0.to_bytes().into();
        bytes.zeroize();
    }
}

/// secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse SEC1 bytes (compressed or uncompressed).
    pub fn from_sec1_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Compressed 33-byte encoding.
    pub fn to_compressed(&self) -> [u8; 33] {
        let point = self.0.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(point.as_bytes());
        out
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", shared_types::to_hex(&self.to_compressed()))
    }
}

/// Generate a fresh keypair from the OS RNG.
pub fn generate_keypair() -> (PrivateKey, PublicKey) {
    let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
    let public = PublicKey(*signing_key.verifying_key());
    (PrivateKey(signing_key), public)
}

/// One-way address derivation.
pub fn derive_address(public_key: &PublicKey) -> Address {
    address_from_verifying_key(&public_key.0)
}

fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

// =============================================================================
// SIGN / VERIFY
// =============================================================================

/// Sign arbitrary message bytes.
pub fn sign(message: &[u8], private_key: &PrivateKey) -> CryptoResult<RecoverableSignature> {
    sign_prehash(&keccak256(message), private_key)
}

/// Sign a 32-byte digest.
pub fn sign_prehash(digest: &Hash, private_key: &PrivateKey) -> CryptoResult<RecoverableSignature> {
    let (sig, recid) = private_key
        .0
        .sign_prehash_recoverable(digest)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    let mut bytes = [0u8; 65];
    bytes[..64].copy_from_slice(&sig.to_bytes());
    bytes[64] = recid.to_byte();
    Ok(RecoverableSignature(bytes))
}

/// Recover the signer address of `digest`.
pub fn recover_address(digest: &Hash, signature: &RecoverableSignature) -> CryptoResult<Address> {
    let bytes = signature.as_bytes();
    let sig = Signature::from_slice(&bytes[..64]).map_err(|_| CryptoError::InvalidSignatureFormat)?;

    // EIP-2 style malleability guard: normalize_s returns Some only for high S.
    if sig.normalize_s().is_some() {
        return Err(CryptoError::MalleableSignature);
    }

    let recovery_id =
        RecoveryId::from_byte(bytes[64]).ok_or(CryptoError::InvalidRecoveryId(bytes[64]))?;

    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;

    Ok(address_from_verifying_key(&key))
}

/// Check that `signature` over `digest` was produced by `address`.
pub fn verify_signer(
    digest: &Hash,
    signature: &RecoverableSignature,
    address: &Address,
) -> CryptoResult<()> {
    let recovered = recover_address(digest, signature)?;
    if constant_time_compare(&recovered, address) {
        Ok(())
    } else {
        Err(CryptoError::SignerMismatch)
    }
}

/// Boolean verification of message bytes against a claimed address.
pub fn verify(message: &[u8], signature: &RecoverableSignature, address: &Address) -> bool {
    verify_signer(&keccak256(message), signature, address).is_ok()
}

/// One (digest, signature, claimed signer) triple.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub digest: Hash,
    pub signature: RecoverableSignature,
    pub signer: Address,
}

/// Verify many triples in parallel. Output order matches input order.
pub fn verify_batch(requests: &[VerificationRequest]) -> Vec<bool> {
    requests
        .par_iter()
        .map(|r| verify_signer(&r.digest, &r.signature, &r.signer).is_ok())
        .collect()
}

// =============================================================================
// CHAIN OBJECTS
// =============================================================================

/// Sign a transaction in place. The key must belong to `tx.sender`.
pub fn sign_transaction(tx: &mut Transaction, private_key: &PrivateKey) -> CryptoResult<()> {
    if private_key.address() != tx.sender {
        return Err(CryptoError::SignerMismatch);
    }
    tx.signature = Some(sign_prehash(&tx.signing_hash(), private_key)?);
    Ok(())
}

/// Verify a transaction's signature against its claimed sender.
pub fn verify_transaction(tx: &Transaction) -> CryptoResult<()> {
    let signature = tx.signature.as_ref().ok_or(CryptoError::MissingSignature)?;
    verify_signer(&tx.signing_hash(), signature, &tx.sender)
}

/// Sign a block header in place. The key must belong to `header.validator`.
pub fn sign_block_header(header: &mut BlockHeader, private_key: &PrivateKey) -> CryptoResult<()> {
    if private_key.address() != header.validator {
        return Err(CryptoError::SignerMismatch);
    }
    header.signature = Some(sign_prehash(&header.signing_hash(), private_key)?);
    Ok(())
}

/// Verify a block header signature against its validator.
pub fn verify_block_header(header: &BlockHeader) -> CryptoResult<()> {
    let signature = header.signature.as_ref().ok_or(CryptoError::MissingSignature)?;
    verify_signer(&header.signing_hash(), signature, &header.validator)
}
