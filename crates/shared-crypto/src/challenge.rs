//! # Storage Challenges
//!
//! A challenge asks a node to prove it still holds an archive. The node
//! answers with `secure_hash_with_salt(content, challenge.nonce)`; the
//! verifier recomputes it from its own copy and compares in constant time.
//!
//! Challenges are single-use and expire after `ttl_secs` (one hour by
//! default). `purge_expired` drops stale entries; `spawn_purge_task` runs it on
//! an interval until shutdown.

use crate::constant_time::constant_time_compare;
use crate::errors::{CryptoError, CryptoResult};
use crate::hashing::{generate_secure_salt, secure_hash_with_salt, Digest, Salt};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest as _, Sha256};
use shared_types::{to_hex, Address, Hash, TimeSource, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default challenge lifetime.
pub const DEFAULT_CHALLENGE_TTL_SECS: u64 = 3600;

/// Identifier of an issued challenge.
pub type ChallengeId = [u8; 32];

/// An outstanding proof-of-storage challenge.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: ChallengeId,
    pub node_id: Address,
    pub archive_id: Hash,
    pub nonce: Salt,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Challenge {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Answer this challenge from local content.
    pub fn respond(&self, content: &[u8]) -> Digest {
        secure_hash_with_salt(content, &self.nonce)
    }
}

/// Issues and checks challenges. Explicitly constructed and shared by handle.
pub struct ChallengeManager {
    time: Arc<dyn TimeSource>,
    ttl_secs: u64,
    outstanding: Mutex<HashMap<ChallengeId, Challenge>>,
}

impl ChallengeManager {
    pub fn new(time: Arc<dyn TimeSource>, ttl_secs: u64) -> Self {
        Self {
            time,
            ttl_secs,
            outstanding: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh challenge for `node_id` over `archive_id`.
    pub fn generate_secure_challenge(
        &self,
        node_id: Address,
        archive_id: Hash,
    ) -> CryptoResult<Challenge> {
        let now = self.time.now();
        let nonce = generate_secure_salt("archivechain.challenge")?;

        let mut entropy = [0u8; 32];
        OsRng.fill_bytes(&mut entropy);

        let mut hasher = Sha256::new();
        hasher.update(entropy);
        hasher.update(node_id);
        hasher.update(archive_id);
        hasher.update(now.to_le_bytes());
        let id: ChallengeId = hasher.finalize().into();

        let challenge = Challenge {
            id,
            node_id,
            archive_id,
            nonce,
            issued_at: now,
            expires_at: now.saturating_add(self.ttl_secs),
        };

        self.outstanding.lock().insert(id, challenge.clone());
        debug!(
            challenge = %to_hex(&id[..8]),
            node = %to_hex(&node_id),
            "Challenge issued"
        );
        Ok(challenge)
    }

    /// Check `response` from `responder` against `reference_content`.
    ///
    /// The challenge is consumed whether the answer is right or wrong.
    pub fn verify_response(
        &self,
        id: &ChallengeId,
        responder: &Address,
        response: &Digest,
        reference_content: &[u8],
    ) -> CryptoResult<()> {
        let challenge = self
            .outstanding
            .lock()
            .remove(id)
            .ok_or(CryptoError::ChallengeNotFound)?;

        if challenge.is_expired(self.time.now()) {
            return Err(CryptoError::ChallengeExpired {
                expires_at: challenge.expires_at,
            });
        }

        let expected = challenge.respond(reference_content);
        let node_ok = constant_time_compare(&challenge.node_id, responder);
        let digest_ok = constant_time_compare(expected.as_bytes(), response.as_bytes());
        if node_ok && digest_ok {
            Ok(())
        } else {
            Err(CryptoError::ChallengeFailed)
        }
    }

    /// Look up an outstanding challenge.
    pub fn get(&self, id: &ChallengeId) -> Option<Challenge> {
        self.outstanding.lock().get(id).cloned()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }

    /// Drop expired challenges. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.time.now();
        let mut map = self.outstanding.lock();
        let before = map.len();
        map.retain(|_, c| !c.is_expired(now));
        let purged = before - map.len();
        if purged > 0 {
            debug!(purged, remaining = map.len(), "Purged expired challenges");
        }
        purged
    }

    /// Run `purge_expired` every `interval` until `shutdown` flips to true.
    pub fn spawn_purge_task(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.purge_expired();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Challenge purge task stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ManualTimeSource;

    fn create_test_manager() -> (Arc<ManualTimeSource>, ChallengeManager) {
        let clock = Arc::new(ManualTimeSource::new(1_000));
        let manager = ChallengeManager::new(clock.clone(), DEFAULT_CHALLENGE_TTL_SECS);
        (clock, manager)
    }

    #[test]
    fn test_correct_response_accepted_once() {
        let (_, manager) = create_test_manager();
        let node = [1u8; 20];
        let challenge = manager.generate_secure_challenge(node, [2u8; 32]).unwrap();
        let response = challenge.respond(b"archived bytes");

        assert!(manager
            .verify_response(&challenge.id, &node, &response, b"archived bytes")
            .is_ok());
        assert_eq!(
            manager.verify_response(&challenge.id, &node, &response, b"archived bytes"),
            Err(CryptoError::ChallengeNotFound)
        );
    }

    #[test]
    fn test_wrong_content_rejected() {
        let (_, manager) = create_test_manager();
        let node = [1u8; 20];
        let challenge = manager.generate_secure_challenge(node, [2u8; 32]).unwrap();
        let response = challenge.respond(b"something else");
        assert_eq!(
            manager.verify_response(&challenge.id, &node, &response, b"archived bytes"),
            Err(CryptoError::ChallengeFailed)
        );
    }

    #[test]
    fn test_wrong_responder_rejected() {
        let (_, manager) = create_test_manager();
        let challenge = manager
            .generate_secure_challenge([1u8; 20], [2u8; 32])
            .unwrap();
        let response = challenge.respond(b"data");
        assert_eq!(
            manager.verify_response(&challenge.id, &[9u8; 20], &response, b"data"),
            Err(CryptoError::ChallengeFailed)
        );
    }

    #[test]
    fn test_expired_challenge_rejected() {
        let (clock, manager) = create_test_manager();
        let node = [1u8; 20];
        let challenge = manager.generate_secure_challenge(node, [2u8; 32]).unwrap();
        clock.advance(DEFAULT_CHALLENGE_TTL_SECS);
        let response = challenge.respond(b"data");
        assert!(matches!(
            manager.verify_response(&challenge.id, &node, &response, b"data"),
            Err(CryptoError::ChallengeExpired { .. })
        ));
    }

    #[test]
    fn test_challenges_for_same_inputs_differ() {
        let (_, manager) = create_test_manager();
        let a = manager.generate_secure_challenge([1u8; 20], [2u8; 32]).unwrap();
        let b = manager.generate_secure_challenge([1u8; 20], [2u8; 32]).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_purge_expired() {
        let (clock, manager) = create_test_manager();
        manager.generate_secure_challenge([1u8; 20], [2u8; 32]).unwrap();
        clock.advance(10);
        manager.generate_secure_challenge([1u8; 20], [3u8; 32]).unwrap();

        clock.advance(DEFAULT_CHALLENGE_TTL_SECS - 5);
        assert_eq!(manager.purge_expired(), 1);
        assert_eq!(manager.outstanding(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_task_stops_on_shutdown() {
        let (clock, manager) = create_test_manager();
        let manager = Arc::new(manager);
        manager.generate_secure_challenge([1u8; 20], [2u8; 32]).unwrap();
        clock.advance(DEFAULT_CHALLENGE_TTL_SECS + 1);

        let (tx, rx) = watch::channel(false);
        let handle = manager.clone().spawn_purge_task(Duration::from_secs(60), rx);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(manager.outstanding(), 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
