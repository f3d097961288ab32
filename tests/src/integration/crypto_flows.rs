//! # Crypto Flows
//!
//! Signatures over fresh keypairs, bit-level tampering, and the
//! preservation challenge lifecycle against a live clock.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use rand::{Rng, RngCore};
    use shared_crypto::{
        constant_time_compare, derive_address, generate_keypair, generate_secure_salt,
        secure_hash_with_salt, sign, sign_prehash, verify, verify_batch, verify_transaction,
        ChallengeManager, CryptoError, VerificationRequest,
    };
    use shared_types::{Classify, ErrorKind, ManualTimeSource, RecoverableSignature};
    use std::sync::Arc;

    // =========================================================================
    // SIGN / VERIFY
    // =========================================================================

    #[test]
    fn test_sign_verify_holds_for_random_keys() {
        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let (private, public) = generate_keypair();
            let address = derive_address(&public);
            assert_eq!(address, private.address());

            let mut message = vec![0u8; rng.gen_range(1..256)];
            rng.fill_bytes(&mut message);
            let signature = sign(&message, &private).unwrap();
            assert!(verify(&message, &signature, &address));
        }
    }

    #[test]
    fn test_any_bit_flip_breaks_verification() {
        let (private, public) = generate_keypair();
        let address = derive_address(&public);
        let message = b"archive:QmPreservedContent".to_vec();
        let signature = sign(&message, &private).unwrap();

        for byte in 0..message.len() {
            for bit in 0..8 {
                let mut tampered = message.clone();
                tampered[byte] ^= 1 << bit;
                assert!(!verify(&tampered, &signature, &address), "message byte {byte} bit {bit}");
            }
        }
        for byte in 0..64 {
            for bit in 0..8 {
                let mut tampered = *signature.as_bytes();
                tampered[byte] ^= 1 << bit;
                assert!(
                    !verify(&message, &RecoverableSignature(tampered), &address),
                    "signature byte {byte} bit {bit}"
                );
            }
        }
    }

    #[test]
    fn test_signature_bound_to_claimed_address() {
        let (signer, _) = generate_keypair();
        let (_, other) = generate_keypair();
        let signature = sign(b"vote", &signer).unwrap();
        assert!(!verify(b"vote", &signature, &derive_address(&other)));
    }

    #[test]
    fn test_batch_verification_flags_forgeries() {
        let requests: Vec<VerificationRequest> = (0..16u8)
            .map(|i| {
                let (private, public) = generate_keypair();
                let digest = [i; 32];
                let signature = sign_prehash(&digest, &private).unwrap();
                let signer = if i % 5 == 0 {
                    address(99)
                } else {
                    derive_address(&public)
                };
                VerificationRequest {
                    digest,
                    signature,
                    signer,
                }
            })
            .collect();

        let verdicts = verify_batch(&requests);
        for (i, ok) in verdicts.iter().enumerate() {
            assert_eq!(*ok, i % 5 != 0, "request {i}");
        }
    }

    #[test]
    fn test_tampered_transaction_is_validation_error() {
        let mut tx = signed_transfer(10, 0, address(11), "5");
        assert!(verify_transaction(&tx).is_ok());

        tx.nonce = 1;
        let err = verify_transaction(&tx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        tx.signature = None;
        assert!(matches!(verify_transaction(&tx), Err(CryptoError::MissingSignature)));
    }

    // =========================================================================
    // SALTS & CHALLENGES
    // =========================================================================

    #[test]
    fn test_salts_never_repeat() {
        let a = generate_secure_salt("archive").unwrap();
        let b = generate_secure_salt("archive").unwrap();
        assert!(!constant_time_compare(a.as_bytes(), b.as_bytes()));
        assert_ne!(
            secure_hash_with_salt(b"content", &a),
            secure_hash_with_salt(b"content", &b)
        );
    }

    #[test]
    fn test_challenge_lifecycle() {
        let time = Arc::new(ManualTimeSource::new(GENESIS_TIME));
        let manager = ChallengeManager::new(time.clone(), 3_600);
        let content = b"preserved bytes";

        let answered = manager
            .generate_secure_challenge(address(1), [7; 32])
            .unwrap();
        let expiring = manager
            .generate_secure_challenge(address(1), [7; 32])
            .unwrap();
        assert_ne!(answered.id, expiring.id);
        assert_eq!(manager.outstanding(), 2);

        // Answered by the wrong node.
        let response = answered.respond(content);
        assert!(matches!(
            manager.verify_response(&answered.id, &address(2), &response, content),
            Err(CryptoError::ChallengeFailed)
        ));
        let retry = manager
            .generate_secure_challenge(address(1), [7; 32])
            .unwrap();
        manager
            .verify_response(&retry.id, &address(1), &retry.respond(content), content)
            .unwrap();
        assert!(matches!(
            manager.verify_response(&retry.id, &address(1), &retry.respond(content), content),
            Err(CryptoError::ChallengeNotFound)
        ));

        time.advance(3_601);
        assert_eq!(manager.purge_expired(), 1);
        assert_eq!(manager.outstanding(), 0);
        assert!(manager.get(&expiring.id).is_none());
    }
}
