//! # Ledger Flows
//!
//! Supply ceiling, checkpoint fidelity and failed transfers, exercised
//! against a ledger that went through genesis and real blocks.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use ac_01_safe_math::{MathError, SafeMath, DEFAULT_MAX_SUPPLY};
    use ac_02_ledger_state::{ArchiveRecord, LedgerError};
    use ac_04_recovery::{Checkpoint, Snapshottable};
    use ac_07_network_bridge::InMemoryNetwork;
    use node_runtime::container::NodeConfig;
    use node_runtime::EngineError;
    use rand::Rng;
    use rust_decimal::Decimal;
    use shared_types::{Classify, ErrorKind};

    fn create_test_node() -> TestNode {
        TestNode::new(
            create_test_genesis(&[(1, "100")], &[10, 11]),
            &InMemoryNetwork::new(),
            Some(1),
        )
    }

    // =========================================================================
    // SUPPLY CEILING
    // =========================================================================

    #[test]
    fn test_safe_add_never_wraps_past_ceiling() {
        let math = SafeMath::new(DEFAULT_MAX_SUPPLY);
        let ceiling_units: i64 = 1_000_000_000 * 100_000_000;
        let mut rng = rand::thread_rng();

        for _ in 0..1_000 {
            let b = rng.gen_range(1..=ceiling_units);
            let a = rng.gen_range(ceiling_units - b + 1..=ceiling_units);
            let result = math.safe_add(Decimal::new(b, 8), Decimal::new(a, 8));
            assert!(
                matches!(result, Err(MathError::Overflow { .. })),
                "{b} + {a} gave {result:?}"
            );
        }
        assert!(matches!(
            math.safe_add(Decimal::MAX, Decimal::ONE),
            Err(MathError::Overflow { .. })
        ));
        assert_eq!(
            math.safe_add(DEFAULT_MAX_SUPPLY - Decimal::ONE, Decimal::ONE),
            Ok(DEFAULT_MAX_SUPPLY)
        );
    }

    #[test]
    fn test_ledger_credit_respects_configured_supply() {
        let mut config = NodeConfig {
            genesis: create_test_genesis(&[(1, "100")], &[10]),
            ..NodeConfig::default()
        };
        config.genesis.max_supply = dec("2000");
        let node = TestNode::with_config(config, &InMemoryNetwork::new(), None);
        let root = node.services.ledger.state_root().unwrap();

        let err = node
            .services
            .ledger
            .write(|txn| txn.credit(address(10), dec("1501")))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Math(MathError::Overflow { .. })));
        assert_eq!(err.kind(), ErrorKind::Overflow);
        assert_eq!(node.services.ledger.state_root().unwrap(), root);
        assert_eq!(node.balance(10), dec("500"));
    }

    // =========================================================================
    // CHECKPOINTS
    // =========================================================================

    #[tokio::test]
    async fn test_checkpoint_round_trip_is_bit_exact() {
        let node = create_test_node();
        node.advance(BLOCK_SPACING);
        node.engine
            .submit_transaction(signed_transfer(10, 0, address(11), "25"))
            .await
            .unwrap();
        node.engine.produce_block().await.unwrap();

        let ledger = node.services.ledger.as_ref();
        let before = ledger.snapshot().unwrap();
        let root = ledger.state_root().unwrap();
        let checkpoint = Checkpoint::capture("test.mutation", ledger, GENESIS_TIME).unwrap();

        ledger
            .write(|txn| {
                txn.transfer(address(11), address(10), dec("10"))?;
                txn.stake(address(10), dec("50"), GENESIS_TIME)?;
                txn.use_nonce(address(11), 0)?;
                txn.insert_archive(ArchiveRecord {
                    content_hash: [0xC0; 32],
                    metadata_hash: [0xC1; 32],
                    archiver: address(10),
                    tx_hash: [0xC2; 32],
                    block_number: 1,
                    submitted_at: GENESIS_TIME,
                    verification_votes: 0,
                    verified: false,
                    quality_bps: 0,
                    verification_contract: None,
                })
            })
            .unwrap();
        assert_ne!(ledger.state_root().unwrap(), root);

        checkpoint.restore_into(ledger).unwrap();
        assert_eq!(ledger.snapshot().unwrap(), before);
        assert_eq!(ledger.state_root().unwrap(), root);
        assert!(ledger.read(|view| view.archive(&[0xC0; 32]).is_none()));
    }

    // =========================================================================
    // TRANSFERS
    // =========================================================================

    #[test]
    fn test_overdraft_transfer_leaves_balances() {
        let node = create_test_node();
        let err = node
            .services
            .ledger
            .write(|txn| txn.transfer(address(10), address(11), dec("500.000001")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(node.balance(10), dec("500"));
        assert_eq!(node.balance(11), dec("500"));
    }

    #[tokio::test]
    async fn test_overdraft_transaction_skipped_by_producer() {
        let node = create_test_node();
        node.advance(BLOCK_SPACING);
        let overdraft = signed_transfer(10, 0, address(11), "600");
        node.engine.submit_transaction(overdraft.clone()).await.unwrap();

        let block = node.engine.produce_block().await.unwrap();
        assert!(block.transactions.is_empty());
        assert!(!node.services.mempool.contains(&overdraft.hash()));
        assert_eq!(node.balance(10), dec("500"));
        assert_eq!(node.balance(11), dec("500"));
    }

    #[tokio::test]
    async fn test_fee_beyond_balance_refused_at_admission() {
        let node = create_test_node();
        let broke = signed_transfer(12, 0, address(11), "1");

        let err = node.engine.submit_transaction(broke).await.unwrap_err();
        assert!(matches!(err, EngineError::Consensus(_)));
        assert_eq!(err.to_api_error().kind, ErrorKind::InsufficientBalance);
        assert!(node.services.mempool.is_empty());
    }
}
