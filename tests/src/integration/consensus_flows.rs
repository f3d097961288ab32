//! # Consensus Flows
//!
//! Producer rotation over a live chain, the score threshold, and block
//! import that must leave no trace when a transaction inside fails.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use ac_06_consensus::domain::{merkle_root, select_producer, LastProducer};
    use ac_06_consensus::{ConsensusConfig, ConsensusError, ImportOutcome};
    use ac_07_network_bridge::InMemoryNetwork;
    use rand::RngCore;
    use shared_crypto::sign_block_header;
    use shared_types::{Address, Block, BlockHeader};

    fn create_observer(validators: &[(u8, &str)]) -> TestNode {
        TestNode::new(
            create_test_genesis(validators, &[10, 11]),
            &InMemoryNetwork::new(),
            None,
        )
    }

    fn seed_of(producer: Address, seeds: &[u8]) -> u8 {
        seeds
            .iter()
            .copied()
            .find(|seed| address(*seed) == producer)
            .unwrap()
    }

    /// Let the expected producer seal and import one empty block.
    async fn advance_chain(node: &TestNode, seeds: &[u8]) -> Address {
        node.advance(BLOCK_SPACING);
        let consensus = &node.services.consensus;
        let producer = consensus.expected_producer().unwrap();
        let score = consensus.validator_score(&producer).unwrap();
        assert!(score >= consensus.config().min_score_threshold, "score {score}");

        let produced = consensus
            .produce_block(&key(seed_of(producer, seeds)), Vec::new())
            .await
            .unwrap();
        let height = produced.block.number();
        assert!(matches!(
            consensus.import_block(produced.block).await.unwrap(),
            ImportOutcome::Extended { height: h } if h == height
        ));
        producer
    }

    // =========================================================================
    // ROTATION
    // =========================================================================

    #[tokio::test]
    async fn test_no_producer_exceeds_streak_cap() {
        let seeds = [1, 2, 3];
        let node = create_observer(&[(1, "100"), (2, "100"), (3, "100")]);
        let cap = node.services.consensus.config().max_consecutive_blocks;

        let mut last = None;
        let mut streak = 0;
        for _ in 0..15 {
            let producer = advance_chain(&node, &seeds).await;
            streak = if last == Some(producer) { streak + 1 } else { 1 };
            assert!(streak <= cap, "streak {streak} by {producer:?}");
            last = Some(producer);
        }
        assert_eq!(node.services.blocks.height(), 15);
    }

    #[tokio::test]
    async fn test_sole_candidate_may_keep_producing() {
        let node = create_observer(&[(1, "100"), (2, "10")]);
        let consensus = &node.services.consensus;
        let threshold = consensus.config().min_score_threshold;

        let strong = consensus.validator_score(&address(1)).unwrap();
        let weak = consensus.validator_score(&address(2)).unwrap();
        assert!(weak < threshold && threshold <= strong, "{weak} / {strong}");
        assert_eq!(
            consensus.eligible_validators().iter().map(|(a, _)| *a).collect::<Vec<_>>(),
            vec![address(1)]
        );

        for _ in 0..5 {
            assert_eq!(advance_chain(&node, &[1, 2]).await, address(1));
        }

        node.advance(BLOCK_SPACING);
        let err = consensus
            .produce_block(&key(2), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::BelowThreshold { .. }));
        assert_eq!(err.reason(), "authority");
    }

    #[test]
    fn test_capped_producer_always_rotated_out() {
        let config = ConsensusConfig::default();
        let candidates = [(address(1), 0.9), (address(2), 0.1)];
        let last = LastProducer {
            address: address(1),
            streak: config.max_consecutive_blocks,
        };
        let mut parent = [0u8; 32];
        for _ in 0..200 {
            rand::thread_rng().fill_bytes(&mut parent);
            assert_eq!(
                select_producer(&parent, &candidates, Some(last), &config),
                Some(address(2))
            );
        }
    }

    #[test]
    fn test_selection_is_deterministic_and_weighted() {
        let config = ConsensusConfig::default();
        let candidates = [(address(1), 0.9), (address(2), 0.1)];
        let mut parent = [0u8; 32];
        let mut first_wins = 0;
        for _ in 0..2_000 {
            rand::thread_rng().fill_bytes(&mut parent);
            let chosen = select_producer(&parent, &candidates, None, &config);
            assert_eq!(chosen, select_producer(&parent, &candidates, None, &config));
            if chosen == Some(address(1)) {
                first_wins += 1;
            }
        }
        assert!((1_600..=1_990).contains(&first_wins), "{first_wins}");
        assert_eq!(select_producer(&parent, &[], None, &config), None);
    }

    // =========================================================================
    // ATOMIC IMPORT
    // =========================================================================

    #[tokio::test]
    async fn test_failing_transaction_rolls_back_whole_block() {
        let node = create_observer(&[(1, "100")]);
        let consensus = &node.services.consensus;
        node.advance(BLOCK_SPACING);

        let genesis = node.services.blocks.get_by_number(0).unwrap();
        let root = node.services.ledger.state_root().unwrap();
        let transactions = vec![
            signed_transfer(10, 0, address(11), "5"),
            signed_transfer(10, 1, address(11), "600"),
        ];
        let mut header = BlockHeader {
            number: 1,
            parent_hash: genesis.hash(),
            merkle_root: merkle_root(&transactions),
            state_root: [0xAB; 32],
            timestamp: GENESIS_TIME + BLOCK_SPACING,
            validator: address(1),
            difficulty: consensus.score_breakdown(&address(1)).unwrap().bps(),
            signature: None,
        };
        sign_block_header(&mut header, &key(1)).unwrap();
        let block = Block {
            header,
            transactions,
        };
        let hash = block.hash();

        let err = consensus.import_block(block.clone()).await.unwrap_err();
        assert!(matches!(err, ConsensusError::Transaction { index: 1, .. }), "{err}");
        assert_eq!(node.services.ledger.state_root().unwrap(), root);
        assert_eq!(node.balance(10), dec("500"));
        assert_eq!(node.balance(11), dec("500"));
        assert_eq!(node.services.ledger.read(|view| view.nonce(&address(10))), 0);
        assert_eq!(node.services.blocks.height(), 0);

        assert!(matches!(
            consensus.import_block(block).await,
            Err(ConsensusError::KnownInvalid(h)) if h == hash
        ));
    }

    #[tokio::test]
    async fn test_wrong_state_root_rejected_without_effect() {
        let node = create_observer(&[(1, "100")]);
        let consensus = &node.services.consensus;
        node.advance(BLOCK_SPACING);
        let root = node.services.ledger.state_root().unwrap();

        let mut produced = consensus
            .produce_block(&key(1), vec![signed_transfer(10, 0, address(11), "5")])
            .await
            .unwrap();
        produced.block.header.state_root = [0xEE; 32];
        sign_block_header(&mut produced.block.header, &key(1)).unwrap();

        let err = consensus.import_block(produced.block).await.unwrap_err();
        assert!(matches!(err, ConsensusError::StateRootMismatch { .. }));
        assert_eq!(err.reason(), "state_root");
        assert_eq!(node.services.ledger.state_root().unwrap(), root);
        assert_eq!(node.balance(11), dec("500"));
    }
}
