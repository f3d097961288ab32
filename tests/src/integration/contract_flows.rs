//! # Contract Flows
//!
//! Bounties funded and answered through real blocks, then resolved by
//! validators voting concurrently through the contract runtime.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use ac_02_ledger_state::{ContractInstance, ContractStatus};
    use ac_05_contracts::ContractError;
    use ac_07_network_bridge::InMemoryNetwork;
    use shared_bus::{ChainEvent, EventFilter};
    use shared_types::{
        Classify, ContractId, ErrorKind, Hash, TokenAction, TransactionPayload, VoteChoice,
    };

    const TARGET: Hash = [7; 32];
    const CREATOR: u8 = 10;
    const ARCHIVER: u8 = 11;

    fn create_test_node() -> TestNode {
        TestNode::new(
            create_test_genesis(
                &[(1, "100"), (2, "100"), (3, "100"), (4, "100")],
                &[CREATOR, ARCHIVER],
            ),
            &InMemoryNetwork::new(),
            Some(1),
        )
    }

    /// Fund a bounty on `TARGET` in one block and answer it in the next.
    async fn create_answered_bounty(node: &TestNode, reward: &str, required_votes: u32) -> ContractId {
        node.advance(BLOCK_SPACING);
        let fund = signed(
            CREATOR,
            0,
            TransactionPayload::Token {
                recipient: [0; 20],
                amount: dec(reward),
                action: TokenAction::FundBounty {
                    target_content_hash: TARGET,
                    deadline: GENESIS_TIME + 3_600,
                    required_votes,
                },
            },
        );
        node.engine.submit_transaction(fund).await.unwrap();
        let block = node.engine.produce_block().await.unwrap();
        assert_eq!(block.transactions.len(), 1);

        let id = node.services.ledger.read(|view| {
            view.contracts()
                .find_map(|c| match c {
                    ContractInstance::Bounty(b) if b.target_content_hash == TARGET => Some(b.id),
                    _ => None,
                })
                .unwrap()
        });

        node.advance(BLOCK_SPACING);
        let answer = signed(
            ARCHIVER,
            0,
            TransactionPayload::Archive {
                content_hash: TARGET,
                metadata_hash: [8; 32],
                bounty_id: Some(id),
            },
        );
        node.engine.submit_transaction(answer).await.unwrap();
        let block = node.engine.produce_block().await.unwrap();
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(status(node, id), ContractStatus::InProgress);
        id
    }

    fn status(node: &TestNode, id: ContractId) -> ContractStatus {
        node.services
            .ledger
            .read(|view| view.contract(id).and_then(|c| c.status()).unwrap())
    }

    // =========================================================================
    // BOUNTY LIFECYCLE
    // =========================================================================

    #[tokio::test]
    async fn test_funding_escrows_reward() {
        let node = create_test_node();
        let id = create_answered_bounty(&node, "40", 2).await;

        // Fee of 1 plus the escrowed reward.
        assert_eq!(node.balance(CREATOR), dec("459"));
        node.services.ledger.read(|view| {
            let record = view.archive(&TARGET).unwrap();
            assert_eq!(record.archiver, address(ARCHIVER));
            assert_eq!(record.verification_contract, Some(id));
            assert!(!record.verified);
        });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_finalize_once() {
        let node = create_test_node();
        let id = create_answered_bounty(&node, "40", 2).await;
        let archiver_before = node.balance(ARCHIVER);
        let mut sub = node.services.bus.subscribe(EventFilter::contract(id));

        let handles: Vec<_> = [2u8, 3, 4]
            .into_iter()
            .map(|seed| {
                let contracts = node.services.contracts.clone();
                tokio::spawn(async move { contracts.vote(id, address(seed), VoteChoice::Approve).await })
            })
            .collect();

        let mut finalized = 0;
        let mut counted = 0;
        let mut late = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(true) => finalized += 1,
                Ok(false) => counted += 1,
                Err(ContractError::InvalidStatus { .. }) => late += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((finalized, counted, late), (1, 1, 1));

        let events = sub.drain();
        let results = events
            .iter()
            .filter(|e| matches!(e, ChainEvent::VerificationResultCalculated { .. }))
            .count();
        assert_eq!(results, 1);
        assert!(events.iter().any(|e| matches!(
            e,
            ChainEvent::BountyPaid { contract_id, .. } if *contract_id == id
        )));

        assert_eq!(status(&node, id), ContractStatus::Completed);
        assert_eq!(node.balance(ARCHIVER), archiver_before + dec("40"));
        node.services.ledger.read(|view| {
            let record = view.archive(&TARGET).unwrap();
            assert!(record.verified);
            assert_eq!(record.quality_bps, 10_000);
            assert_eq!(view.contract(id).unwrap().tally().unwrap().total(), 2);
        });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verifications_reach_terminal_status() {
        let node = create_test_node();
        let id = create_answered_bounty(&node, "40", 2).await;

        let first = {
            let contracts = node.services.contracts.clone();
            tokio::spawn(async move { contracts.verify_submission(id, address(2), true).await })
        };
        let second = {
            let contracts = node.services.contracts.clone();
            tokio::spawn(async move { contracts.verify_submission(id, address(3), true).await })
        };
        let outcomes = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];

        assert_eq!(outcomes.iter().filter(|finalized| **finalized).count(), 1);
        assert!(matches!(
            status(&node, id),
            ContractStatus::Completed | ContractStatus::Rejected
        ));
    }

    #[tokio::test]
    async fn test_split_vote_refunds_creator() {
        let node = create_test_node();
        let id = create_answered_bounty(&node, "40", 3).await;
        let creator_before = node.balance(CREATOR);

        let contracts = &node.services.contracts;
        assert!(!contracts.verify_submission(id, address(2), true).await.unwrap());
        assert!(!contracts.verify_submission(id, address(3), false).await.unwrap());
        assert!(contracts.verify_submission(id, address(4), false).await.unwrap());

        assert_eq!(status(&node, id), ContractStatus::Rejected);
        assert_eq!(node.balance(CREATOR), creator_before + dec("40"));
        node.services.ledger.read(|view| {
            let record = view.archive(&TARGET).unwrap();
            assert!(!record.verified);
            assert_eq!(record.quality_bps, 3_333);
            assert!(view.reputation(&address(3)) > view.reputation(&address(2)));
        });
    }

    // =========================================================================
    // VOTER RULES
    // =========================================================================

    #[tokio::test]
    async fn test_duplicate_vote_refused() {
        let node = create_test_node();
        let id = create_answered_bounty(&node, "40", 3).await;
        let contracts = &node.services.contracts;

        contracts.vote(id, address(2), VoteChoice::Approve).await.unwrap();
        let err = contracts
            .vote(id, address(2), VoteChoice::Reject)
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::DuplicateVote { .. }));
        assert_eq!(err.kind(), ErrorKind::ContractExecution);

        let tally_total = node
            .services
            .ledger
            .read(|view| view.contract(id).unwrap().tally().unwrap().total());
        assert_eq!(tally_total, 1);
    }

    #[tokio::test]
    async fn test_unstaked_and_self_votes_refused() {
        let node = create_test_node();
        let id = create_answered_bounty(&node, "40", 2).await;
        let contracts = &node.services.contracts;

        // The archiver gained a validator record by archiving, but no stake.
        assert!(matches!(
            contracts.vote(id, address(CREATOR), VoteChoice::Approve).await,
            Err(ContractError::NotEligibleVoter { .. })
        ));
        assert!(matches!(
            contracts.vote(id, address(ARCHIVER), VoteChoice::Approve).await,
            Err(ContractError::NotEligibleVoter { .. })
        ));
        assert_eq!(status(&node, id), ContractStatus::InProgress);
    }

    #[tokio::test]
    async fn test_expired_bounty_refunds_creator() {
        let node = create_test_node();
        let id = create_answered_bounty(&node, "40", 2).await;
        let creator_before = node.balance(CREATOR);

        node.advance(3_600);
        assert!(matches!(
            node.services.contracts.vote(id, address(2), VoteChoice::Approve).await,
            Err(ContractError::DeadlinePassed { .. })
        ));
        assert_eq!(status(&node, id), ContractStatus::InProgress);

        let block = node.engine.produce_block().await.unwrap();
        assert!(block.transactions.is_empty());
        assert_eq!(status(&node, id), ContractStatus::Expired);
        assert_eq!(node.balance(CREATOR), creator_before + dec("40"));
    }
}
