//! # Node Flows
//!
//! Two validator nodes sharing one in-memory hub, each draining its queue
//! through an inbound worker: gossip, block following and validator votes
//! carried as transactions.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use ac_07_network_bridge::InMemoryNetwork;
    use node_runtime::engine::SyncStatus;
    use node_runtime::handlers::spawn_inbound_worker;
    use shared_types::{ContractId, Hash, Transaction, TransactionPayload, VoteChoice};
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::task::JoinHandle;

    const CONTENT: Hash = [5; 32];

    struct Cluster {
        a: TestNode,
        b: TestNode,
        stop: watch::Sender<bool>,
        workers: Vec<JoinHandle<usize>>,
    }

    impl Cluster {
        fn start() -> Self {
            let hub = InMemoryNetwork::new();
            let genesis = create_test_genesis(&[(1, "100"), (2, "100")], &[10, 11]);
            let a = TestNode::new(genesis.clone(), &hub, Some(1));
            let b = TestNode::new(genesis, &hub, Some(2));

            let (stop, shutdown) = watch::channel(false);
            let workers = [&a, &b]
                .into_iter()
                .map(|node| {
                    let queue = node.engine.network().on_receive().unwrap();
                    spawn_inbound_worker(node.engine.clone(), queue, shutdown.clone())
                })
                .collect();
            Self {
                a,
                b,
                stop,
                workers,
            }
        }

        fn advance(&self, secs: u64) {
            self.a.advance(secs);
            self.b.advance(secs);
        }

        async fn stop(self) {
            self.stop.send(true).unwrap();
            for worker in self.workers {
                worker.await.unwrap();
            }
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    fn archive_tx(nonce: u64) -> Transaction {
        signed(
            11,
            nonce,
            TransactionPayload::Archive {
                content_hash: CONTENT,
                metadata_hash: [6; 32],
                bounty_id: None,
            },
        )
    }

    fn verification_contract(node: &TestNode) -> ContractId {
        node.services
            .ledger
            .read(|view| view.archive(&CONTENT).and_then(|r| r.verification_contract))
            .unwrap()
    }

    // =========================================================================
    // GOSSIP
    // =========================================================================

    #[tokio::test]
    async fn test_transaction_gossiped_to_peer_pool() {
        let cluster = Cluster::start();
        let tx = archive_tx(0);
        let receipt = cluster.a.engine.submit_transaction(tx.clone()).await.unwrap();
        assert_eq!(receipt.tx_hash, tx.hash());

        wait_until(|| cluster.b.services.mempool.contains(&tx.hash())).await;
        assert_eq!(cluster.a.engine.get_blockchain_info().peer_count, 1);
        assert_eq!(cluster.b.engine.get_blockchain_info().peer_count, 1);
        cluster.stop().await;
    }

    #[tokio::test]
    async fn test_follower_imports_block_and_clears_pool() {
        let cluster = Cluster::start();
        let tx = archive_tx(0);
        cluster.a.engine.submit_transaction(tx.clone()).await.unwrap();
        wait_until(|| cluster.b.services.mempool.contains(&tx.hash())).await;

        cluster.advance(BLOCK_SPACING);
        let block = cluster.a.engine.produce_block().await.unwrap();
        assert_eq!(block.transactions.len(), 1);

        wait_until(|| cluster.b.services.blocks.height() == 1).await;
        let info = cluster.b.engine.get_blockchain_info();
        assert_eq!(info.tip_hash, block.hash());
        assert_eq!(info.sync_status, SyncStatus::Synced);
        assert!(!cluster.b.services.mempool.contains(&tx.hash()));
        assert_eq!(
            cluster.b.services.ledger.state_root().unwrap(),
            cluster.a.services.ledger.state_root().unwrap()
        );

        let found = cluster.b.engine.verify_archive(&CONTENT).unwrap();
        assert_eq!(found.tx_hash, tx.hash());
        assert_eq!(found.block_number, 1);
        assert_eq!(found.confirmations, 1);
        assert!(!found.verified);

        cluster.advance(BLOCK_SPACING);
        cluster.a.engine.produce_block().await.unwrap();
        wait_until(|| cluster.b.services.blocks.height() == 2).await;
        assert_eq!(cluster.b.engine.verify_archive(&CONTENT).unwrap().confirmations, 2);
        assert!(cluster.b.engine.verify_archive(&[0xFF; 32]).is_err());
        cluster.stop().await;
    }

    // =========================================================================
    // VALIDATOR VOTES
    // =========================================================================

    fn tally(node: &TestNode, id: ContractId) -> u32 {
        node.services
            .ledger
            .read(|view| view.contract(id).and_then(|c| c.tally()).map_or(0, |t| t.total()))
    }

    fn assert_same_state(cluster: &Cluster) {
        assert_eq!(
            cluster.a.services.ledger.state_root().unwrap(),
            cluster.b.services.ledger.state_root().unwrap()
        );
    }

    /// Archive `CONTENT` in block 1 from node a, followed by node b.
    async fn archive_in_first_block(cluster: &Cluster) -> ContractId {
        cluster.a.engine.submit_transaction(archive_tx(0)).await.unwrap();
        cluster.advance(BLOCK_SPACING);
        cluster.a.engine.produce_block().await.unwrap();
        wait_until(|| cluster.b.services.blocks.height() == 1).await;

        let id = verification_contract(&cluster.b);
        assert_eq!(verification_contract(&cluster.a), id);
        id
    }

    #[tokio::test]
    async fn test_vote_gossiped_and_included_by_peer() {
        let cluster = Cluster::start();
        let id = archive_in_first_block(&cluster).await;

        let root = cluster.b.services.ledger.state_root().unwrap();
        let finalized = cluster.b.engine.vote(id, VoteChoice::Approve).await.unwrap();
        assert!(!finalized);
        assert_eq!(cluster.b.services.ledger.state_root().unwrap(), root);
        assert_eq!(tally(&cluster.b, id), 0);
        wait_until(|| cluster.a.services.mempool.len() == 1).await;

        cluster.advance(BLOCK_SPACING);
        let block = cluster.a.engine.produce_block().await.unwrap();
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].sender, address(2));
        wait_until(|| cluster.b.services.blocks.height() == 2).await;

        assert_eq!(tally(&cluster.a, id), 1);
        assert_eq!(tally(&cluster.b, id), 1);
        assert!(cluster.b.services.mempool.is_empty());
        assert_same_state(&cluster);
        cluster.stop().await;
    }

    #[tokio::test]
    async fn test_block_without_pending_vote_still_imports() {
        let cluster = Cluster::start();
        let id = archive_in_first_block(&cluster).await;

        cluster.b.engine.vote(id, VoteChoice::Approve).await.unwrap();
        wait_until(|| cluster.a.services.mempool.len() == 1).await;
        // Producer a seals its block before it has seen b's vote.
        let pending = cluster.a.services.mempool.candidates(1);
        cluster.a.services.mempool.remove(&pending[0].hash());

        cluster.advance(BLOCK_SPACING);
        let block = cluster.a.engine.produce_block().await.unwrap();
        assert!(block.transactions.is_empty());
        wait_until(|| cluster.b.services.blocks.height() == 2).await;
        assert_eq!(cluster.b.engine.get_blockchain_info().tip_hash, block.hash());
        assert_eq!(tally(&cluster.b, id), 0);
        assert_eq!(cluster.b.services.mempool.len(), 1);
        assert_same_state(&cluster);

        cluster.advance(BLOCK_SPACING);
        let block = cluster.b.engine.produce_block().await.unwrap();
        assert_eq!(block.transactions.len(), 1);
        wait_until(|| cluster.a.services.blocks.height() == 3).await;
        assert_eq!(tally(&cluster.a, id), 1);
        assert_eq!(tally(&cluster.b, id), 1);
        assert_same_state(&cluster);
        cluster.stop().await;
    }

    #[tokio::test]
    async fn test_observer_cannot_vote() {
        let hub = InMemoryNetwork::new();
        let observer = TestNode::new(create_test_genesis(&[(1, "100")], &[10]), &hub, None);
        let err = observer.engine.vote(1, VoteChoice::Approve).await.unwrap_err();
        assert!(matches!(err, node_runtime::EngineError::NotValidator));
    }
}
