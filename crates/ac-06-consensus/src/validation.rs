//! Stateless block checks. None of these touch the ledger, so they run
//! before the block lock is taken and transaction signatures verify in
//! parallel.

use crate::domain::{merkle_root, ConsensusConfig, ConsensusError, ConsensusResult};
use shared_crypto::{verify_batch, verify_block_header, CryptoError, VerificationRequest};
use shared_types::{Block, Timestamp, Transaction, ZERO_HASH};

/// Stateless validation logic for blocks.
pub struct BlockValidator;

impl BlockValidator {
    /// Header shape and size limits.
    pub fn validate_structure(block: &Block, config: &ConsensusConfig) -> ConsensusResult<()> {
        let header = &block.header;
        if header.number == 0 {
            return Err(if header.parent_hash == ZERO_HASH {
                ConsensusError::MissingGenesis
            } else {
                ConsensusError::GenesisWithParent
            });
        }
        if header.parent_hash == ZERO_HASH {
            return Err(ConsensusError::UnknownParent(ZERO_HASH));
        }
        if block.transactions.len() > config.max_txs_per_block {
            return Err(ConsensusError::TooManyTransactions {
                count: block.transactions.len(),
                limit: config.max_txs_per_block,
            });
        }
        Ok(())
    }

    pub fn validate_signature(block: &Block) -> ConsensusResult<()> {
        verify_block_header(&block.header).map_err(ConsensusError::InvalidSignature)
    }

    /// Declared merkle root must commit to the transactions.
    pub fn validate_merkle_root(block: &Block) -> ConsensusResult<()> {
        let computed = merkle_root(&block.transactions);
        if computed != block.header.merkle_root {
            return Err(ConsensusError::MerkleRootMismatch {
                declared: block.header.merkle_root,
                computed,
            });
        }
        Ok(())
    }

    /// Signature, fee and timestamp of every transaction.
    pub fn validate_transactions(block: &Block, config: &ConsensusConfig) -> ConsensusResult<()> {
        let mut requests = Vec::with_capacity(block.transactions.len());
        for (index, tx) in block.transactions.iter().enumerate() {
            Self::validate_transaction_terms(tx, index, block.header.timestamp, config)?;
            let signature = tx.signature.ok_or(ConsensusError::TransactionSignature {
                index,
                source: CryptoError::MissingSignature,
            })?;
            requests.push(VerificationRequest {
                digest: tx.signing_hash(),
                signature,
                signer: tx.sender,
            });
        }

        match verify_batch(&requests).iter().position(|ok| !ok) {
            Some(index) => Err(ConsensusError::TransactionSignature {
                index,
                source: CryptoError::SignerMismatch,
            }),
            None => Ok(()),
        }
    }

    /// Fee floor and timestamp drift of one transaction against
    /// `reference_time` (block time, or the clock for mempool admission).
    pub fn validate_transaction_terms(
        tx: &Transaction,
        index: usize,
        reference_time: Timestamp,
        config: &ConsensusConfig,
    ) -> ConsensusResult<()> {
        if tx.fee < config.min_fee {
            return Err(ConsensusError::FeeTooLow { index });
        }
        if tx.timestamp > reference_time.saturating_add(config.max_future_drift_secs) {
            return Err(ConsensusError::TransactionFromFuture {
                index,
                timestamp: tx.timestamp,
                block_time: reference_time,
            });
        }
        Ok(())
    }

    /// Everything that can be checked without state.
    pub fn validate_stateless(block: &Block, config: &ConsensusConfig) -> ConsensusResult<()> {
        Self::validate_structure(block, config)?;
        Self::validate_signature(block)?;
        Self::validate_merkle_root(block)?;
        Self::validate_transactions(block, config)
    }
}
