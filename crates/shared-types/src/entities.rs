//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Identity**: `Hash`, `Address`, `RecoverableSignature`
//! - **Value**: `Amount` (arbitrary-precision decimal)
//! - **Chain**: `Transaction`, `TransactionPayload`, `BlockHeader`, `Block`
//!
//! Hashes are Keccak-256 over a fixed field encoding. Amounts are normalized
//! before encoding so `1.0` and `1.00` hash identically.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha3::{Digest, Keccak256};
use std::fmt;

// =============================================================================
// IDENTITY
// =============================================================================

/// A 32-byte Keccak-256 digest.
pub type Hash = [u8; 32];

/// A 20-byte address derived from a secp256k1 public key.
pub type Address = [u8; 20];

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Token amount. All arithmetic on it goes through `SafeMath`.
pub type Amount = Decimal;

/// Opaque handle of a contract instance stored in the ledger arena.
pub type ContractId = u64;

/// Parent hash of the genesis block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Lowercase hex with `0x` prefix, for logs and API payloads.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// 65-byte recoverable ECDSA signature: `r || s || recovery_id`.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableSignature(#[serde_as(as = "Bytes")] pub [u8; 65]);

impl RecoverableSignature {
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sig({}..)", hex::encode(&self.0[..8]))
    }
}

fn encode_amount(hasher: &mut Keccak256, amount: &Amount) {
    hasher.update(amount.normalize().serialize());
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// A validator's verdict on a submission or proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteChoice {
    Approve,
    Reject,
}

impl VoteChoice {
    pub fn from_valid(is_valid: bool) -> Self {
        if is_valid {
            Self::Approve
        } else {
            Self::Reject
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, Self::Approve)
    }
}

/// What a `Token` transaction does with its amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenAction {
    /// Move `amount` from sender to recipient.
    Transfer,
    /// Lock `amount` of the sender's balance as validator stake.
    Stake,
    /// Release `amount` of stake back to balance.
    Unstake,
    /// Escrow `amount` as the reward of a new bounty.
    FundBounty {
        target_content_hash: Hash,
        deadline: Timestamp,
        required_votes: u32,
    },
    /// Open a preservation pool seeded with `amount`.
    CreatePool {
        content_hash: Hash,
        epoch_reward: Amount,
    },
    /// Add `amount` to an existing pool.
    ContributePool { pool_id: ContractId },
    /// Register the sender as a preserver of the pool's content.
    JoinPool { pool_id: ContractId },
    /// A validator vouches that `preserver` answered its storage challenge
    /// for the pool's current epoch.
    AttestPreservation {
        pool_id: ContractId,
        preserver: Address,
    },
    /// Pay out the pool's current epoch.
    CloseEpoch { pool_id: ContractId },
    /// Two headers one validator signed at the same height.
    ReportEquivocation {
        first: Box<BlockHeader>,
        second: Box<BlockHeader>,
    },
}

impl TokenAction {
    /// Whether the transaction's `amount` is spent. Other actions carry zero.
    pub fn moves_value(&self) -> bool {
        matches!(
            self,
            Self::Transfer
                | Self::Stake
                | Self::Unstake
                | Self::FundBounty { .. }
                | Self::CreatePool { .. }
                | Self::ContributePool { .. }
        )
    }
}

/// Discriminated transaction body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionPayload {
    Archive {
        content_hash: Hash,
        metadata_hash: Hash,
        /// Bounty this archive answers, if any.
        bounty_id: Option<ContractId>,
    },
    Token {
        recipient: Address,
        amount: Amount,
        action: TokenAction,
    },
    Governance {
        proposal_id: ContractId,
        choice: VoteChoice,
    },
}

/// Short label used in logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Archive,
    Token,
    Governance,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Archive => "archive",
            Self::Token => "token",
            Self::Governance => "governance",
        };
        f.write_str(s)
    }
}

/// A signed ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub nonce: u64,
    pub timestamp: Timestamp,
    pub fee: Amount,
    pub payload: TransactionPayload,
    pub signature: Option<RecoverableSignature>,
}

impl Transaction {
    /// Build an unsigned transaction.
    pub fn new(
        sender: Address,
        nonce: u64,
        timestamp: Timestamp,
        fee: Amount,
        payload: TransactionPayload,
    ) -> Self {
        Self {
            sender,
            nonce,
            timestamp,
            fee,
            payload,
            signature: None,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        match self.payload {
            TransactionPayload::Archive { .. } => TransactionKind::Archive,
            TransactionPayload::Token { .. } => TransactionKind::Token,
            TransactionPayload::Governance { .. } => TransactionKind::Governance,
        }
    }

    /// Digest the sender signs. Covers every field except the signature.
    pub fn signing_hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(b"archivechain.tx.v1");
        hasher.update(self.sender);
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        encode_amount(&mut hasher, &self.fee);
        match &self.payload {
            TransactionPayload::Archive {
                content_hash,
                metadata_hash,
                bounty_id,
            } => {
                hasher.update([0u8]);
                hasher.update(content_hash);
                hasher.update(metadata_hash);
                match bounty_id {
                    Some(id) => {
                        hasher.update([1u8]);
                        hasher.update(id.to_le_bytes());
                    }
                    None => hasher.update([0u8]),
                }
            }
            TransactionPayload::Token {
                recipient,
                amount,
                action,
            } => {
                hasher.update([1u8]);
                hasher.update(recipient);
                encode_amount(&mut hasher, amount);
                encode_token_action(&mut hasher, action);
            }
            TransactionPayload::Governance { proposal_id, choice } => {
                hasher.update([2u8]);
                hasher.update(proposal_id.to_le_bytes());
                hasher.update([u8::from(choice.is_valid())]);
            }
        }
        hasher.finalize().into()
    }

    /// Transaction id: signing hash bound to the signature bytes.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self.signing_hash());
        if let Some(sig) = &self.signature {
            hasher.update(sig.as_bytes());
        }
        hasher.finalize().into()
    }
}

fn encode_token_action(hasher: &mut Keccak256, action: &TokenAction) {
    match action {
        TokenAction::Transfer => hasher.update([0u8]),
        TokenAction::Stake => hasher.update([1u8]),
        TokenAction::Unstake => hasher.update([2u8]),
        TokenAction::FundBounty {
            target_content_hash,
            deadline,
            required_votes,
        } => {
            hasher.update([3u8]);
            hasher.update(target_content_hash);
            hasher.update(deadline.to_le_bytes());
            hasher.update(required_votes.to_le_bytes());
        }
        TokenAction::CreatePool {
            content_hash,
            epoch_reward,
        } => {
            hasher.update([4u8]);
            hasher.update(content_hash);
            encode_amount(hasher, epoch_reward);
        }
        TokenAction::ContributePool { pool_id } => {
            hasher.update([5u8]);
            hasher.update(pool_id.to_le_bytes());
        }
        TokenAction::JoinPool { pool_id } => {
            hasher.update([6u8]);
            hasher.update(pool_id.to_le_bytes());
        }
        TokenAction::AttestPreservation { pool_id, preserver } => {
            hasher.update([7u8]);
            hasher.update(pool_id.to_le_bytes());
            hasher.update(preserver);
        }
        TokenAction::CloseEpoch { pool_id } => {
            hasher.update([8u8]);
            hasher.update(pool_id.to_le_bytes());
        }
        TokenAction::ReportEquivocation { first, second } => {
            hasher.update([9u8]);
            for header in [first, second] {
                hasher.update(header.signing_hash());
                if let Some(sig) = &header.signature {
                    hasher.update(sig.as_bytes());
                }
            }
        }
    }
}

// =============================================================================
// BLOCKS
// =============================================================================

/// Block header. `difficulty` is the producer's PoA score in basis points at
/// the parent state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub parent_hash: Hash,
    pub merkle_root: Hash,
    pub state_root: Hash,
    pub timestamp: Timestamp,
    pub validator: Address,
    pub difficulty: u64,
    pub signature: Option<RecoverableSignature>,
}

impl BlockHeader {
    /// Digest the producing validator signs.
    pub fn signing_hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(b"archivechain.block.v1");
        hasher.update(self.number.to_le_bytes());
        hasher.update(self.parent_hash);
        hasher.update(self.merkle_root);
        hasher.update(self.state_root);
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.validator);
        hasher.update(self.difficulty.to_le_bytes());
        hasher.finalize().into()
    }

    pub fn is_genesis(&self) -> bool {
        self.number == 0 && self.parent_hash == ZERO_HASH
    }
}

/// A header plus its ordered transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Block hash. The merkle root commits to the transactions, so this is a
    /// pure function of header and body.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self.header.signing_hash());
        if let Some(sig) = &self.header.signature {
            hasher.update(sig.as_bytes());
        }
        hasher.finalize().into()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }
}
