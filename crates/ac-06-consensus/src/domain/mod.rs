//! Consensus domain: pure scoring, selection and evidence logic.

pub mod config;
pub mod error;
pub mod fork_choice;
pub mod merkle;
pub mod score;
pub mod selection;
pub mod slashing;

pub use config::{ConsensusConfig, QualityWeights, ScoreWeights};
pub use error::{ConsensusError, ConsensusResult};
pub use fork_choice::{prefers, ChainTip};
pub use merkle::{merkle_root, merkle_root_of};
pub use score::{ScoreBreakdown, ValidatorState};
pub use selection::{select_producer, LastProducer};
pub use slashing::{EquivocationDetector, EquivocationEvidence};
