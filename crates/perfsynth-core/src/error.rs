//! Top-level error taxonomy for a synthesis run.

use crate::generator::GenerationError;
use crate::sync::SyncError;
use crate::validate::{ConsistencyCheck, QualityMetrics};

/// Everything a synthesis run can fail with. A failed run never carries a
/// partial performance.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("instructions target character {actual}, expected {expected}")]
    MismatchedCharacter { expected: String, actual: String },

    #[error("invalid instructions: {0}")]
    InvalidInstructions(String),

    #[error(transparent)]
    GenerationFailed(#[from] GenerationError),

    #[error("synchronization failed: {0}")]
    Synchronization(#[from] SyncError),

    #[error("quality gate failed: aggregate {:.3} below {threshold} (short by {shortfall:.3})", scorecard.aggregate)]
    QualityGateFailed {
        scorecard: Box<QualityMetrics>,
        threshold: f64,
        shortfall: f64,
    },

    #[error("consistency gate failed: aggregate {:.3} below {threshold} (short by {shortfall:.3})", scorecard.aggregate)]
    ConsistencyGateFailed {
        scorecard: Box<ConsistencyCheck>,
        threshold: f64,
        shortfall: f64,
    },

    #[error("synthesis cancelled")]
    Cancelled,

    #[error("synthesis deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error: {0}")]
    Internal(String),
}

impl SynthesisError {
    /// Stable short name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MismatchedCharacter { .. } => "mismatched_character",
            Self::InvalidInstructions(_) => "invalid_instructions",
            Self::GenerationFailed(_) => "generation_failed",
            Self::Synchronization(_) => "synchronization",
            Self::QualityGateFailed { .. } => "quality_gate_failed",
            Self::ConsistencyGateFailed { .. } => "consistency_gate_failed",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Internal(_) => "internal",
        }
    }

    pub fn is_gate_failure(&self) -> bool {
        matches!(
            self,
            Self::QualityGateFailed { .. } | Self::ConsistencyGateFailed { .. }
        )
    }
}

/// Result type for synthesis operations.
pub type SynthesisResult<T> = std::result::Result<T, SynthesisError>;
