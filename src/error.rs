//! Error types.
//!
//! Three families, matching where a failure can originate:
//! - [`DataError`]: malformed run or trend data at load time (aborts one arm's trend).
//! - [`TransportError`]: the external collaborator failed a live attempt.
//! - [`PreconditionError`]: caller misuse of the engine (fatal, never retried).
//!
//! Cycle detection, alignment, and admissibility relaxation never produce errors;
//! they degrade to deterministic fallbacks instead.

use thiserror::Error;

use crate::ArmId;

/// Malformed or mismatched run/trend data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("run for arm {arm} has no outcomes")]
    EmptyRun { arm: ArmId },
    #[error("no runs supplied for arm {arm}")]
    NoRuns { arm: ArmId },
    #[error("run belongs to arm {found}, expected arm {expected}")]
    ArmMismatch { expected: ArmId, found: ArmId },
    #[error("trend has no positions")]
    EmptyTrend,
    #[error("trend probability {value} at position {position} is outside [0, 1]")]
    ProbabilityOutOfRange { position: usize, value: f64 },
    #[error("trend mean has {mean} positions but std has {std}")]
    LengthMismatch { mean: usize, std: usize },
    #[error("cycle length must be > 0")]
    ZeroCycle,
    #[cfg(feature = "serde")]
    #[error("malformed run record: {0}")]
    Malformed(String),
}

/// A failed live attempt, as reported by the transport collaborator.
///
/// The core never retries; the session stops and keeps everything accumulated so far.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport failed: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Caller misuse of the decision engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreconditionError {
    #[error("engine needs at least one arm")]
    NoArms,
    #[error("global budget must be > 0")]
    ZeroBudget,
    #[error("global budget is exhausted")]
    BudgetExhausted,
    #[error("{trends} trends supplied but {policies} arm policies")]
    PolicyCountMismatch { trends: usize, policies: usize },
    #[error("prior strength must be finite and >= 0, got {0}")]
    InvalidPriorStrength(f64),
    #[error("batch sizes must be > 0 and ordered small <= medium <= large")]
    InvalidBatchSizes,
    #[error("previous decision has not been observed yet")]
    ObservationPending,
    #[error("no decision is waiting for an observation")]
    NoPendingDecision,
    #[error("observation (arm {arm}, batch {batch_size}) does not match pending decision (arm {expected_arm}, batch {expected_batch})")]
    ObservationMismatch {
        arm: ArmId,
        batch_size: u64,
        expected_arm: ArmId,
        expected_batch: u64,
    },
    #[error("unknown arm {0}")]
    UnknownArm(ArmId),
    #[error("policy for arm {0} needs a finite priority >= 0, a finite floor and finite thresholds with medium <= high")]
    InvalidArmPolicy(ArmId),
}

/// Umbrella error for callers that drive the whole pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
}
