//! Decision records for the engine's select/observe protocol.
//!
//! A [`Decision`] is what `DecisionEngine::step` hands to the caller: the arm, the
//! batch size, and typed [`DecisionNote`]s explaining anything other than a plain
//! "highest sample wins". An [`Observation`] is what flows back.

use crate::ArmId;

/// Why a diversity override fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ForceReason {
    /// `forced_explore_period` decisions elapsed since the last override.
    Periodic,
    /// The tentative arm's streak reached its `max_consecutive`.
    StreakLimit,
}

/// Audit notes attached to a decision.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecisionNote {
    /// No arm met its admissibility floor; every arm was eligible for this step.
    AdmissibilityRelaxed,
    /// The diversity override picked the best eligible arm other than the streaking one.
    ForcedSwitch {
        reason: ForceReason,
        /// Arm that was on a streak (none before the first decision).
        from: Option<ArmId>,
        /// Tentative choice before the override.
        tentative: ArmId,
    },
    /// The override fired but no other arm was eligible, so the tentative choice stands.
    ForcedSwitchNoAlternative { reason: ForceReason, arm: ArmId },
    /// The batch policy asked for more than the remaining budget.
    BatchClamped { requested: u64, granted: u64 },
}

/// Per-arm scores computed for one decision.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CandidateDebug {
    pub arm: ArmId,
    /// Trend position the arm is at.
    pub position: usize,
    pub posterior_mean: f64,
    /// Posterior sample multiplied by the arm's priority.
    pub score: f64,
    /// Passed the admissibility floor (before any relaxation).
    pub admissible: bool,
}

/// One engine decision.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Decision {
    pub arm: ArmId,
    pub batch_size: u64,
    /// Trend position of the chosen arm.
    pub position: usize,
    pub posterior_mean: f64,
    /// Decision index (0-based) within the session.
    pub step: u64,
    pub candidates: Vec<CandidateDebug>,
    pub notes: Vec<DecisionNote>,
}

impl Decision {
    /// Whether a diversity override changed the arm.
    pub fn was_forced(&self) -> bool {
        self.notes.iter().any(|n| {
            matches!(n, DecisionNote::ForcedSwitch { tentative, .. } if *tentative != self.arm)
        })
    }

    pub fn relaxed(&self) -> bool {
        self.notes.contains(&DecisionNote::AdmissibilityRelaxed)
    }
}

/// One applied outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Observation {
    pub arm: ArmId,
    pub position: usize,
    pub batch_size: u64,
    pub success: bool,
}
