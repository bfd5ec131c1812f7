//! Per-arm policy table and engine configuration.

use crate::PreconditionError;

/// Selection policy for one arm.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArmPolicy {
    /// Admissibility floor: the arm is only eligible when its posterior mean at its
    /// current position is `>= min_expected` (before relaxation).
    pub min_expected: f64,
    /// Longest allowed streak of consecutive selections before a forced switch.
    pub max_consecutive: u64,
    /// Multiplier applied to the arm's posterior sample when ranking.
    pub priority: f64,
    /// Posterior mean at or above this sends the large batch.
    pub high_threshold: f64,
    /// Posterior mean at or above this (and below `high_threshold`) sends the medium batch.
    pub medium_threshold: f64,
}

impl ArmPolicy {
    /// Whether every field can be used for scoring and batch sizing.
    pub fn is_valid(&self) -> bool {
        self.priority.is_finite()
            && self.priority >= 0.0
            && self.min_expected.is_finite()
            && self.high_threshold.is_finite()
            && self.medium_threshold.is_finite()
            && self.medium_threshold <= self.high_threshold
    }
}

impl Default for ArmPolicy {
    fn default() -> Self {
        Self {
            min_expected: 0.0,
            max_consecutive: 15,
            priority: 1.0,
            high_threshold: 0.65,
            medium_threshold: 0.50,
        }
    }
}

/// The three batch sizes the batch policy chooses between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchSizes {
    pub small: u64,
    pub medium: u64,
    pub large: u64,
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            small: 1,
            medium: 2,
            large: 3,
        }
    }
}

impl BatchSizes {
    /// Map a posterior mean through the arm's thresholds (inclusive comparisons).
    pub fn for_mean(&self, mean: f64, policy: &ArmPolicy) -> u64 {
        if mean >= policy.high_threshold {
            self.large
        } else if mean >= policy.medium_threshold {
            self.medium
        } else {
            self.small
        }
    }
}

/// Decision engine configuration.
///
/// `arms[i]` is the policy for arm `i`; its length must match the number of trends.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Pseudo-observations per trend position in the prior.
    pub prior_strength: f64,
    /// Force a switch after this many decisions without one (`0` disables).
    pub forced_explore_period: u64,
    pub batch_sizes: BatchSizes,
    pub arms: Vec<ArmPolicy>,
    /// Global budget, in batch units, for the whole session.
    pub budget: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prior_strength: 5.0,
            forced_explore_period: 30,
            batch_sizes: BatchSizes::default(),
            arms: Vec::new(),
            budget: 1000,
        }
    }
}

impl EngineConfig {
    /// Same policy for `n` arms.
    pub fn uniform(n: usize, policy: ArmPolicy) -> Self {
        Self {
            arms: vec![policy; n],
            ..Self::default()
        }
    }

    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_prior_strength(mut self, strength: f64) -> Self {
        self.prior_strength = strength;
        self
    }

    pub fn with_forced_explore_period(mut self, period: u64) -> Self {
        self.forced_explore_period = period;
        self
    }

    /// Check everything that does not depend on the trends.
    pub fn validate(&self) -> Result<(), PreconditionError> {
        if self.arms.is_empty() {
            return Err(PreconditionError::NoArms);
        }
        if self.budget == 0 {
            return Err(PreconditionError::ZeroBudget);
        }
        if !(self.prior_strength.is_finite() && self.prior_strength >= 0.0) {
            return Err(PreconditionError::InvalidPriorStrength(self.prior_strength));
        }
        let b = self.batch_sizes;
        if b.small == 0 || b.small > b.medium || b.medium > b.large {
            return Err(PreconditionError::InvalidBatchSizes);
        }
        if let Some(arm) = self.arms.iter().position(|p| !p.is_valid()) {
            return Err(PreconditionError::InvalidArmPolicy(arm));
        }
        Ok(())
    }
}
