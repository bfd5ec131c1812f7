//! Trend → Beta prior conversion.

use crate::{BeliefState, BetaParams, CyclicTrend};

/// Turns trend probabilities into pseudo-count priors.
///
/// For each position with probability `p` and strength `S`:
/// `alpha = p * S + 1`, `beta = (1 - p) * S + 1`. The `+1` keeps both parameters
/// strictly positive at `p = 0` and `p = 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorBuilder {
    /// Pseudo-observations per position. Non-finite or negative values act as `0`
    /// (a flat `Beta(1, 1)` prior).
    pub strength: f64,
}

impl Default for PriorBuilder {
    fn default() -> Self {
        Self { strength: 5.0 }
    }
}

impl PriorBuilder {
    pub fn new(strength: f64) -> Self {
        Self { strength }
    }

    pub fn params_for(&self, p: f64) -> BetaParams {
        let s = if self.strength.is_finite() && self.strength > 0.0 {
            self.strength
        } else {
            0.0
        };
        let p = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.5 };
        BetaParams {
            alpha: p * s + 1.0,
            beta: (1.0 - p) * s + 1.0,
        }
    }

    /// Seed a belief state with one prior per trend position.
    pub fn build(&self, trend: &CyclicTrend) -> BeliefState {
        let params = trend
            .probabilities()
            .iter()
            .map(|&p| self.params_for(p))
            .collect();
        // Trends are never empty and every parameter above is >= 1.
        BeliefState::seeded(params)
    }
}
