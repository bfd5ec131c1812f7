//! Per-position Beta beliefs.
//!
//! Each arm carries one `Beta(alpha, beta)` posterior per trend position. Updates
//! are plain Beta-Bernoulli conjugate counting, weighted by batch size: parameters
//! only ever grow, so the trend-derived prior fades as live evidence accumulates.

use rand::Rng;
use rand_distr::{Beta, Distribution};

/// Beta posterior parameters for one position. Both are always `> 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BetaParams {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaParams {
    /// Posterior mean `alpha / (alpha + beta)`.
    pub fn mean(&self) -> f64 {
        let denom = self.alpha + self.beta;
        if denom > 0.0 {
            self.alpha / denom
        } else {
            0.5
        }
    }

    /// Draw one posterior sample.
    ///
    /// Falls back to the mean if the parameters cannot form a distribution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match Beta::new(self.alpha, self.beta) {
            Ok(dist) => dist.sample(rng),
            Err(_) => self.mean(),
        }
    }

    fn is_valid(&self) -> bool {
        self.alpha.is_finite() && self.beta.is_finite() && self.alpha > 0.0 && self.beta > 0.0
    }
}

/// Beta posteriors for every position of one arm's trend.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BeliefState {
    params: Vec<BetaParams>,
}

impl BeliefState {
    /// Restore a belief state from stored parameters.
    ///
    /// Returns `None` if the list is empty or any parameter is non-positive or non-finite.
    pub fn from_params(params: Vec<BetaParams>) -> Option<Self> {
        (!params.is_empty() && params.iter().all(BetaParams::is_valid)).then_some(Self { params })
    }

    /// Caller guarantees a non-empty list of valid parameters.
    pub(crate) fn seeded(params: Vec<BetaParams>) -> Self {
        debug_assert!(!params.is_empty() && params.iter().all(BetaParams::is_valid));
        Self { params }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn params(&self) -> &[BetaParams] {
        &self.params
    }

    /// Parameters at `position` (wrapped modulo the trend length).
    pub fn at(&self, position: usize) -> BetaParams {
        self.params[position % self.params.len()]
    }

    pub fn posterior_mean(&self, position: usize) -> f64 {
        self.at(position).mean()
    }

    pub fn sample<R: Rng + ?Sized>(&self, position: usize, rng: &mut R) -> f64 {
        self.at(position).sample(rng)
    }

    /// Record an observation at `position`: `alpha += weight` on success, else `beta += weight`.
    ///
    /// Non-finite or negative weights are ignored so parameters never decrease.
    pub fn update(&mut self, position: usize, success: bool, weight: f64) {
        if !(weight.is_finite() && weight > 0.0) {
            return;
        }
        let idx = position % self.params.len();
        let p = &mut self.params[idx];
        if success {
            p.alpha += weight;
        } else {
            p.beta += weight;
        }
    }

    /// `(alpha, beta)` pairs, for snapshots.
    pub fn pairs(&self) -> Vec<(f64, f64)> {
        self.params.iter().map(|p| (p.alpha, p.beta)).collect()
    }
}
