//! Cyclic trends: fusing aligned runs into one per-position success curve.
//!
//! Pipeline ([`TrendBuilder::build`]):
//! 1. validate the runs for one arm,
//! 2. take the configured cycle length or detect it from the first (reference) run,
//! 3. align every other run against the reference,
//! 4. average position-wise over the shortest common length, then smooth.

use tracing::{info, warn};

use crate::{
    check_runs, Alignment, ArmId, CycleConfig, CycleDetector, DataError, Run, RunAligner,
};

/// Learned per-position success probabilities for one arm.
///
/// Invariants: non-empty, every probability in `[0, 1]`, `std.len() == probabilities.len()`,
/// `cycle_length > 0`. The curve covers the shortest aligned run, so it may span
/// several cycles; positions are indexed modulo its length.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CyclicTrend {
    probabilities: Vec<f64>,
    std: Vec<f64>,
    raw_mean: Vec<f64>,
    cycle_length: usize,
    num_runs: usize,
}

fn check_probabilities(probs: &[f64]) -> Result<(), DataError> {
    if probs.is_empty() {
        return Err(DataError::EmptyTrend);
    }
    for (position, &value) in probs.iter().enumerate() {
        if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
            return Err(DataError::ProbabilityOutOfRange { position, value });
        }
    }
    Ok(())
}

impl CyclicTrend {
    /// Wrap an externally supplied curve (hand-written or previously exported).
    ///
    /// The spread is unknown, so `std` is all zeros.
    pub fn from_probabilities(
        probabilities: Vec<f64>,
        cycle_length: usize,
    ) -> Result<Self, DataError> {
        check_probabilities(&probabilities)?;
        if cycle_length == 0 {
            return Err(DataError::ZeroCycle);
        }
        Ok(Self {
            std: vec![0.0; probabilities.len()],
            raw_mean: probabilities.clone(),
            probabilities,
            cycle_length,
            num_runs: 0,
        })
    }

    /// Same as [`from_probabilities`](Self::from_probabilities) with an explicit spread.
    pub fn with_std(
        probabilities: Vec<f64>,
        std: Vec<f64>,
        cycle_length: usize,
    ) -> Result<Self, DataError> {
        if std.len() != probabilities.len() {
            return Err(DataError::LengthMismatch {
                mean: probabilities.len(),
                std: std.len(),
            });
        }
        let mut t = Self::from_probabilities(probabilities, cycle_length)?;
        t.std = std;
        Ok(t)
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Per-position standard deviation across the fused runs (smoothed like the mean).
    pub fn std(&self) -> &[f64] {
        &self.std
    }

    /// Position-wise mean before smoothing.
    pub fn raw_mean(&self) -> &[f64] {
        &self.raw_mean
    }

    pub fn cycle_length(&self) -> usize {
        self.cycle_length
    }

    /// Number of runs fused into this trend (0 for externally supplied curves).
    pub fn num_runs(&self) -> usize {
        self.num_runs
    }

    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Probability at `position`, wrapping around the curve.
    pub fn at(&self, position: usize) -> f64 {
        self.probabilities[position % self.probabilities.len()]
    }

    pub fn mean_success(&self) -> f64 {
        self.probabilities.iter().sum::<f64>() / self.probabilities.len() as f64
    }
}

/// Centered moving average with zero padding at the edges.
///
/// Output length equals input length; the window for index `i` is
/// `[i - width/2, i - width/2 + width)`. `width <= 1` returns the input.
pub fn moving_average(xs: &[f64], width: usize) -> Vec<f64> {
    if width <= 1 {
        return xs.to_vec();
    }
    let n = xs.len() as isize;
    let half = (width / 2) as isize;
    let w = width as f64;
    (0..n)
        .map(|i| {
            let lo = (i - half).max(0);
            let hi = (i - half + width as isize).min(n);
            let s: f64 = (lo..hi).map(|j| xs[j as usize]).sum();
            s / w
        })
        .collect()
}

/// Position-wise fusion of aligned runs.
#[derive(Debug, Clone, Copy)]
pub struct TrendAverager {
    /// Moving-average width applied to both mean and std (`1` disables smoothing).
    pub smoothing_window: usize,
}

impl Default for TrendAverager {
    fn default() -> Self {
        Self { smoothing_window: 5 }
    }
}

impl TrendAverager {
    pub fn new(smoothing_window: usize) -> Self {
        Self { smoothing_window }
    }

    /// Fuse `reference` and `aligned` (already shifted) into a trend.
    ///
    /// Output length is the minimum length across all inputs.
    pub fn average(
        &self,
        reference: &[f64],
        aligned: &[Vec<f64>],
        cycle_length: usize,
    ) -> Result<CyclicTrend, DataError> {
        if cycle_length == 0 {
            return Err(DataError::ZeroCycle);
        }
        let rows: Vec<&[f64]> = std::iter::once(reference)
            .chain(aligned.iter().map(Vec::as_slice))
            .collect();
        let len = rows.iter().map(|r| r.len()).min().unwrap_or(0);
        if len == 0 {
            return Err(DataError::EmptyTrend);
        }
        let k = rows.len() as f64;

        let mut mean = vec![0.0; len];
        for row in &rows {
            for (m, x) in mean.iter_mut().zip(&row[..len]) {
                *m += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= k);

        let mut std = vec![0.0; len];
        for row in &rows {
            for ((s, x), m) in std.iter_mut().zip(&row[..len]).zip(&mean) {
                *s += (x - m) * (x - m);
            }
        }
        std.iter_mut().for_each(|s| *s = (*s / k).sqrt());

        let probabilities: Vec<f64> = moving_average(&mean, self.smoothing_window)
            .into_iter()
            .map(|p| p.clamp(0.0, 1.0))
            .collect();
        let std = moving_average(&std, self.smoothing_window);

        check_probabilities(&probabilities)?;
        Ok(CyclicTrend {
            probabilities,
            std,
            raw_mean: mean,
            cycle_length,
            num_runs: rows.len(),
        })
    }
}

/// Trend construction configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrendConfig {
    pub cycle: CycleConfig,
    /// Known cycle length; skips detection when set.
    pub expected_cycle: Option<usize>,
    /// Moving-average width for the fused curve.
    pub smoothing_window: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            cycle: CycleConfig::default(),
            expected_cycle: None,
            smoothing_window: 5,
        }
    }
}

/// Output of [`TrendBuilder::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrendFit {
    pub trend: CyclicTrend,
    /// Whether the cycle length was detected (false: expected or fallback).
    pub cycle_detected: bool,
    /// Alignment of each non-reference run, in input order.
    pub alignments: Vec<Alignment>,
}

/// Full detect → align → average pipeline for one arm.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendBuilder {
    pub cfg: TrendConfig,
}

impl TrendBuilder {
    pub fn new(cfg: TrendConfig) -> Self {
        Self { cfg }
    }

    /// Build the trend for `arm` from its runs. The first run is the reference.
    pub fn build(&self, arm: ArmId, runs: &[Run]) -> Result<TrendFit, DataError> {
        check_runs(arm, runs)?;
        let reference = runs[0].as_f64();

        let (cycle_length, cycle_detected) = match self.cfg.expected_cycle {
            Some(c) if c > 0 => (c, false),
            _ => {
                let est = CycleDetector::new(self.cfg.cycle).detect(&reference);
                if !est.detected() {
                    warn!(arm, fallback = est.length, "cycle not detected");
                }
                (est.length, est.detected())
            }
        };
        if cycle_length == 0 {
            return Err(DataError::ZeroCycle);
        }

        let mut aligned = Vec::with_capacity(runs.len().saturating_sub(1));
        let mut alignments = Vec::with_capacity(runs.len().saturating_sub(1));
        for run in &runs[1..] {
            let a = RunAligner.align_run(&reference, &run.as_f64(), cycle_length);
            alignments.push(a.alignment);
            aligned.push(a.data);
        }

        let trend = TrendAverager::new(self.cfg.smoothing_window).average(
            &reference,
            &aligned,
            cycle_length,
        )?;
        info!(
            arm,
            cycle_length,
            cycle_detected,
            runs = trend.num_runs(),
            positions = trend.len(),
            mean = trend.mean_success(),
            "built trend"
        );
        Ok(TrendFit {
            trend,
            cycle_detected,
            alignments,
        })
    }
}

/// Descriptive statistics of a trend, relative to a pair of batch thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrendSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Positions with probability `>= high`.
    pub high_zones: usize,
    /// Positions in `[medium, high)`.
    pub medium_zones: usize,
    /// Positions with probability `< medium`.
    pub low_zones: usize,
    /// Start and value of the best full moving-average window, if the trend is long enough.
    pub best_window: Option<(usize, f64)>,
    pub worst_window: Option<(usize, f64)>,
}

impl TrendSummary {
    pub fn of(trend: &CyclicTrend, high: f64, medium: f64, window: usize) -> Self {
        let p = trend.probabilities();
        let min = p.iter().copied().fold(f64::INFINITY, f64::min);
        let max = p.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let high_zones = p.iter().filter(|&&x| x >= high).count();
        let low_zones = p.iter().filter(|&&x| x < medium && x < high).count();

        let window = window.max(1);
        let mut best_window: Option<(usize, f64)> = None;
        let mut worst_window: Option<(usize, f64)> = None;
        if p.len() >= window {
            for (start, w) in p.windows(window).enumerate() {
                let v = w.iter().sum::<f64>() / window as f64;
                if best_window.map_or(true, |(_, b)| v > b) {
                    best_window = Some((start, v));
                }
                if worst_window.map_or(true, |(_, b)| v < b) {
                    worst_window = Some((start, v));
                }
            }
        }

        Self {
            mean: trend.mean_success(),
            min,
            max,
            high_zones,
            medium_zones: p.len() - high_zones - low_zones,
            low_zones,
            best_window,
            worst_window,
        }
    }
}
