//! Phase alignment by correlation.
//!
//! Every observation session starts at an unknown point in the arm's cycle. To
//! fuse sessions, each candidate run is circularly shifted against a reference
//! run and the shift with the highest Pearson correlation wins. The same scan,
//! run against a learned trend instead of a reference run, localizes a live
//! session's phase from a few probe outcomes ([`locate_phase`]).

use tracing::debug;

use crate::{CyclicTrend, Run};

/// Pearson correlation over the shared prefix of `a` and `b`.
///
/// Returns `None` when the overlap is shorter than two points or either side has
/// zero variance (the coefficient is undefined there).
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let nf = n as f64;
    let ma = a.iter().sum::<f64>() / nf;
    let mb = b.iter().sum::<f64>() / nf;
    let mut sab = 0.0;
    let mut saa = 0.0;
    let mut sbb = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - ma;
        let dy = y - mb;
        sab += dx * dy;
        saa += dx * dx;
        sbb += dy * dy;
    }
    if !(saa > 0.0 && sbb > 0.0) {
        return None;
    }
    let r = sab / (saa.sqrt() * sbb.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Circular right shift: `out[(i + k) % n] = xs[i]`.
pub fn circular_shift(xs: &[f64], k: usize) -> Vec<f64> {
    let n = xs.len();
    if n == 0 {
        return Vec::new();
    }
    let k = k % n;
    let mut out = Vec::with_capacity(n);
    out.extend_from_slice(&xs[n - k..]);
    out.extend_from_slice(&xs[..n - k]);
    out
}

/// Best circular offset found for one candidate run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Alignment {
    /// Shift in `[0, cycle_length)` applied to the candidate.
    pub offset: usize,
    /// Correlation achieved at `offset`; `-1.0` when no offset had a defined correlation.
    pub correlation: f64,
}

/// A candidate run after its best shift has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRun {
    pub data: Vec<f64>,
    pub alignment: Alignment,
}

/// Correlation assigned to offsets whose Pearson coefficient is undefined.
pub const WORST_CORRELATION: f64 = -1.0;

/// First index with the strictly highest defined score.
///
/// Undefined scores never win, so a real `-1.0` beats any number of them.
fn best_defined(scores: impl IntoIterator<Item = (usize, Option<f64>)>) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, score) in scores {
        let Some(s) = score else { continue };
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((i, s));
        }
    }
    best
}

/// Cross-correlation run aligner.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunAligner;

impl RunAligner {
    /// Scan offsets `0..min(cycle_length, candidate.len())` and keep the first offset
    /// with the strictly highest correlation against `reference`.
    ///
    /// Never fails: offsets with an undefined correlation (zero variance on either side)
    /// are skipped, and a scan with no defined offset returns offset 0 scored
    /// [`WORST_CORRELATION`].
    pub fn align(&self, reference: &[f64], candidate: &[f64], cycle_length: usize) -> Alignment {
        let range = cycle_length.min(candidate.len());
        let scores = (0..range).map(|k| (k, pearson(reference, &circular_shift(candidate, k))));
        let (offset, correlation) = best_defined(scores).unwrap_or((0, WORST_CORRELATION));
        Alignment {
            offset,
            correlation,
        }
    }

    /// Align and apply the shift.
    pub fn align_run(
        &self,
        reference: &[f64],
        candidate: &[f64],
        cycle_length: usize,
    ) -> AlignedRun {
        let alignment = self.align(reference, candidate, cycle_length);
        debug!(
            offset = alignment.offset,
            correlation = alignment.correlation,
            "aligned run"
        );
        AlignedRun {
            data: circular_shift(candidate, alignment.offset),
            alignment,
        }
    }
}

/// Where a live session sits inside a trend, estimated from probe outcomes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhaseEstimate {
    /// Trend position the first probe corresponds to.
    pub start: usize,
    /// Correlation between probes and the trend window at `start` (`-1.0` if none was defined).
    pub correlation: f64,
    /// Trend position of the next attempt, after all probes.
    pub next_position: usize,
}

/// Localize `probes` (consecutive outcomes from one arm) inside `trend`.
///
/// Candidate starts range over `0..min(cycle_length, trend.len())`. Windows whose
/// expected pattern (or the probes themselves) has zero variance are skipped.
pub fn locate_phase(trend: &CyclicTrend, probes: &[bool]) -> PhaseEstimate {
    let probs = trend.probabilities();
    let len = probs.len();
    let observed: Vec<f64> = probes.iter().map(|&p| if p { 1.0 } else { 0.0 }).collect();
    let range = trend.cycle_length().min(len);

    let scores = (0..range).map(|s| {
        let expected: Vec<f64> = (0..observed.len()).map(|i| probs[(s + i) % len]).collect();
        (s, pearson(&observed, &expected))
    });
    let (start, correlation) = best_defined(scores).unwrap_or((0, WORST_CORRELATION));
    let next_position = if len == 0 { 0 } else { (start + probes.len()) % len };
    debug!(start, correlation, next_position, "located phase");
    PhaseEstimate {
        start,
        correlation,
        next_position,
    }
}

/// Mean pairwise correlation between runs over their shared prefixes.
///
/// Pairs that overlap by fewer than `min_overlap` outcomes, or whose correlation
/// is undefined, are skipped. `None` if no pair qualifies.
pub fn run_agreement(runs: &[Run], min_overlap: usize) -> Option<f64> {
    let series: Vec<Vec<f64>> = runs.iter().map(Run::as_f64).collect();
    let mut total = 0.0;
    let mut count = 0usize;
    for i in 0..series.len() {
        for j in i + 1..series.len() {
            if series[i].len().min(series[j].len()) < min_overlap {
                continue;
            }
            if let Some(r) = pearson(&series[i], &series[j]) {
                total += r;
                count += 1;
            }
        }
    }
    (count > 0).then(|| total / count as f64)
}
