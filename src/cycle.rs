//! Cycle-length detection from a single reference run.
//!
//! The estimator is the first qualifying peak of the normalized autocorrelation
//! function. Peak picking follows the usual "local maximum, minimum height,
//! minimum separation" rules: among peaks closer than `min_peak_distance`, only
//! the tallest survives.
//!
//! Detection never fails. A flat sequence, a sequence too short to have a peak,
//! or a sequence with no peak above `min_peak_height` all yield the configured
//! fallback length.

use tracing::debug;

/// Cycle detection configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CycleConfig {
    /// Peaks are searched over lags `1..max_lag` (exclusive), clamped to `len - 1`.
    pub max_lag: usize,
    /// Minimum normalized autocorrelation for a peak to count.
    pub min_peak_height: f64,
    /// Peaks closer than this (in lags) are thinned down to the tallest one.
    pub min_peak_distance: usize,
    /// Returned when no qualifying peak exists. Must be > 0.
    pub fallback_cycle: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_lag: 100,
            min_peak_height: 0.1,
            min_peak_distance: 5,
            fallback_cycle: 50,
        }
    }
}

/// Result of a detection attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CycleEstimate {
    /// Cycle length in positions (always > 0 when `fallback_cycle > 0`).
    pub length: usize,
    /// Normalized autocorrelation at `length`, when a peak was found.
    pub peak_height: Option<f64>,
}

impl CycleEstimate {
    /// Whether `length` came from a detected peak rather than the fallback.
    pub fn detected(&self) -> bool {
        self.peak_height.is_some()
    }
}

/// Zero-mean autocorrelation for lags `0..=max_lag`, normalized by the lag-0 value.
///
/// Returns `None` for empty or zero-variance input (normalization is undefined).
pub fn autocorrelation(xs: &[f64], max_lag: usize) -> Option<Vec<f64>> {
    let n = xs.len();
    if n == 0 {
        return None;
    }
    let mean = xs.iter().sum::<f64>() / n as f64;
    let d: Vec<f64> = xs.iter().map(|x| x - mean).collect();
    let r0: f64 = d.iter().map(|x| x * x).sum();
    if !(r0.is_finite() && r0 > 0.0) {
        return None;
    }
    let top = max_lag.min(n - 1);
    let acf = (0..=top)
        .map(|k| {
            let rk: f64 = d[..n - k].iter().zip(&d[k..]).map(|(a, b)| a * b).sum();
            rk / r0
        })
        .collect();
    Some(acf)
}

/// Indices of local maxima in `signal` (plateaus resolve to their midpoint),
/// filtered by `min_height` and thinned to be at least `min_distance` apart.
///
/// Endpoints are never peaks. Output is in ascending index order.
pub fn find_peaks(signal: &[f64], min_height: f64, min_distance: usize) -> Vec<usize> {
    let n = signal.len();
    let mut peaks: Vec<usize> = Vec::new();
    if n < 3 {
        return peaks;
    }

    let mut i = 1;
    while i + 1 < n {
        if signal[i - 1] < signal[i] {
            let mut ahead = i + 1;
            while ahead + 1 < n && signal[ahead] == signal[i] {
                ahead += 1;
            }
            if signal[ahead] < signal[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }

    peaks.retain(|&p| signal[p] >= min_height);

    let distance = min_distance.max(1);
    if distance == 1 || peaks.len() < 2 {
        return peaks;
    }

    // Tallest first; equal heights keep the earlier lag.
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| {
        signal[peaks[b]]
            .total_cmp(&signal[peaks[a]])
            .then(peaks[a].cmp(&peaks[b]))
    });
    let mut keep = vec![true; peaks.len()];
    for &i in &order {
        if !keep[i] {
            continue;
        }
        for j in 0..peaks.len() {
            if j != i && keep[j] && peaks[i].abs_diff(peaks[j]) < distance {
                keep[j] = false;
            }
        }
    }
    peaks
        .into_iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(p))
        .collect()
}

/// Autocorrelation-based cycle detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleDetector {
    pub cfg: CycleConfig,
}

impl CycleDetector {
    pub fn new(cfg: CycleConfig) -> Self {
        Self { cfg }
    }

    /// Estimate the cycle length of `xs` (outcomes as 0/1).
    pub fn detect(&self, xs: &[f64]) -> CycleEstimate {
        let fallback = CycleEstimate {
            length: self.cfg.fallback_cycle,
            peak_height: None,
        };
        let Some(acf) = autocorrelation(xs, self.cfg.max_lag) else {
            debug!(
                len = xs.len(),
                fallback = self.cfg.fallback_cycle,
                "flat sequence, using fallback cycle"
            );
            return fallback;
        };
        // acf[0] == 1 by construction.
        let end = self.cfg.max_lag.min(acf.len()).max(1);
        let window = &acf[1..end];
        let peaks = find_peaks(
            window,
            self.cfg.min_peak_height,
            self.cfg.min_peak_distance,
        );
        match peaks.first() {
            Some(&idx) => {
                let est = CycleEstimate {
                    length: idx + 1,
                    peak_height: Some(window[idx]),
                };
                debug!(length = est.length, height = window[idx], "detected cycle");
                est
            }
            None => {
                debug!(
                    fallback = self.cfg.fallback_cycle,
                    "no autocorrelation peak, using fallback cycle"
                );
                fallback
            }
        }
    }

    /// Convenience wrapper returning only the length.
    pub fn cycle_length(&self, xs: &[f64]) -> usize {
        self.detect(xs).length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periodic(pattern: &[f64], reps: usize) -> Vec<f64> {
        pattern.iter().copied().cycle().take(pattern.len() * reps).collect()
    }

    #[test]
    fn constant_sequence_returns_fallback() {
        let det = CycleDetector::new(CycleConfig {
            fallback_cycle: 17,
            ..CycleConfig::default()
        });
        for v in [0.0, 1.0] {
            let est = det.detect(&vec![v; 200]);
            assert_eq!(est.length, 17);
            assert!(!est.detected());
        }
        assert_eq!(det.cycle_length(&[]), 17);
    }

    #[test]
    fn detects_period_seven() {
        let xs = periodic(&[0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0], 30);
        let est = CycleDetector::default().detect(&xs);
        assert_eq!(est.length, 7);
        assert!(est.peak_height.unwrap() > 0.5);
    }

    #[test]
    fn detects_period_twelve() {
        let xs = periodic(
            &[0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0],
            20,
        );
        assert_eq!(CycleDetector::default().cycle_length(&xs), 12);
    }

    #[test]
    fn autocorrelation_is_normalized() {
        let acf = autocorrelation(&[1.0, 0.0, 1.0, 0.0, 1.0, 0.0], 3).unwrap();
        assert_eq!(acf.len(), 4);
        assert!((acf[0] - 1.0).abs() < 1e-12);
        assert!(acf[1] < 0.0);
        assert!(acf[2] > 0.0);
        assert!(autocorrelation(&[0.5; 4], 3).is_none());
    }

    #[test]
    fn max_lag_itself_is_not_searched() {
        let xs = periodic(&[1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0], 20);
        let with_max_lag = |max_lag| {
            CycleDetector::new(CycleConfig {
                max_lag,
                min_peak_distance: 1,
                ..CycleConfig::default()
            })
            .detect(&xs)
        };
        // The lag-8 peak needs lag 9 as its right neighbour, so it is visible from max_lag 10.
        assert!(!with_max_lag(9).detected());
        assert_eq!(with_max_lag(10).length, 8);
        assert_eq!(with_max_lag(0).length, 50);
    }

    #[test]
    fn max_lag_is_clamped_to_length() {
        let acf = autocorrelation(&[1.0, 0.0, 1.0], 100).unwrap();
        assert_eq!(acf.len(), 3);
    }

    #[test]
    fn find_peaks_handles_plateaus_and_edges() {
        // Edge values are never peaks; the plateau at 3..=5 resolves to 4.
        let s = [5.0, 1.0, 2.0, 3.0, 3.0, 3.0, 1.0, 4.0];
        assert_eq!(find_peaks(&s, 0.0, 1), vec![4]);
    }

    #[test]
    fn find_peaks_thins_by_distance_keeping_tallest() {
        let s = [0.0, 0.5, 0.0, 0.9, 0.0, 0.4, 0.0, 0.0, 0.0, 0.0, 0.7, 0.0];
        assert_eq!(find_peaks(&s, 0.1, 1), vec![1, 3, 5, 10]);
        assert_eq!(find_peaks(&s, 0.1, 5), vec![3, 10]);
        assert_eq!(find_peaks(&s, 0.6, 1), vec![3, 10]);
    }
}
