//! Seeded simulated environment with cyclic per-arm success probabilities.
//!
//! Useful for tests, benches and offline tuning: it implements [`Transport`] for
//! live sessions and records phase-misaligned [`Run`]s for trend learning.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{ArmId, Attempt, DataError, Run, Transport, TransportError};

/// Simulated arms whose true success probability cycles over positions.
#[derive(Debug, Clone)]
pub struct CyclicWorld {
    cycles: Vec<Vec<f64>>,
    positions: Vec<usize>,
    rng: StdRng,
    capacity: Option<u64>,
    fail_after: Option<u64>,
    attempts: u64,
}

impl CyclicWorld {
    /// `cycles[arm]` is the true probability at each position of the arm's cycle.
    ///
    /// Every arm starts at position 0. Empty cycles are treated as a constant `0.0`.
    pub fn new(cycles: Vec<Vec<f64>>, seed: u64) -> Self {
        let cycles: Vec<Vec<f64>> = cycles
            .into_iter()
            .map(|c| if c.is_empty() { vec![0.0] } else { c })
            .collect();
        Self {
            positions: vec![0; cycles.len()],
            cycles,
            rng: StdRng::seed_from_u64(seed),
            capacity: None,
            fail_after: None,
            attempts: 0,
        }
    }

    /// Report exhaustion once this many units have been sent.
    pub fn with_capacity(mut self, units: u64) -> Self {
        self.capacity = Some(units);
        self
    }

    /// Fail every attempt after the first `n`.
    pub fn failing_after(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Start each arm at a random position inside its cycle.
    pub fn randomize_phases(&mut self) {
        for (pos, cycle) in self.positions.iter_mut().zip(&self.cycles) {
            *pos = self.rng.random_range(0..cycle.len());
        }
    }

    pub fn position(&self, arm: ArmId) -> Option<usize> {
        self.positions.get(arm).copied()
    }

    /// True probability of `arm` at its current position.
    pub fn current_probability(&self, arm: ArmId) -> Option<f64> {
        let cycle = self.cycles.get(arm)?;
        Some(cycle[self.positions[arm] % cycle.len()])
    }

    fn draw(&mut self, arm: ArmId) -> bool {
        let cycle = &self.cycles[arm];
        let p = cycle[self.positions[arm] % cycle.len()];
        self.positions[arm] = (self.positions[arm] + 1) % cycle.len();
        self.rng.random::<f64>() < p
    }

    /// Record an observation session of `len` single attempts on `arm`, starting at a
    /// random phase. Does not disturb the live positions.
    pub fn record_run(&mut self, arm: ArmId, len: usize) -> Result<Run, DataError> {
        let Some(cycle_len) = self.cycles.get(arm).map(Vec::len) else {
            return Err(DataError::NoRuns { arm });
        };
        let saved = self.positions[arm];
        self.positions[arm] = self.rng.random_range(0..cycle_len);
        let outcomes = (0..len).map(|_| self.draw(arm)).collect();
        self.positions[arm] = saved;
        Run::new(arm, outcomes)
    }
}

impl Transport for CyclicWorld {
    fn attempt(&mut self, arm: ArmId, batch_size: u64) -> Result<Attempt, TransportError> {
        if arm >= self.cycles.len() {
            return Err(TransportError::new(format!("no such arm {arm}")));
        }
        if self.fail_after.is_some_and(|n| self.attempts >= n) {
            return Err(TransportError::new("simulated outage"));
        }
        self.attempts += 1;
        let success = self.draw(arm);
        let mut remaining = None;
        if let Some(units) = self.capacity {
            let left = units.saturating_sub(batch_size);
            self.capacity = Some(left);
            remaining = Some(left);
        }
        Ok(Attempt { success, remaining })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_probabilities_are_respected() {
        let mut w = CyclicWorld::new(vec![vec![1.0, 0.0]], 0);
        let got: Vec<bool> = (0..6)
            .map(|_| w.attempt(0, 1).unwrap().success)
            .collect();
        assert_eq!(got, vec![true, false, true, false, true, false]);
    }

    #[test]
    fn capacity_and_failures_are_reported() {
        let mut w = CyclicWorld::new(vec![vec![0.5]], 1).with_capacity(4);
        assert_eq!(w.attempt(0, 3).unwrap().remaining, Some(1));
        assert_eq!(w.attempt(0, 3).unwrap().remaining, Some(0));
        assert!(w.attempt(9, 1).is_err());

        let mut w = CyclicWorld::new(vec![vec![0.5]], 1).failing_after(1);
        assert!(w.attempt(0, 1).is_ok());
        assert!(w.attempt(0, 1).is_err());
    }

    #[test]
    fn record_run_leaves_live_position_alone() {
        let mut w = CyclicWorld::new(vec![vec![1.0, 0.0, 0.0]], 2);
        w.attempt(0, 1).unwrap();
        let run = w.record_run(0, 30).unwrap();
        assert_eq!(run.len(), 30);
        assert!((run.success_rate() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(w.position(0), Some(1));
        assert!(w.record_run(5, 3).is_err());
    }

    #[test]
    fn randomized_phases_stay_inside_cycles() {
        let mut w = CyclicWorld::new(vec![vec![0.1; 7], vec![], vec![0.9; 3]], 4);
        w.randomize_phases();
        assert!(w.position(0).unwrap() < 7);
        assert_eq!(w.position(1), Some(0));
        assert!(w.position(2).unwrap() < 3);
        assert_eq!(w.current_probability(1), Some(0.0));
        assert_eq!(w.current_probability(3), None);
    }
}
