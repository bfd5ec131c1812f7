//! Observation runs: one arm, one session, an ordered list of binary outcomes.

use crate::{ArmId, DataError};

/// Immutable outcome sequence recorded for one arm over one observation session.
///
/// Runs from different sessions are generally phase-misaligned: each session
/// starts somewhere arbitrary inside the arm's cycle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Run {
    arm: ArmId,
    outcomes: Vec<bool>,
    success_rate: f64,
}

impl Run {
    /// Build a run, rejecting empty outcome sequences.
    pub fn new(arm: ArmId, outcomes: Vec<bool>) -> Result<Self, DataError> {
        if outcomes.is_empty() {
            return Err(DataError::EmptyRun { arm });
        }
        let successes = outcomes.iter().filter(|&&o| o).count();
        let success_rate = successes as f64 / outcomes.len() as f64;
        Ok(Self {
            arm,
            outcomes,
            success_rate,
        })
    }

    pub fn arm(&self) -> ArmId {
        self.arm
    }

    pub fn outcomes(&self) -> &[bool] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Always false for a constructed run; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Fraction of successful outcomes.
    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    /// Outcomes as `0.0`/`1.0`, the form the signal routines work on.
    pub fn as_f64(&self) -> Vec<f64> {
        self.outcomes
            .iter()
            .map(|&o| if o { 1.0 } else { 0.0 })
            .collect()
    }
}

/// Validate that every run belongs to `arm` and that at least one run exists.
pub fn check_runs(arm: ArmId, runs: &[Run]) -> Result<(), DataError> {
    if runs.is_empty() {
        return Err(DataError::NoRuns { arm });
    }
    for r in runs {
        if r.arm != arm {
            return Err(DataError::ArmMismatch {
                expected: arm,
                found: r.arm,
            });
        }
    }
    Ok(())
}

#[cfg(feature = "serde")]
mod record {
    use super::Run;
    use crate::{ArmId, DataError};

    /// One outcome as stored on disk: either a JSON bool or a 0/1 integer.
    #[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
    #[serde(untagged)]
    pub enum OutcomeValue {
        Flag(bool),
        Count(u8),
    }

    impl OutcomeValue {
        fn as_bool(self) -> bool {
            match self {
                OutcomeValue::Flag(b) => b,
                OutcomeValue::Count(n) => n > 0,
            }
        }
    }

    /// Serialized form of a recorded run.
    ///
    /// `success_rate` and `total_trips` are informational; the run's own rate is
    /// recomputed from `results`.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct RunRecord {
        pub arm: ArmId,
        pub results: Vec<OutcomeValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub success_rate: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub total_trips: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub run_number: Option<u32>,
    }

    impl RunRecord {
        /// Convert into a [`Run`], checking it belongs to `expected_arm`.
        pub fn into_run(self, expected_arm: ArmId) -> Result<Run, DataError> {
            if self.arm != expected_arm {
                return Err(DataError::ArmMismatch {
                    expected: expected_arm,
                    found: self.arm,
                });
            }
            let outcomes = self.results.into_iter().map(OutcomeValue::as_bool).collect();
            Run::new(self.arm, outcomes)
        }
    }

    /// Parse a JSON array of [`RunRecord`]s for one arm.
    pub fn runs_from_json(json: &str, arm: ArmId) -> Result<Vec<Run>, DataError> {
        let records: Vec<RunRecord> =
            serde_json::from_str(json).map_err(|e| DataError::Malformed(e.to_string()))?;
        records.into_iter().map(|r| r.into_run(arm)).collect()
    }
}

#[cfg(feature = "serde")]
pub use record::{runs_from_json, OutcomeValue, RunRecord};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_run_is_rejected() {
        assert_eq!(Run::new(3, vec![]), Err(DataError::EmptyRun { arm: 3 }));
    }

    #[test]
    fn success_rate_is_derived() {
        let r = Run::new(0, vec![true, false, true, true]).unwrap();
        assert!((r.success_rate() - 0.75).abs() < 1e-12);
        assert_eq!(r.as_f64(), vec![1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn check_runs_flags_foreign_arm() {
        let runs = vec![
            Run::new(1, vec![true]).unwrap(),
            Run::new(2, vec![false]).unwrap(),
        ];
        assert_eq!(
            check_runs(1, &runs),
            Err(DataError::ArmMismatch {
                expected: 1,
                found: 2
            })
        );
        assert_eq!(check_runs(1, &[]), Err(DataError::NoRuns { arm: 1 }));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn records_accept_bools_and_integers() {
        let json = r#"[
            {"arm": 2, "results": [1, 0, 1], "success_rate": 0.66},
            {"arm": 2, "results": [true, true, false], "run_number": 2}
        ]"#;
        let runs = runs_from_json(json, 2).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].outcomes(), &[true, false, true]);
        assert_eq!(runs[1].outcomes(), &[true, true, false]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn records_for_wrong_arm_fail() {
        let json = r#"[{"arm": 0, "results": [1]}]"#;
        assert!(matches!(
            runs_from_json(json, 1),
            Err(DataError::ArmMismatch { .. })
        ));
        assert!(matches!(
            runs_from_json("not json", 1),
            Err(DataError::Malformed(_))
        ));
    }
}
