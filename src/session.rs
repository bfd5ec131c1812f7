//! Session driver: repeated select → attempt → observe.
//!
//! All mutable solver state lives in a caller-owned [`SessionContext`]; the
//! [`SessionLoop`] borrows it, so after any stop or abort the caller still holds
//! the beliefs, selection state and running totals.
//!
//! The loop is strictly sequential. Cancellation is checked only between steps,
//! and a failed transport call leaves beliefs untouched (the pending decision is
//! abandoned, never half-applied).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::{ArmId, BeliefState, BetaParams, DecisionEngine, Error, Observation, TransportError};

/// What the collaborator reports for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attempt {
    pub success: bool,
    /// Units the collaborator still has available; `Some(0)` ends the session.
    pub remaining: Option<u64>,
}

impl Attempt {
    pub fn new(success: bool) -> Self {
        Self {
            success,
            remaining: None,
        }
    }
}

/// The external send/observe collaborator.
///
/// Calls are synchronous and may fail; retry policy belongs to the implementor.
pub trait Transport {
    fn attempt(&mut self, arm: ArmId, batch_size: u64) -> Result<Attempt, TransportError>;
}

impl<F> Transport for F
where
    F: FnMut(ArmId, u64) -> Result<Attempt, TransportError>,
{
    fn attempt(&mut self, arm: ArmId, batch_size: u64) -> Result<Attempt, TransportError> {
        self(arm, batch_size)
    }
}

/// Running totals, in batch units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Totals {
    pub attempts: u64,
    pub sent: u64,
    pub succeeded: u64,
}

impl Totals {
    fn record(&mut self, obs: &Observation) {
        self.attempts += 1;
        self.sent += obs.batch_size;
        if obs.success {
            self.succeeded += obs.batch_size;
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.sent as f64
        }
    }
}

/// Serializable session state for an external persistence sink.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionSnapshot {
    /// `beliefs[arm][position] = (alpha, beta)`.
    pub beliefs: Vec<Vec<(f64, f64)>>,
    pub sent: u64,
    pub succeeded: u64,
    pub trips: Vec<u64>,
    pub remaining_budget: u64,
}

impl SessionSnapshot {
    /// Rebuild belief states; `None` if any arm's parameters are degenerate.
    pub fn to_beliefs(&self) -> Option<Vec<BeliefState>> {
        self.beliefs
            .iter()
            .map(|pairs| {
                BeliefState::from_params(
                    pairs
                        .iter()
                        .map(|&(alpha, beta)| BetaParams { alpha, beta })
                        .collect(),
                )
            })
            .collect()
    }
}

/// Caller-owned solver state for one session.
#[derive(Debug)]
pub struct SessionContext<R> {
    pub engine: DecisionEngine,
    pub rng: R,
    pub totals: Totals,
    /// Every applied observation, in order.
    pub history: Vec<Observation>,
    cancel: Arc<AtomicBool>,
}

impl<R: Rng> SessionContext<R> {
    pub fn new(engine: DecisionEngine, rng: R) -> Self {
        Self {
            engine,
            rng,
            totals: Totals::default(),
            history: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that stops the loop before its next step when set to `true`.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            beliefs: self.engine.beliefs().iter().map(BeliefState::pairs).collect(),
            sent: self.totals.sent,
            succeeded: self.totals.succeeded,
            trips: self.engine.selection().trips().to_vec(),
            remaining_budget: self.engine.remaining_budget(),
        }
    }
}

/// Why a session ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopReason {
    /// The engine's global budget reached zero.
    BudgetExhausted,
    /// The collaborator reported it has nothing left.
    CollaboratorExhausted,
    /// The cancellation flag was set.
    Cancelled,
}

/// Outcome of a completed [`SessionLoop::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionReport {
    pub stop: StopReason,
    pub totals: Totals,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied(Observation),
    Stopped(StopReason),
}

/// Sequencing glue around a [`DecisionEngine`]. Holds no selection logic.
pub struct SessionLoop<'a, R> {
    ctx: &'a mut SessionContext<R>,
}

impl<'a, R: Rng> SessionLoop<'a, R> {
    pub fn new(ctx: &'a mut SessionContext<R>) -> Self {
        Self { ctx }
    }

    /// Run one select → attempt → observe cycle.
    ///
    /// A transport failure abandons the pending decision and is returned as
    /// [`Error::Transport`]; everything applied before it stays in the context.
    pub fn step_once<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<StepOutcome, Error> {
        if self.ctx.is_cancelled() {
            return Ok(StepOutcome::Stopped(StopReason::Cancelled));
        }
        if self.ctx.engine.is_exhausted() {
            return Ok(StepOutcome::Stopped(StopReason::BudgetExhausted));
        }

        let ctx = &mut *self.ctx;
        let d = ctx.engine.step(&mut ctx.rng)?;
        let attempt = match transport.attempt(d.arm, d.batch_size) {
            Ok(a) => a,
            Err(e) => {
                ctx.engine.abandon_pending();
                warn!(
                    arm = d.arm,
                    batch_size = d.batch_size,
                    error = %e,
                    "attempt failed, stopping"
                );
                return Err(e.into());
            }
        };
        let obs = ctx.engine.observe(d.arm, d.batch_size, attempt.success)?;
        ctx.totals.record(&obs);
        ctx.history.push(obs);

        if attempt.remaining == Some(0) {
            return Ok(StepOutcome::Stopped(StopReason::CollaboratorExhausted));
        }
        Ok(StepOutcome::Applied(obs))
    }

    /// Drive steps until the budget, the collaborator, or the caller stops the session.
    pub fn run<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<SessionReport, Error> {
        info!(
            arms = self.ctx.engine.n_arms(),
            budget = self.ctx.engine.remaining_budget(),
            "session started"
        );
        loop {
            if let StepOutcome::Stopped(stop) = self.step_once(transport)? {
                let totals = self.ctx.totals;
                info!(
                    ?stop,
                    sent = totals.sent,
                    succeeded = totals.succeeded,
                    rate = totals.success_rate(),
                    "session finished"
                );
                return Ok(SessionReport { stop, totals });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArmPolicy, CyclicTrend, EngineConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ctx(budget: u64) -> SessionContext<StdRng> {
        let trends = [
            CyclicTrend::from_probabilities(vec![0.2, 0.8], 2).unwrap(),
            CyclicTrend::from_probabilities(vec![0.5], 1).unwrap(),
        ];
        let cfg = EngineConfig::uniform(2, ArmPolicy::default()).with_budget(budget);
        SessionContext::new(DecisionEngine::new(&trends, cfg).unwrap(), StdRng::seed_from_u64(0))
    }

    #[test]
    fn runs_until_budget_is_spent() {
        let mut c = ctx(20);
        let mut transport =
            |_arm: ArmId, _n: u64| -> Result<Attempt, TransportError> { Ok(Attempt::new(true)) };
        let report = SessionLoop::new(&mut c).run(&mut transport).unwrap();
        assert_eq!(report.stop, StopReason::BudgetExhausted);
        assert_eq!(report.totals.sent, 20);
        assert_eq!(report.totals.succeeded, 20);
        assert_eq!(c.history.len() as u64, report.totals.attempts);
    }

    #[test]
    fn transport_failure_preserves_state() {
        let mut c = ctx(100);
        let mut calls = 0;
        let mut transport = |_arm: ArmId, _n: u64| -> Result<Attempt, TransportError> {
            calls += 1;
            if calls > 3 {
                Err(TransportError::new("timeout"))
            } else {
                Ok(Attempt::new(false))
            }
        };
        let err = SessionLoop::new(&mut c).run(&mut transport).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(c.totals.attempts, 3);
        assert_eq!(c.history.len(), 3);
        assert!(!c.engine.has_pending());
        // Still usable afterwards.
        assert!(c.engine.step(&mut c.rng).is_ok());
    }

    #[test]
    fn collaborator_exhaustion_stops() {
        let mut c = ctx(100);
        let mut left = 5u64;
        let mut transport = |_arm: ArmId, n: u64| -> Result<Attempt, TransportError> {
            left = left.saturating_sub(n);
            Ok(Attempt {
                success: true,
                remaining: Some(left),
            })
        };
        let report = SessionLoop::new(&mut c).run(&mut transport).unwrap();
        assert_eq!(report.stop, StopReason::CollaboratorExhausted);
        assert!(report.totals.sent >= 5);
    }

    #[test]
    fn cancellation_is_checked_between_steps() {
        let mut c = ctx(100);
        let cancel = c.cancel_handle();
        let mut n = 0;
        let mut transport = |_arm: ArmId, _b: u64| -> Result<Attempt, TransportError> {
            n += 1;
            if n == 2 {
                cancel.store(true, Ordering::SeqCst);
            }
            Ok(Attempt::new(true))
        };
        let report = SessionLoop::new(&mut c).run(&mut transport).unwrap();
        assert_eq!(report.stop, StopReason::Cancelled);
        // The step that raised the flag was fully applied.
        assert_eq!(report.totals.attempts, 2);
    }

    #[test]
    fn snapshot_round_trips_beliefs() {
        let mut c = ctx(10);
        let mut transport =
            |arm: ArmId, _n: u64| -> Result<Attempt, TransportError> { Ok(Attempt::new(arm == 0)) };
        SessionLoop::new(&mut c).run(&mut transport).unwrap();
        let snap = c.snapshot();
        assert_eq!(snap.sent, 10);
        assert_eq!(snap.remaining_budget, 0);
        assert_eq!(snap.trips.iter().sum::<u64>(), c.totals.attempts);
        let restored = snap.to_beliefs().unwrap();
        assert_eq!(restored.as_slice(), c.engine.beliefs());
    }
}
