//! Thompson-sampling decision engine with diversity enforcement.
//!
//! Each [`DecisionEngine::step`]:
//! 1. scores every arm at its current trend position: posterior mean, and one
//!    posterior sample scaled by the arm's priority,
//! 2. keeps arms whose mean meets their admissibility floor; if none do, all arms
//!    are eligible for this step (strict pass, then relaxed pass),
//! 3. ranks eligible arms by score and takes the top one as the tentative choice,
//! 4. overrides it with the best eligible *other* arm when either the periodic
//!    exploration clock ran out or the tentative arm's streak hit its limit,
//! 5. sizes the batch from the chosen arm's posterior mean, clamped to the budget,
//! 6. updates streak bookkeeping.
//!
//! The caller then reports the outcome through [`DecisionEngine::observe`] before the
//! next `step`. Decisions and observations strictly alternate.

use rand::Rng;
use tracing::{debug, warn};

use crate::{
    ArmId, BeliefState, CandidateDebug, CyclicTrend, Decision, DecisionNote, EngineConfig,
    ForceReason, Observation, PreconditionError, PriorBuilder,
};

/// Streak and position bookkeeping, owned by one session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectionState {
    /// Per-arm position counter; the trend index is this modulo the trend length.
    positions: Vec<u64>,
    /// Per-arm number of applied observations.
    trips: Vec<u64>,
    streak_arm: Option<ArmId>,
    streak_len: u64,
    /// Decision index at which the last diversity override fired.
    last_forced_explore: u64,
    decisions: u64,
    observations: u64,
}

impl SelectionState {
    fn new(n_arms: usize) -> Self {
        Self {
            positions: vec![0; n_arms],
            trips: vec![0; n_arms],
            streak_arm: None,
            streak_len: 0,
            last_forced_explore: 0,
            decisions: 0,
            observations: 0,
        }
    }

    pub fn position_counter(&self, arm: ArmId) -> Option<u64> {
        self.positions.get(arm).copied()
    }

    pub fn trips(&self) -> &[u64] {
        &self.trips
    }

    /// Arm currently on a selection streak, and its length.
    pub fn streak(&self) -> Option<(ArmId, u64)> {
        self.streak_arm.map(|a| (a, self.streak_len))
    }

    pub fn last_forced_explore(&self) -> u64 {
        self.last_forced_explore
    }

    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            streak_arm: self.streak_arm,
            streak_len: self.streak_len,
            last_forced_explore: self.last_forced_explore,
            decisions: self.decisions,
        }
    }

    fn restore(&mut self, c: Checkpoint) {
        self.streak_arm = c.streak_arm;
        self.streak_len = c.streak_len;
        self.last_forced_explore = c.last_forced_explore;
        self.decisions = c.decisions;
    }

    fn record_choice(&mut self, arm: ArmId) {
        if self.streak_arm == Some(arm) {
            self.streak_len = self.streak_len.saturating_add(1);
        } else {
            self.streak_arm = Some(arm);
            self.streak_len = 1;
        }
    }
}

/// Selection bookkeeping that `step` touches before the outcome is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Checkpoint {
    streak_arm: Option<ArmId>,
    streak_len: u64,
    last_forced_explore: u64,
    decisions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    arm: ArmId,
    batch_size: u64,
    position: usize,
    /// State before the decision, restored if it is abandoned.
    before: Checkpoint,
}

/// Stateful selection engine over a fixed set of arms.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    cfg: EngineConfig,
    beliefs: Vec<BeliefState>,
    selection: SelectionState,
    remaining: u64,
    pending: Option<Pending>,
}

impl DecisionEngine {
    /// Build an engine whose beliefs are seeded from `trends` (one per arm, in arm order).
    pub fn new(trends: &[CyclicTrend], cfg: EngineConfig) -> Result<Self, PreconditionError> {
        if trends.is_empty() {
            return Err(PreconditionError::NoArms);
        }
        let prior = PriorBuilder::new(cfg.prior_strength);
        let beliefs = trends.iter().map(|t| prior.build(t)).collect();
        Self::from_beliefs(beliefs, cfg)
    }

    /// Build an engine from existing beliefs (e.g. restored from a snapshot).
    pub fn from_beliefs(
        beliefs: Vec<BeliefState>,
        cfg: EngineConfig,
    ) -> Result<Self, PreconditionError> {
        cfg.validate()?;
        if beliefs.is_empty() {
            return Err(PreconditionError::NoArms);
        }
        if beliefs.len() != cfg.arms.len() {
            return Err(PreconditionError::PolicyCountMismatch {
                trends: beliefs.len(),
                policies: cfg.arms.len(),
            });
        }
        Ok(Self {
            selection: SelectionState::new(beliefs.len()),
            remaining: cfg.budget,
            beliefs,
            cfg,
            pending: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn n_arms(&self) -> usize {
        self.beliefs.len()
    }

    pub fn beliefs(&self) -> &[BeliefState] {
        &self.beliefs
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Budget left, in batch units.
    pub fn remaining_budget(&self) -> u64 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Whether a decision is waiting for its observation.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Trend position `arm` is currently at.
    pub fn position(&self, arm: ArmId) -> Option<usize> {
        let counter = self.selection.positions.get(arm)?;
        let len = self.beliefs[arm].len() as u64;
        Some((counter % len) as usize)
    }

    /// Current posterior mean of `arm` at its position.
    pub fn posterior_mean(&self, arm: ArmId) -> Option<f64> {
        let pos = self.position(arm)?;
        Some(self.beliefs[arm].posterior_mean(pos))
    }

    /// Place `arm` at a known trend position (e.g. from [`crate::locate_phase`]).
    pub fn seed_position(&mut self, arm: ArmId, position: usize) -> Result<(), PreconditionError> {
        let slot = self
            .selection
            .positions
            .get_mut(arm)
            .ok_or(PreconditionError::UnknownArm(arm))?;
        *slot = position as u64;
        Ok(())
    }

    /// Choose the next arm and batch size.
    ///
    /// Randomness comes only from `rng`, so a seeded generator reproduces choices exactly.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Decision, PreconditionError> {
        if self.pending.is_some() {
            return Err(PreconditionError::ObservationPending);
        }
        if self.remaining == 0 {
            return Err(PreconditionError::BudgetExhausted);
        }

        let before = self.selection.checkpoint();
        let mut notes = Vec::new();
        let candidates: Vec<CandidateDebug> = (0..self.beliefs.len())
            .map(|arm| {
                let position = self.position(arm).unwrap_or(0);
                let belief = &self.beliefs[arm];
                let policy = &self.cfg.arms[arm];
                let posterior_mean = belief.posterior_mean(position);
                CandidateDebug {
                    arm,
                    position,
                    posterior_mean,
                    score: belief.sample(position, rng) * policy.priority,
                    admissible: posterior_mean >= policy.min_expected,
                }
            })
            .collect();

        // Strict pass, then relaxed pass.
        let mut ranked: Vec<&CandidateDebug> = candidates.iter().filter(|c| c.admissible).collect();
        if ranked.is_empty() {
            debug!(step = self.selection.decisions, "no admissible arm, relaxing floors");
            notes.push(DecisionNote::AdmissibilityRelaxed);
            ranked = candidates.iter().collect();
        }
        // Stable sort: equal scores keep arm order.
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        let tentative = ranked[0].arm;

        let mut chosen = tentative;
        if let Some(reason) = self.force_reason(tentative) {
            let streaking = self.selection.streak_arm;
            match ranked.iter().find(|c| Some(c.arm) != streaking) {
                Some(alt) => {
                    chosen = alt.arm;
                    notes.push(DecisionNote::ForcedSwitch {
                        reason,
                        from: streaking,
                        tentative,
                    });
                    debug!(?reason, from = ?streaking, to = chosen, "forced diversity switch");
                }
                None => {
                    notes.push(DecisionNote::ForcedSwitchNoAlternative {
                        reason,
                        arm: tentative,
                    });
                    warn!(?reason, arm = tentative, "diversity override found no alternative");
                }
            }
            self.selection.last_forced_explore = self.selection.decisions;
        }

        let pick = candidates[chosen];
        let requested = self
            .cfg
            .batch_sizes
            .for_mean(pick.posterior_mean, &self.cfg.arms[chosen]);
        let batch_size = requested.min(self.remaining);
        if batch_size < requested {
            notes.push(DecisionNote::BatchClamped {
                requested,
                granted: batch_size,
            });
        }

        self.selection.record_choice(chosen);
        let step = self.selection.decisions;
        self.selection.decisions += 1;
        self.pending = Some(Pending {
            arm: chosen,
            batch_size,
            position: pick.position,
            before,
        });

        debug!(
            step,
            arm = chosen,
            batch_size,
            position = pick.position,
            mean = pick.posterior_mean,
            "decision"
        );
        Ok(Decision {
            arm: chosen,
            batch_size,
            position: pick.position,
            posterior_mean: pick.posterior_mean,
            step,
            candidates,
            notes,
        })
    }

    fn force_reason(&self, tentative: ArmId) -> Option<ForceReason> {
        let s = &self.selection;
        let period = self.cfg.forced_explore_period;
        if period > 0 && s.decisions.saturating_sub(s.last_forced_explore) >= period {
            return Some(ForceReason::Periodic);
        }
        let limit = self.cfg.arms[tentative].max_consecutive;
        if s.streak_arm == Some(tentative) && s.streak_len >= limit {
            return Some(ForceReason::StreakLimit);
        }
        None
    }

    /// Apply the outcome of the pending decision.
    ///
    /// `arm` and `batch_size` must match what [`step`](Self::step) returned.
    pub fn observe(
        &mut self,
        arm: ArmId,
        batch_size: u64,
        success: bool,
    ) -> Result<Observation, PreconditionError> {
        let pending = self.pending.ok_or(PreconditionError::NoPendingDecision)?;
        if pending.arm != arm || pending.batch_size != batch_size {
            return Err(PreconditionError::ObservationMismatch {
                arm,
                batch_size,
                expected_arm: pending.arm,
                expected_batch: pending.batch_size,
            });
        }

        self.beliefs[arm].update(pending.position, success, batch_size as f64);
        let s = &mut self.selection;
        s.positions[arm] = s.positions[arm].saturating_add(1);
        s.trips[arm] = s.trips[arm].saturating_add(1);
        s.observations = s.observations.saturating_add(1);
        self.remaining = self.remaining.saturating_sub(batch_size);
        self.pending = None;

        Ok(Observation {
            arm,
            position: pending.position,
            batch_size,
            success,
        })
    }

    /// Drop a pending decision whose attempt never happened (e.g. transport failure).
    ///
    /// Beliefs, positions and budget are untouched. Streak, decision count and the
    /// override clock go back to where they were before the dropped `step`.
    pub fn abandon_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(p) => {
                self.selection.restore(p.before);
                true
            }
            None => false,
        }
    }
}
