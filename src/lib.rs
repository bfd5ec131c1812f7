//! `cyclemux`: Thompson-sampling arm selection over learned cyclic success trends.
//!
//! Designed for "which channel next" problems where each arm's success probability is
//! not stationary but **periodic in the arm's own use count**: attempt `k` on an arm
//! lands at some phase of a repeating pattern. Historical observation runs reveal the
//! pattern, but every run starts at an unknown phase.
//!
//! **Learning (offline):**
//! - [`CycleDetector`]: dominant period from the autocorrelation of a reference run.
//! - [`RunAligner`]: circular shift that best correlates each run with the reference.
//! - [`TrendAverager`] / [`TrendBuilder`]: position-wise mean and spread over aligned
//!   runs, smoothed into a [`CyclicTrend`].
//! - [`locate_phase`]: where a live arm sits inside its trend, from a few probes.
//!
//! **Deciding (online):**
//! - [`PriorBuilder`]: per-position Beta priors whose strength reflects trust in the trend.
//! - [`DecisionEngine`]: per-position Thompson sampling with admissibility floors,
//!   priority weights, streak limits, periodic forced exploration and confidence-scaled
//!   batch sizes. Every [`Decision`] carries typed [`DecisionNote`]s.
//! - [`SessionLoop`]: sequential select → [`Transport::attempt`] → observe, with all
//!   state held in a caller-owned [`SessionContext`].
//!
//! **Goals:**
//! - **Deterministic given a seed**: all randomness flows through a caller-supplied `Rng`.
//! - **Never lock in**: admissibility relaxes rather than stalls, and diversity
//!   overrides guarantee other arms keep being visited.
//! - **Small K**: a handful of arms, trends of tens to hundreds of positions.
//!
//! **Non-goals:**
//! - No transport, credentials, retries or persistence: those belong to the caller.
//! - No concurrency inside a session; steps are strictly sequential.
//!
//! # Quick start
//!
//! ```
//! use cyclemux::{ArmPolicy, CyclicTrend, DecisionEngine, EngineConfig};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let trends = [
//!     CyclicTrend::from_probabilities(vec![0.1, 0.9], 2).unwrap(),
//!     CyclicTrend::from_probabilities(vec![0.5], 1).unwrap(),
//! ];
//! let cfg = EngineConfig::uniform(2, ArmPolicy::default()).with_budget(10);
//! let mut engine = DecisionEngine::new(&trends, cfg).unwrap();
//! let mut rng = StdRng::seed_from_u64(7);
//!
//! while !engine.is_exhausted() {
//!     let d = engine.step(&mut rng).unwrap();
//!     engine.observe(d.arm, d.batch_size, true).unwrap();
//! }
//! assert_eq!(engine.remaining_budget(), 0);
//! ```

#![forbid(unsafe_code)]

/// Index of an arm: position in the trend list and in [`EngineConfig::arms`].
pub type ArmId = usize;

mod error;
pub use error::*;

mod run;
pub use run::*;

mod cycle;
pub use cycle::*;

mod align;
pub use align::*;

mod trend;
pub use trend::*;

mod belief;
pub use belief::*;

mod prior;
pub use prior::*;

mod policy;
pub use policy::*;

mod decision;
pub use decision::*;

mod engine;
pub use engine::*;

mod session;
pub use session::*;

mod sim;
pub use sim::*;
