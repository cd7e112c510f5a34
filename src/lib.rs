//! Preference-aware participant grouping.
//!
//! Splits a set of [`Participant`]s into a requested number of near-equal
//! groups. A preference graph seeds every candidate partition, then a
//! steady-state genetic search trades off score diversity inside groups
//! against how many participants end up with someone they asked for.
//!
//! Solutions hold indices into the participant slice they were built from;
//! use [`Solution::resolve`] or [`Solution::ids`] to map them back.

pub mod action;
pub mod cache;
pub mod error;
pub mod fitness;
pub mod genetic;
pub mod graph;
pub mod model;

use rand::rngs::SmallRng;
use rand::SeedableRng;

pub use error::{GroupingError, Result};
pub use fitness::{Dispersion, Evaluator};
pub use genetic::{Cancellation, Optimizer, Outcome, Params, StopReason};
pub use model::entity::{Criterion, Id, Participant, ScaleKind, Score};
pub use model::group::{Group, Solution};
pub use model::roster::Roster;

/// Builds one preference-seeded partition with a fresh random order.
pub fn build_initial_partition(participants: &[Participant], group_count: usize) -> Result<Solution> {
    let roster = Roster::new(participants)?;
    let mut rng = SmallRng::from_entropy();
    graph::build_partition(&roster, group_count, &mut rng)
}

/// Runs the optimizer with [`Params::default`] and returns the best partition found.
pub fn optimize_grouping(participants: &[Participant], group_count: usize) -> Result<Solution> {
    let outcome = Optimizer::new(Params::default())?.run(participants, group_count)?;
    Ok(outcome.solution)
}
