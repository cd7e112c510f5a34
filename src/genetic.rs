use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::action::{Action, Position};
use crate::cache::{Population, Replacement};
use crate::error::{GroupingError, Result};
use crate::fitness::{Dispersion, Evaluator};
use crate::graph::build_partition_until;
use crate::model::entity::{Participant, Score};
use crate::model::group::Solution;
use crate::model::roster::Roster;

/// Tuning for one optimization run.
///
/// Defaults reproduce the historical optimizer: 180 generations, a 50%
/// mutation chance and one population slot per requested group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub generations: usize,
    pub mutation_rate: f64,
    /// `None` sizes the population to the requested group count.
    pub population_size: Option<usize>,
    /// `None` draws a fresh seed from the OS for every run.
    pub seed: Option<u64>,
    pub parallel_evaluation: bool,
    pub dispersion: Dispersion,
    /// Wall-clock budget, checked while the population is built and between
    /// generations.
    pub deadline: Option<Duration>,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            generations: 180,
            mutation_rate: 0.5,
            population_size: None,
            seed: None,
            parallel_evaluation: false,
            dispersion: Dispersion::FirstMember,
            deadline: None,
        }
    }
}

impl Params {
    pub fn generations(mut self, generations: usize) -> Self {
        self.generations = generations;
        self
    }

    pub fn mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate;
        self
    }

    pub fn population_size(mut self, size: usize) -> Self {
        self.population_size = Some(size);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn parallel_evaluation(mut self, enabled: bool) -> Self {
        self.parallel_evaluation = enabled;
        self
    }

    pub fn dispersion(mut self, dispersion: Dispersion) -> Self {
        self.dispersion = dispersion;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(GroupingError::InvalidArgument(format!(
                "mutation rate must lie in [0, 1], got {}",
                self.mutation_rate
            )));
        }
        if self.population_size == Some(0) {
            return Err(GroupingError::InvalidArgument(
                "population size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn population_for(&self, group_count: usize) -> usize {
        self.population_size.unwrap_or(group_count)
    }
}

/// Shared stop flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Cancellation {
        Cancellation::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// A single group leaves nothing to optimize.
    SingleGroup,
    Completed,
    Cancelled,
    DeadlineReached,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub solution: Solution,
    pub fitness: Score,
    pub generations: usize,
    pub stop: StopReason,
}

/// Crossover that keeps `parent1`'s grouping and places everyone it lacks,
/// first in `parent2`'s order and then by index, into the smallest group.
pub fn crossover(parent1: &Solution, parent2: &Solution, n_participants: usize) -> Result<Solution> {
    let mut child = parent1.clone();
    if child.groups.is_empty() {
        return Err(GroupingError::InvariantViolation(
            "crossover parent has no groups".to_string(),
        ));
    }
    let mut placed = vec![false; n_participants];
    for &member in child.groups.iter().flat_map(|group| group.members.iter()) {
        match placed.get_mut(member) {
            Some(slot) => *slot = true,
            None => {
                return Err(GroupingError::InvariantViolation(format!(
                    "participant index {member} is outside a roster of {n_participants}"
                )))
            }
        }
    }

    let candidates = parent2
        .groups
        .iter()
        .flat_map(|group| group.members.iter().copied())
        .chain(0..n_participants);
    for member in candidates {
        if placed.get(member).copied().unwrap_or(true) {
            continue;
        }
        let group_index = child
            .smallest_group()
            .ok_or_else(|| GroupingError::InvariantViolation("child has no groups".to_string()))?;
        child.act(Action::Insert { member, group_index })?;
        placed[member] = true;
    }

    child.check_partition(n_participants)?;
    Ok(child)
}

/// With probability `rate`, swaps one random member between two distinct
/// random groups. Returns whether a swap happened.
pub fn mutate<R: Rng + ?Sized>(solution: &mut Solution, rate: f64, rng: &mut R) -> Result<bool> {
    if rng.gen::<f64>() >= rate {
        return Ok(false);
    }
    let n_groups = solution.group_count();
    if n_groups < 2 {
        return Ok(false);
    }
    let first = rng.gen_range(0..n_groups);
    let mut second = rng.gen_range(0..n_groups - 1);
    if second >= first {
        second += 1;
    }
    let (len1, len2) = (solution.groups[first].len(), solution.groups[second].len());
    if len1 == 0 || len2 == 0 {
        return Ok(false);
    }
    let position1 = Position::new(first, rng.gen_range(0..len1));
    let position2 = Position::new(second, rng.gen_range(0..len2));
    solution.act(Action::Swap(position1, position2))?;
    Ok(true)
}

/// Steady-state genetic search over preference-seeded partitions.
#[derive(Debug, Clone)]
pub struct Optimizer {
    params: Params,
}

impl Optimizer {
    pub fn new(params: Params) -> Result<Optimizer> {
        params.validate()?;
        Ok(Optimizer { params })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn run(&self, participants: &[Participant], group_count: usize) -> Result<Outcome> {
        self.run_until(participants, group_count, &Cancellation::new())
    }

    /// Runs until the generation budget is spent, `cancel` is raised or the
    /// deadline passes, whichever comes first.
    pub fn run_until(
        &self,
        participants: &[Participant],
        group_count: usize,
        cancel: &Cancellation,
    ) -> Result<Outcome> {
        let mut rng = match self.params.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        self.run_with_rng(participants, group_count, cancel, &mut rng)
    }

    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        participants: &[Participant],
        group_count: usize,
        cancel: &Cancellation,
        rng: &mut R,
    ) -> Result<Outcome> {
        if group_count == 0 {
            return Err(GroupingError::InvalidArgument(
                "group count must be positive".to_string(),
            ));
        }
        let started = Instant::now();
        let roster = Roster::new(participants)?;
        let evaluator = Evaluator::new(&roster).with_dispersion(self.params.dispersion);
        let population_size = self.params.population_for(group_count);
        info!(
            participants = roster.len(),
            group_count,
            population_size,
            generations = self.params.generations,
            "starting grouping optimization"
        );

        let interrupted = || self.interrupted(cancel, started).is_some();
        let mut solutions = Vec::new();
        while solutions.len() < population_size {
            // the first slot is always filled; a stopped build falls back quickly
            if !solutions.is_empty() && interrupted() {
                break;
            }
            solutions.push(build_partition_until(&roster, group_count, &mut *rng, interrupted)?);
        }
        let mut population =
            Population::evaluated(solutions, &evaluator, self.params.parallel_evaluation);

        if let Some(stop) = self.interrupted(cancel, started) {
            warn!(built = population.len(), population_size, ?stop, "stopped while building population");
            let (solution, fitness) = population.into_best().ok_or(GroupingError::EmptyPopulation)?;
            return Ok(Outcome { solution, fitness, generations: 0, stop });
        }

        if group_count == 1 {
            let (solution, fitness) = population
                .solutions()
                .first()
                .cloned()
                .zip(population.fitness().first().copied())
                .ok_or(GroupingError::EmptyPopulation)?;
            debug!(fitness, "single group requested, skipping search");
            return Ok(Outcome { solution, fitness, generations: 0, stop: StopReason::SingleGroup });
        }

        let mut generations = 0;
        let mut stop = StopReason::Completed;
        while generations < self.params.generations {
            if let Some(reason) = self.interrupted(cancel, started) {
                warn!(generations, elapsed = ?started.elapsed(), ?reason, "grouping optimization stopped early");
                stop = reason;
                break;
            }
            match self.step(&mut population, &evaluator, roster.len(), rng)? {
                Replacement::Replaced { slot, previous } => {
                    trace!(generation = generations, slot, previous, "child replaced worst solution")
                }
                Replacement::Rejected { worst } => {
                    trace!(generation = generations, worst, "child rejected")
                }
            }
            generations += 1;
        }

        let (solution, fitness) = population.into_best().ok_or(GroupingError::EmptyPopulation)?;
        info!(fitness, generations, ?stop, elapsed = ?started.elapsed(), "grouping optimization finished");
        Ok(Outcome { solution, fitness, generations, stop })
    }

    fn interrupted(&self, cancel: &Cancellation, started: Instant) -> Option<StopReason> {
        if cancel.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if self.params.deadline.is_some_and(|deadline| started.elapsed() >= deadline) {
            Some(StopReason::DeadlineReached)
        } else {
            None
        }
    }

    /// One select, crossover, mutate and replace round.
    fn step<R: Rng + ?Sized>(
        &self,
        population: &mut Population,
        evaluator: &Evaluator,
        n_participants: usize,
        rng: &mut R,
    ) -> Result<Replacement> {
        let (parent1, parent2) = population.select_parents()?;
        let mut child = crossover(parent1, parent2, n_participants)?;
        mutate(&mut child, self.params.mutation_rate, rng)?;
        child.check_partition(n_participants)?;
        let fitness = evaluator.evaluate(&child);
        population.offer(child, fitness)
    }
}
