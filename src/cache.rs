use itertools::Itertools;

use crate::action::Index;
use crate::error::{GroupingError, Result};
use crate::fitness::Evaluator;
use crate::model::entity::Score;
use crate::model::group::Solution;

#[cfg(feature = "parallel")]
fn score_all(solutions: &[Solution], evaluator: &Evaluator, parallel: bool) -> Vec<Score> {
    use rayon::prelude::*;

    if parallel {
        solutions.par_iter().map(|solution| evaluator.evaluate(solution)).collect()
    } else {
        solutions.iter().map(|solution| evaluator.evaluate(solution)).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn score_all(solutions: &[Solution], evaluator: &Evaluator, _parallel: bool) -> Vec<Score> {
    solutions.iter().map(|solution| evaluator.evaluate(solution)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Replacement {
    Replaced { slot: Index, previous: Score },
    Rejected { worst: Score },
}

/// Candidate solutions with their fitness cached slot by slot.
///
/// `solutions[i]` is always scored by `fitness[i]`; the only writer after
/// construction is [`Population::offer`], which swaps both at once.
#[derive(Debug, Clone)]
pub struct Population {
    solutions: Vec<Solution>,
    fitness: Vec<Score>,
}

impl Population {
    /// Scores every solution. With the `parallel` feature and `parallel` set,
    /// members are scored on the rayon pool.
    pub fn evaluated(solutions: Vec<Solution>, evaluator: &Evaluator, parallel: bool) -> Population {
        let fitness = score_all(&solutions, evaluator, parallel);
        Population { solutions, fitness }
    }

    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    pub fn solutions(&self) -> &[Solution] {
        &self.solutions
    }

    pub fn fitness(&self) -> &[Score] {
        &self.fitness
    }

    /// Slot with the lowest fitness, earliest on ties.
    pub fn worst_index(&self) -> Option<Index> {
        self.fitness.iter().position_min_by(|a, b| a.total_cmp(b))
    }

    /// Slot with the highest fitness, earliest on ties.
    pub fn best_index(&self) -> Option<Index> {
        self.fitness.iter().position_min_by(|a, b| b.total_cmp(a))
    }

    pub fn best(&self) -> Option<(&Solution, Score)> {
        let index = self.best_index()?;
        Some((&self.solutions[index], self.fitness[index]))
    }

    pub fn into_best(mut self) -> Option<(Solution, Score)> {
        let index = self.best_index()?;
        Some((self.solutions.swap_remove(index), self.fitness[index]))
    }

    /// The two fittest solutions, earliest index first among equals. A
    /// single-member population yields that member twice.
    pub fn select_parents(&self) -> Result<(&Solution, &Solution)> {
        match self.solutions.len() {
            0 => Err(GroupingError::EmptyPopulation),
            1 => Ok((&self.solutions[0], &self.solutions[0])),
            _ => {
                let ranked = (0..self.len())
                    .sorted_by(|&a, &b| self.fitness[b].total_cmp(&self.fitness[a]))
                    .collect_vec();
                Ok((&self.solutions[ranked[0]], &self.solutions[ranked[1]]))
            }
        }
    }

    /// Steady-state replacement: the child takes the worst slot only if it
    /// is strictly fitter.
    pub fn offer(&mut self, child: Solution, fitness: Score) -> Result<Replacement> {
        let slot = self.worst_index().ok_or(GroupingError::EmptyPopulation)?;
        let worst = self.fitness[slot];
        if fitness > worst {
            self.solutions[slot] = child;
            self.fitness[slot] = fitness;
            Ok(Replacement::Replaced { slot, previous: worst })
        } else {
            Ok(Replacement::Rejected { worst })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::group::Group;

    fn tagged(tag: usize) -> Solution {
        Solution::new(vec![Group::new(vec![tag])])
    }

    fn population(fitness: &[Score]) -> Population {
        Population {
            solutions: (0..fitness.len()).map(tagged).collect(),
            fitness: fitness.to_vec(),
        }
    }

    #[test]
    fn parents_are_two_fittest_with_earliest_ties() {
        let population = population(&[1.0, 5.0, 3.0, 5.0]);
        let (first, second) = population.select_parents().unwrap();
        assert_eq!(first, &tagged(1));
        assert_eq!(second, &tagged(3));
    }

    #[test]
    fn single_member_is_both_parents() {
        let population = population(&[2.0]);
        let (first, second) = population.select_parents().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_population_cannot_select() {
        let population = population(&[]);
        assert_eq!(population.select_parents(), Err(GroupingError::EmptyPopulation));
        assert!(population.best().is_none());
    }

    #[test]
    fn offer_replaces_first_worst_only_when_strictly_better() {
        let mut population = population(&[4.0, 1.0, 1.0]);
        assert_eq!(
            population.offer(tagged(9), 1.0).unwrap(),
            Replacement::Rejected { worst: 1.0 }
        );
        assert_eq!(
            population.offer(tagged(9), 2.0).unwrap(),
            Replacement::Replaced { slot: 1, previous: 1.0 }
        );
        assert_eq!(population.fitness(), [4.0, 2.0, 1.0]);
        assert_eq!(population.solutions()[1], tagged(9));
    }

    #[test]
    fn best_prefers_earliest_maximum() {
        let population = population(&[3.0, 7.0, 7.0]);
        assert_eq!(population.best_index(), Some(1));
        assert_eq!(population.worst_index(), Some(0));
        let (solution, fitness) = population.into_best().unwrap();
        assert_eq!(solution, tagged(1));
        assert_eq!(fitness, 7.0);
    }
}
