use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::model::entity::Score;
use crate::model::group::{Group, Solution};
use crate::model::roster::Roster;

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Sample standard deviation (N - 1 denominator), 0 for fewer than two samples.
pub fn sample_std_dev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let m = mean(samples);
    let variance = samples.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (samples.len() - 1) as f64;
    variance.sqrt()
}

/// What each unordered pair of group members contributes to the group's
/// dispersion samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispersion {
    /// The score of the pair's earlier member, so member `i` of `k` is
    /// sampled `k - 1 - i` times. Reproduces historical fitness values.
    #[default]
    FirstMember,
    /// The absolute score difference of the pair.
    PairDifference,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessBreakdown {
    pub mean_diversity: Score,
    pub diversity_spread: Score,
    pub preference_score: usize,
}

impl FitnessBreakdown {
    pub fn total(&self) -> Score {
        self.mean_diversity + self.preference_score as Score - self.diversity_spread
    }
}

/// Scores solutions over one roster. Higher is better.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'r, 'a> {
    roster: &'r Roster<'a>,
    dispersion: Dispersion,
}

impl<'r, 'a> Evaluator<'r, 'a> {
    pub fn new(roster: &'r Roster<'a>) -> Evaluator<'r, 'a> {
        Evaluator { roster, dispersion: Dispersion::default() }
    }

    pub fn with_dispersion(mut self, dispersion: Dispersion) -> Evaluator<'r, 'a> {
        self.dispersion = dispersion;
        self
    }

    pub fn dispersion_samples(&self, group: &Group) -> Vec<Score> {
        let scores = self.roster.scores();
        group
            .members
            .iter()
            .tuple_combinations()
            .map(|(&first, &second)| match self.dispersion {
                Dispersion::FirstMember => scores[first],
                Dispersion::PairDifference => (scores[first] - scores[second]).abs(),
            })
            .collect()
    }

    pub fn diversity(&self, group: &Group) -> Score {
        sample_std_dev(&self.dispersion_samples(group))
    }

    /// Number of participants sharing a group with at least one person they asked for.
    pub fn preference_score(&self, solution: &Solution) -> usize {
        let membership = solution.membership(self.roster.len());
        solution
            .groups
            .iter()
            .enumerate()
            .map(|(group_index, group)| {
                group
                    .members
                    .iter()
                    .filter(|&&member| {
                        self.roster
                            .preferences(member)
                            .iter()
                            .any(|&wanted| membership[wanted] == Some(group_index))
                    })
                    .count()
            })
            .sum()
    }

    pub fn breakdown(&self, solution: &Solution) -> FitnessBreakdown {
        let diversities: Vec<Score> = solution.groups.iter().map(|group| self.diversity(group)).collect();
        FitnessBreakdown {
            mean_diversity: mean(&diversities),
            diversity_spread: sample_std_dev(&diversities),
            preference_score: self.preference_score(solution),
        }
    }

    pub fn evaluate(&self, solution: &Solution) -> Score {
        self.breakdown(solution).total()
    }
}
