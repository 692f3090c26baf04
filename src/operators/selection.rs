use std::rc::Rc;

use crate::{Chromosome, FitnessRef, Randomness, Result, SearchError};

/// Picks a parent from a population.
pub trait Selection<C> {
    /// `population` is ordered ascending by quality where the operator
    /// needs an order. Operators that compare fitness values use
    /// `fitness_function`.
    fn apply(
        &self,
        population: &[Rc<C>],
        fitness_function: Option<&FitnessRef<C>>,
        rng: &mut Randomness,
    ) -> Result<Rc<C>>;
}

fn empty_population() -> SearchError {
    SearchError::InvalidArgument(String::from("cannot select from an empty population"))
}

/// Linear ranking with selection pressure `2N / (N + 1)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RankSelection;

impl RankSelection {
    /// Cumulative selection probabilities for a population of `n`.
    pub fn upper_borders(n: usize) -> Vec<f64> {
        if n == 1 {
            return vec![1.0];
        }
        let nf = n as f64;
        let c = 2.0 * nf / (nf + 1.0);
        let mut sum = 0.0;
        (1..=n)
            .map(|i| {
                sum += (1.0 / nf) * (2.0 - c + 2.0 * (c - 1.0) * (i - 1) as f64 / (nf - 1.0));
                sum
            })
            .collect()
    }
}

impl<C> Selection<C> for RankSelection {
    fn apply(
        &self,
        population: &[Rc<C>],
        _fitness_function: Option<&FitnessRef<C>>,
        rng: &mut Randomness,
    ) -> Result<Rc<C>> {
        let last = population.last().ok_or_else(empty_population)?;
        let borders = Self::upper_borders(population.len());
        let random = rng.next_double();
        let selected = population
            .iter()
            .zip(&borders)
            .find(|&(_, &border)| random < border)
            .map_or(last, |(c, _)| c);
        Ok(Rc::clone(selected))
    }
}

/// Best of `size` random draws; ties go to the shorter chromosome.
#[derive(Clone, Copy, Debug)]
pub struct TournamentSelection {
    size: usize,
}

impl TournamentSelection {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl<C: Chromosome> Selection<C> for TournamentSelection {
    fn apply(
        &self,
        population: &[Rc<C>],
        fitness_function: Option<&FitnessRef<C>>,
        rng: &mut Randomness,
    ) -> Result<Rc<C>> {
        let fitness_function =
            fitness_function.ok_or(SearchError::MissingComponent("tournament fitness function"))?;
        let mut winner = rng.pick(population).ok_or_else(empty_population)?;
        let mut best = winner.get_fitness(fitness_function)?;
        for _ in 0..self.size {
            let Some(candidate) = rng.pick(population) else {
                break;
            };
            let fitness = candidate.get_fitness(fitness_function)?;
            let cmp = fitness_function.compare(fitness, best);
            if cmp > 0.0 || (cmp == 0.0 && candidate.len() < winner.len()) {
                best = fitness;
                winner = candidate;
            }
        }
        Ok(Rc::clone(winner))
    }
}
