//! Search-based test generation core.
//!
//! A search combines three things: a [`ChromosomeGenerator`] producing
//! candidate encodings, a set of [`FitnessFunction`]s (one per coverage goal)
//! and a [`SearchAlgorithm`] that evolves candidates while an
//! [`Archive`](archive::Archive) keeps the best chromosome per goal.
//! Chromosomes are shared as `Rc<C>`; two chromosomes are the same solution
//! only if they are the same allocation.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

pub mod archive;
pub mod bitstring;
pub mod builder;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod integerlist;
pub mod neat;
pub mod operators;
pub mod position;
pub mod randomness;
pub mod statistics;
pub mod stopping;
pub mod testcase;

pub mod algorithms {
    pub mod common;
    pub mod mio;
    pub mod mosa;
    pub mod neat;
    pub mod one_plus_one;
    pub mod random_search;
    pub mod simple;
}

pub use cache::FitnessCache;
pub use context::SearchContext;
pub use error::{Result, SearchError};
pub use randomness::Randomness;

/// Shared handle to a fitness function. Its allocation is its identity.
pub type FitnessRef<C> = Rc<dyn FitnessFunction<C>>;

/// Goal key → fitness function, iterated in key order.
pub type FitnessMap<C> = BTreeMap<usize, FitnessRef<C>>;

/// An encoded candidate solution.
///
/// Genes never change after construction: `mutate` and `crossover` always
/// build new chromosomes. Fitness values are memoized per fitness function in
/// [`FitnessCache`] and only invalidated on request.
pub trait Chromosome: Clone + 'static {
    /// Number of genes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutate(&self, rng: &mut Randomness) -> Self;

    fn crossover(&self, other: &Self, rng: &mut Randomness) -> (Self, Self);

    fn fitness_cache(&self) -> &FitnessCache;

    /// Structural gene equality, used to keep duplicate encodings out of
    /// bounded archives.
    fn same_genes(&self, other: &Self) -> bool;

    /// Memoized fitness for `function`.
    fn get_fitness(&self, function: &FitnessRef<Self>) -> Result<f64> {
        self.fitness_cache()
            .get_or_compute(function, || function.get_fitness(self))
    }

    fn delete_cache_entry(&self, function: &FitnessRef<Self>) {
        self.fitness_cache().remove(function);
    }

    fn flush_fitness_cache(&self) {
        self.fitness_cache().clear();
    }

    /// Goal a single-objective search currently steers this chromosome
    /// towards. `None` for chromosomes that do not track one.
    fn target_fitness(&self) -> Option<&FitnessRef<Self>> {
        None
    }

    fn set_target_fitness(&mut self, _target: Option<FitnessRef<Self>>) {}
}

/// A chromosome whose genes form a flat list.
pub trait ListChromosome: Chromosome {
    type Gene: Clone + PartialEq;

    fn genes(&self) -> &[Self::Gene];

    /// A fresh chromosome with the same operators and the given genes.
    fn clone_with(&self, genes: Vec<Self::Gene>) -> Self;
}

/// Maps a chromosome to a scalar for one goal.
pub trait FitnessFunction<C> {
    /// Computes the fitness without consulting any cache.
    fn get_fitness(&self, chromosome: &C) -> Result<f64>;

    /// Positive when `value1` is better than `value2`.
    fn compare(&self, value1: f64, value2: f64) -> f64;

    fn is_optimal(&self, value: f64) -> bool;

    fn is_covered(&self, chromosome: &C) -> Result<bool> {
        Ok(self.is_optimal(self.get_fitness(chromosome)?))
    }

    fn describe(&self) -> String {
        String::from("fitness function")
    }

    /// Whether the goal is reached by the program's start event alone.
    fn is_start_event_goal(&self) -> bool {
        false
    }
}

/// Applied by chromosomes to derive a mutant.
pub trait Mutation<C> {
    fn apply(&self, chromosome: &C, rng: &mut Randomness) -> C;
}

/// Applied by chromosomes to derive two children.
pub trait Crossover<C> {
    fn apply(&self, parent1: &C, parent2: &C, rng: &mut Randomness) -> (C, C);
}

/// Produces random initial chromosomes.
pub trait ChromosomeGenerator<C> {
    fn get(&mut self, rng: &mut Randomness) -> C;
}

/// Runs whatever side effects a chromosome needs before fitness can be
/// read from it (for test chromosomes: executing the program under test).
pub trait Evaluator<C> {
    fn evaluate(&mut self, chromosome: &mut C, ctx: &mut SearchContext) -> Result<()>;
}

/// Lets an evaluator be shared with operators that also drive the program,
/// such as local search.
impl<C, E: Evaluator<C>> Evaluator<C> for Rc<RefCell<E>> {
    fn evaluate(&mut self, chromosome: &mut C, ctx: &mut SearchContext) -> Result<()> {
        self.borrow_mut().evaluate(chromosome, ctx)
    }
}

/// Evaluator for chromosomes whose fitness is a pure function of the genes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpEvaluator;

impl<C> Evaluator<C> for NoOpEvaluator {
    fn evaluate(&mut self, _chromosome: &mut C, ctx: &mut SearchContext) -> Result<()> {
        ctx.statistics.number_fitness_evaluations += 1;
        Ok(())
    }
}

/// Read-only view of a running search, consumed by stopping conditions and
/// local search operators.
pub trait SearchState<C> {
    fn iterations(&self) -> usize;

    fn start_time(&self) -> Instant;

    /// Best individuals found so far.
    fn current_solution(&self) -> &[Rc<C>];

    fn fitness_functions(&self) -> &FitnessMap<C>;
}

/// A search loop over chromosomes of type `C`.
pub trait SearchAlgorithm<C>: SearchState<C> {
    /// Runs the search until its stopping condition holds and returns the
    /// archive: goal key → covering chromosome.
    fn find_solution(&mut self, ctx: &mut SearchContext) -> Result<BTreeMap<usize, Rc<C>>>;

    fn name(&self) -> &'static str;
}

/// Orders floats ascending with NaN below every number.
pub(crate) fn cmp_f64_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}
