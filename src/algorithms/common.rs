//! Plumbing shared by the chromosome-level search algorithms.

use std::mem;
use std::rc::Rc;
use std::time::Instant;

use log::{debug, warn};

use crate::archive::Archive;
use crate::operators::LocalSearch;
use crate::stopping::StoppingCondition;
use crate::{
    Chromosome, ChromosomeGenerator, Evaluator, FitnessMap, FitnessRef, Result, SearchContext,
    SearchState,
};

/// The pluggable parts every algorithm is assembled from.
pub struct SearchComponents<C> {
    pub generator: Box<dyn ChromosomeGenerator<C>>,
    pub evaluator: Box<dyn Evaluator<C>>,
    pub stopping_condition: Box<dyn StoppingCondition<C>>,
    pub fitness_functions: FitnessMap<C>,
    pub local_search: Vec<Box<dyn LocalSearch<C>>>,
}

impl<C> SearchComponents<C> {
    pub fn new(
        generator: Box<dyn ChromosomeGenerator<C>>,
        evaluator: Box<dyn Evaluator<C>>,
        stopping_condition: Box<dyn StoppingCondition<C>>,
        fitness_functions: FitnessMap<C>,
    ) -> Self {
        Self {
            generator,
            evaluator,
            stopping_condition,
            fitness_functions,
            local_search: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_local_search(mut self, operator: Box<dyn LocalSearch<C>>) -> Self {
        self.local_search.push(operator);
        self
    }
}

/// State of one `find_solution` run plus the components driving it.
///
/// Algorithms embed a `SearchRun` and delegate [`SearchState`] to it, so
/// stopping conditions always observe the same iteration counter and
/// solution set.
pub struct SearchRun<C> {
    components: SearchComponents<C>,
    pub(crate) archive: Archive<C>,
    pub(crate) best_individuals: Vec<Rc<C>>,
    pub(crate) iterations: usize,
    start_time: Instant,
    /// Whether the archive's distinct entries form the current solution.
    best_from_archive: bool,
}

impl<C: Chromosome> SearchRun<C> {
    pub fn new(components: SearchComponents<C>) -> Self {
        Self {
            components,
            archive: Archive::new(),
            best_individuals: Vec::new(),
            iterations: 0,
            start_time: Instant::now(),
            best_from_archive: true,
        }
    }

    /// Leaves `best_individuals` to the algorithm instead of the archive.
    #[must_use]
    pub fn with_own_solution(mut self) -> Self {
        self.best_from_archive = false;
        self
    }

    /// Resets counters, archive and statistics for a fresh run.
    pub fn begin(&mut self, ctx: &mut SearchContext) {
        self.iterations = 0;
        self.start_time = Instant::now();
        self.archive.clear();
        self.best_individuals.clear();
        ctx.begin_search(self.components.fitness_functions.len());
    }

    pub fn is_finished(&self) -> Result<bool> {
        self.components.stopping_condition.is_finished(self)
    }

    pub fn progress(&self) -> Result<f64> {
        self.components.stopping_condition.progress(self)
    }

    pub fn generate(&mut self, ctx: &mut SearchContext) -> C {
        self.components.generator.get(&mut ctx.rng)
    }

    /// Runs the evaluator; a chromosome that fails to evaluate is dropped.
    pub fn evaluate(&mut self, mut chromosome: C, ctx: &mut SearchContext) -> Option<Rc<C>> {
        match self.components.evaluator.evaluate(&mut chromosome, ctx) {
            Ok(()) => Some(Rc::new(chromosome)),
            Err(e) => {
                warn!("dropping chromosome that failed to evaluate: {e}");
                None
            }
        }
    }

    /// Evaluates and archives each chromosome until the budget runs out;
    /// returns the evaluated prefix.
    pub fn evaluate_population(
        &mut self,
        population: Vec<C>,
        ctx: &mut SearchContext,
    ) -> Result<Vec<Rc<C>>> {
        let mut evaluated = Vec::with_capacity(population.len());
        for chromosome in population {
            if self.is_finished()? {
                break;
            }
            if let Some(chromosome) = self.evaluate(chromosome, ctx) {
                if self.update_archive(&chromosome, ctx) {
                    evaluated.push(chromosome);
                }
            }
        }
        Ok(evaluated)
    }

    /// Offers `chromosome` to the archive. Returns `false` if its fitness
    /// could not be computed.
    pub fn update_archive(&mut self, chromosome: &Rc<C>, ctx: &mut SearchContext) -> bool {
        match self
            .archive
            .update(chromosome, &self.components.fitness_functions, &mut ctx.statistics)
        {
            Ok(_) => {
                if self.best_from_archive {
                    self.best_individuals = self.archive.best_individuals().to_vec();
                }
                true
            }
            Err(e) => {
                warn!("dropping chromosome without fitness: {e}");
                false
            }
        }
    }

    /// Records suite size and iteration, and latches full coverage with
    /// `created_tests` as the number of tests it took.
    pub fn update_statistics(&mut self, created_tests: usize, ctx: &mut SearchContext) {
        ctx.statistics.best_test_suite_size = self.best_individuals.len();
        ctx.statistics.increment_iteration_count();
        self.latch_full_coverage(created_tests, ctx);
    }

    /// Latches full coverage once the archive covers every goal.
    pub fn latch_full_coverage(&mut self, created_tests: usize, ctx: &mut SearchContext) -> bool {
        self.archive
            .latch_full_coverage(&self.components.fitness_functions, created_tests, &mut ctx.statistics)
    }

    /// Runs every applicable local search operator on each member of
    /// `population`, keeping improved results.
    pub fn apply_local_search(
        &mut self,
        population: &mut [Rc<C>],
        generation: usize,
        ctx: &mut SearchContext,
    ) -> Result<()> {
        if self.components.local_search.is_empty() {
            return Ok(());
        }
        let mut operators = self.take_local_search();
        let outcome = self.run_local_search(&mut operators, population, generation, ctx);
        self.restore_local_search(operators);
        outcome
    }

    fn run_local_search(
        &mut self,
        operators: &mut [Box<dyn LocalSearch<C>>],
        population: &mut [Rc<C>],
        generation: usize,
        ctx: &mut SearchContext,
    ) -> Result<()> {
        for slot in population.iter_mut() {
            for operator in operators.iter_mut() {
                let original = Rc::clone(slot);
                let progress = self.progress()?;
                if !operator.is_applicable(&original, progress, generation)
                    || self.is_finished()?
                    || ctx.rng.next_double() >= operator.probability()
                {
                    continue;
                }
                let modified = match operator.apply(&original, ctx) {
                    Ok(modified) => modified,
                    Err(e) => {
                        warn!("local search failed: {e}");
                        continue;
                    }
                };
                if operator.has_improved(&original, &modified) {
                    debug!("local search improved a chromosome");
                    let modified = Rc::new(modified);
                    if self.update_archive(&modified, ctx) {
                        *slot = modified;
                        ctx.statistics.best_test_suite_size = self.best_individuals.len();
                    }
                }
            }
        }
        Ok(())
    }

    pub fn fitness_functions(&self) -> &FitnessMap<C> {
        &self.components.fitness_functions
    }

    /// Lends the local search operators out; hand them back with
    /// [`restore_local_search`](Self::restore_local_search).
    pub(crate) fn take_local_search(&mut self) -> Vec<Box<dyn LocalSearch<C>>> {
        mem::take(&mut self.components.local_search)
    }

    pub(crate) fn restore_local_search(&mut self, operators: Vec<Box<dyn LocalSearch<C>>>) {
        self.components.local_search = operators;
    }

    /// The only fitness function, if there is exactly one.
    pub fn single_fitness_function(&self) -> Option<FitnessRef<C>> {
        let mut functions = self.components.fitness_functions.values();
        match (functions.next(), functions.next()) {
            (Some(f), None) => Some(Rc::clone(f)),
            _ => None,
        }
    }

    pub fn archive(&self) -> &Archive<C> {
        &self.archive
    }

    /// The archive as returned by `find_solution`.
    pub fn solution(&self) -> std::collections::BTreeMap<usize, Rc<C>> {
        self.archive.entries().clone()
    }
}

impl<C: Chromosome> SearchState<C> for SearchRun<C> {
    fn iterations(&self) -> usize {
        self.iterations
    }

    fn start_time(&self) -> Instant {
        self.start_time
    }

    fn current_solution(&self) -> &[Rc<C>] {
        &self.best_individuals
    }

    fn fitness_functions(&self) -> &FitnessMap<C> {
        &self.components.fitness_functions
    }
}

/// Whether `candidate` beats `incumbent` on `function`; equal fitness goes
/// to the one with fewer genes.
pub fn is_better_or_shorter<C: Chromosome>(
    function: &FitnessRef<C>,
    candidate: &C,
    incumbent: &C,
) -> Result<bool> {
    let comparison = function.compare(candidate.get_fitness(function)?, incumbent.get_fitness(function)?);
    Ok(comparison > 0.0 || (comparison == 0.0 && candidate.len() < incumbent.len()))
}

/// Delegates [`SearchState`] to an embedded [`SearchRun`] field.
macro_rules! delegate_search_state {
    ($algorithm:ident, $field:ident) => {
        impl<C: $crate::Chromosome> $crate::SearchState<C> for $algorithm<C> {
            fn iterations(&self) -> usize {
                self.$field.iterations
            }

            fn start_time(&self) -> std::time::Instant {
                $crate::SearchState::start_time(&self.$field)
            }

            fn current_solution(&self) -> &[std::rc::Rc<C>] {
                &self.$field.best_individuals
            }

            fn fitness_functions(&self) -> &$crate::FitnessMap<C> {
                self.$field.fitness_functions()
            }
        }
    };
}

pub(crate) use delegate_search_state;
