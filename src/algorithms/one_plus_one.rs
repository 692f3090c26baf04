use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, info};

use crate::algorithms::common::{SearchComponents, SearchRun, delegate_search_state};
use crate::{Chromosome, FitnessRef, Result, SearchAlgorithm, SearchContext, SearchError};

/// (1+1) evolutionary algorithm on a single fitness function.
///
/// The parent is replaced by its mutant whenever the mutant is not worse.
pub struct OnePlusOneEA<C> {
    run: SearchRun<C>,
    best_individual: Option<Rc<C>>,
}

impl<C: Chromosome> OnePlusOneEA<C> {
    pub fn new(components: SearchComponents<C>) -> Self {
        Self {
            run: SearchRun::new(components).with_own_solution(),
            best_individual: None,
        }
    }

    pub fn best_individual(&self) -> Option<&Rc<C>> {
        self.best_individual.as_ref()
    }

    fn fitness_function(&self) -> Result<FitnessRef<C>> {
        self.run.single_fitness_function().ok_or_else(|| {
            SearchError::InvalidArgument(String::from("(1+1)EA needs exactly one fitness function"))
        })
    }

    /// Evaluates chromosomes until one evaluates cleanly.
    fn sample(&mut self, ctx: &mut SearchContext) -> Result<Rc<C>> {
        loop {
            let chromosome = self.run.generate(ctx);
            if let Some(chromosome) = self.run.evaluate(chromosome, ctx) {
                return Ok(chromosome);
            }
            self.run.iterations += 1;
            if self.run.is_finished()? {
                return Err(SearchError::InvalidArgument(String::from(
                    "no chromosome could be evaluated",
                )));
            }
        }
    }

    fn accept(&mut self, chromosome: Rc<C>, ctx: &mut SearchContext) {
        self.run.update_archive(&chromosome, ctx);
        self.run.best_individuals = vec![Rc::clone(&chromosome)];
        self.best_individual = Some(chromosome);
    }
}

delegate_search_state!(OnePlusOneEA, run);

impl<C: Chromosome> SearchAlgorithm<C> for OnePlusOneEA<C> {
    fn find_solution(&mut self, ctx: &mut SearchContext) -> Result<BTreeMap<usize, Rc<C>>> {
        let function = self.fitness_function()?;
        self.run.begin(ctx);
        info!("(1+1)EA started");

        let mut best = self.sample(ctx)?;
        let mut best_fitness = best.get_fitness(&function)?;
        self.accept(Rc::clone(&best), ctx);
        ctx.statistics.best_test_suite_size = 1;
        if function.is_optimal(best_fitness) {
            self.run.latch_full_coverage(1, ctx);
        }

        while !self.run.is_finished()? {
            let Some(candidate) = self.run.evaluate(best.mutate(&mut ctx.rng), ctx) else {
                self.run.iterations += 1;
                continue;
            };
            let candidate_fitness = candidate.get_fitness(&function)?;
            debug!(
                "iteration {}: best fitness {best_fitness}, length {}",
                self.run.iterations,
                best.len()
            );
            if function.compare(candidate_fitness, best_fitness) >= 0.0 {
                best_fitness = candidate_fitness;
                best = Rc::clone(&candidate);
                self.accept(candidate, ctx);
                if function.is_optimal(candidate_fitness) {
                    let created = self.run.iterations + 1;
                    self.run.latch_full_coverage(created, ctx);
                }
            }
            ctx.statistics.increment_iteration_count();
            self.run.iterations += 1;
        }
        info!("(1+1)EA completed after {} iterations", self.run.iterations);
        Ok(self.run.solution())
    }

    fn name(&self) -> &'static str {
        "OnePlusOneEA"
    }
}
