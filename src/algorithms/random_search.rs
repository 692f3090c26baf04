use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, info};

use crate::algorithms::common::{SearchComponents, SearchRun, delegate_search_state};
use crate::{Chromosome, Result, SearchAlgorithm, SearchContext};

/// Samples independent random chromosomes until the budget is spent.
pub struct RandomSearch<C> {
    run: SearchRun<C>,
}

impl<C: Chromosome> RandomSearch<C> {
    pub fn new(components: SearchComponents<C>) -> Self {
        Self {
            run: SearchRun::new(components),
        }
    }
}

delegate_search_state!(RandomSearch, run);

impl<C: Chromosome> SearchAlgorithm<C> for RandomSearch<C> {
    fn find_solution(&mut self, ctx: &mut SearchContext) -> Result<BTreeMap<usize, Rc<C>>> {
        self.run.begin(ctx);
        info!("random search started");
        let single = self.run.single_fitness_function();
        let mut best: Option<(Rc<C>, f64)> = None;

        while !self.run.is_finished()? {
            let candidate = self.run.generate(ctx);
            if let Some(candidate) = self.run.evaluate(candidate, ctx) {
                if self.run.update_archive(&candidate, ctx) {
                    if let Some(function) = &single {
                        let fitness = candidate.get_fitness(function)?;
                        let improved = best
                            .as_ref()
                            .is_none_or(|(_, best_fitness)| function.compare(fitness, *best_fitness) > 0.0);
                        if improved {
                            self.run.best_individuals = vec![Rc::clone(&candidate)];
                            best = Some((candidate, fitness));
                        }
                    }
                }
            }
            let created = self.run.iterations + 1;
            self.run.update_statistics(created, ctx);
            self.run.iterations += 1;
            debug!(
                "iteration {}: covered goals {}/{}",
                self.run.iterations,
                self.run.archive.len(),
                self.run.fitness_functions().len()
            );
        }
        info!("random search completed after {} iterations", self.run.iterations);
        Ok(self.run.solution())
    }

    fn name(&self) -> &'static str {
        "RandomSearch"
    }
}
