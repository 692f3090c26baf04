use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, info};

use crate::algorithms::common::{SearchComponents, SearchRun, delegate_search_state};
use crate::config::GeneticAlgorithmProperties;
use crate::operators::Selection;
use crate::{
    Chromosome, FitnessRef, Result, SearchAlgorithm, SearchContext, SearchError, cmp_f64_nan_last,
};

/// Generational GA on a single fitness function with one elite.
pub struct SimpleGA<C> {
    run: SearchRun<C>,
    properties: GeneticAlgorithmProperties,
    selection: Box<dyn Selection<C>>,
    best_fitness: f64,
    best_length: usize,
}

impl<C: Chromosome> SimpleGA<C> {
    pub fn new(
        components: SearchComponents<C>,
        properties: GeneticAlgorithmProperties,
        selection: Box<dyn Selection<C>>,
    ) -> Self {
        Self {
            run: SearchRun::new(components).with_own_solution(),
            properties,
            selection,
            best_fitness: 0.0,
            best_length: 0,
        }
    }

    pub fn best_fitness(&self) -> f64 {
        self.best_fitness
    }

    fn fitness_function(&self) -> Result<FitnessRef<C>> {
        self.run.single_fitness_function().ok_or_else(|| {
            SearchError::InvalidArgument(String::from("SimpleGA needs exactly one fitness function"))
        })
    }

    fn initial_population(&mut self, ctx: &mut SearchContext) -> Result<Vec<C>> {
        let mut population = Vec::with_capacity(self.properties.population_size);
        for _ in 0..self.properties.population_size {
            if self.run.is_finished()? {
                break;
            }
            population.push(self.run.generate(ctx));
        }
        Ok(population)
    }

    /// Sorts ascending by quality and records the last member as the best
    /// individual if it beats the previous one.
    fn sort_and_record_best(
        &mut self,
        population: &mut Vec<Rc<C>>,
        function: &FitnessRef<C>,
        ctx: &mut SearchContext,
    ) -> Result<()> {
        let mut scored = Vec::with_capacity(population.len());
        for chromosome in population.drain(..) {
            let fitness = chromosome.get_fitness(function)?;
            scored.push((chromosome, fitness));
        }
        scored.sort_by(|(c1, f1), (c2, f2)| {
            if f1 == f2 {
                c2.len().cmp(&c1.len())
            } else {
                cmp_f64_nan_last(function.compare(*f1, *f2), 0.0)
            }
        });
        population.extend(scored.iter().map(|(c, _)| Rc::clone(c)));

        let Some((best, fitness)) = scored.pop() else {
            return Ok(());
        };
        let comparison = function.compare(fitness, self.best_fitness);
        let has_best = !self.run.best_individuals.is_empty();
        if !has_best
            || comparison > 0.0
            || (comparison == 0.0 && best.len() < self.best_length)
        {
            let newly_optimal = function.is_optimal(fitness)
                && (!has_best || !function.is_optimal(self.best_fitness));
            if newly_optimal {
                ctx.statistics.covered_fitness_function_count = 1;
                let created = (self.run.iterations + 1) * self.properties.population_size;
                ctx.statistics.record_full_coverage(created);
            }
            self.best_length = best.len();
            self.best_fitness = fitness;
            self.run.best_individuals = vec![best];
            debug!("new best solution with fitness {fitness}");
        }
        Ok(())
    }

    fn offspring(
        &self,
        parents: &[Rc<C>],
        function: &FitnessRef<C>,
        ctx: &mut SearchContext,
    ) -> Result<Vec<C>> {
        let mut offspring = Vec::with_capacity(parents.len());
        if let Some(elite) = parents.last() {
            offspring.push(C::clone(elite));
        }
        while offspring.len() < parents.len() {
            let parent1 = self.selection.apply(parents, Some(function), &mut ctx.rng)?;
            let parent2 = self.selection.apply(parents, Some(function), &mut ctx.rng)?;
            let (mut child1, mut child2) = if ctx.rng.next_double() < self.properties.crossover_probability {
                parent1.crossover(&parent2, &mut ctx.rng)
            } else {
                (C::clone(&parent1), C::clone(&parent2))
            };
            if ctx.rng.next_double() < self.properties.mutation_probability {
                child1 = child1.mutate(&mut ctx.rng);
            }
            if ctx.rng.next_double() < self.properties.mutation_probability {
                child2 = child2.mutate(&mut ctx.rng);
            }
            offspring.push(child1);
            if offspring.len() < parents.len() {
                offspring.push(child2);
            }
        }
        Ok(offspring)
    }
}

delegate_search_state!(SimpleGA, run);

impl<C: Chromosome> SearchAlgorithm<C> for SimpleGA<C> {
    fn find_solution(&mut self, ctx: &mut SearchContext) -> Result<BTreeMap<usize, Rc<C>>> {
        let function = self.fitness_function()?;
        self.run.begin(ctx);
        self.best_fitness = 0.0;
        self.best_length = 0;
        info!("SimpleGA started");

        let initial = self.initial_population(ctx)?;
        let mut population = self.run.evaluate_population(initial, ctx)?;
        if self.run.is_finished()? {
            self.run.update_statistics(self.properties.population_size, ctx);
        } else {
            self.sort_and_record_best(&mut population, &function, ctx)?;
        }

        while !self.run.is_finished()? {
            if population.is_empty() {
                return Err(SearchError::InvalidArgument(String::from(
                    "population died out: no chromosome could be evaluated",
                )));
            }
            debug!("iteration {}, best fitness {}", self.run.iterations, self.best_fitness);
            let offspring = self.offspring(&population, &function, ctx)?;
            let mut next_generation = self.run.evaluate_population(offspring, ctx)?;
            if !self.run.is_finished()? {
                self.sort_and_record_best(&mut next_generation, &function, ctx)?;
            }
            population = next_generation;
            self.run.iterations += 1;
            let created = (self.run.iterations + 1) * self.properties.population_size;
            self.run.update_statistics(created, ctx);
        }

        info!("SimpleGA completed after {} iterations", self.run.iterations);
        Ok(self.run.solution())
    }

    fn name(&self) -> &'static str {
        "SimpleGA"
    }
}
