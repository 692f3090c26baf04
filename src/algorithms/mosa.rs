//! Many-Objective Sorting Algorithm.
//!
//! Every coverage goal is an objective of its own. Each generation ranks
//! parents and offspring by preference sorting: the best chromosome per
//! uncovered goal forms the first front, the rest is split into Pareto
//! fronts over the uncovered goals. Fronts are ordered internally by
//! sub-vector dominance.

use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, info};

use crate::algorithms::common::{
    SearchComponents, SearchRun, delegate_search_state, is_better_or_shorter,
};
use crate::config::GeneticAlgorithmProperties;
use crate::operators::Selection;
use crate::{Chromosome, FitnessRef, Result, SearchAlgorithm, SearchContext};

pub struct Mosa<C> {
    run: SearchRun<C>,
    properties: GeneticAlgorithmProperties,
    selection: Box<dyn Selection<C>>,
    /// Goals not yet covered by the archive.
    non_optimised: Vec<usize>,
}

impl<C: Chromosome> Mosa<C> {
    pub fn new(
        components: SearchComponents<C>,
        properties: GeneticAlgorithmProperties,
        selection: Box<dyn Selection<C>>,
    ) -> Self {
        Self {
            run: SearchRun::new(components),
            properties,
            selection,
            non_optimised: Vec::new(),
        }
    }

    fn refresh_non_optimised(&mut self) {
        self.non_optimised = self.run.archive.uncovered_keys(self.run.fitness_functions());
    }

    fn uncovered_functions(&self) -> Vec<FitnessRef<C>> {
        let functions = self.run.fitness_functions();
        self.non_optimised
            .iter()
            .filter_map(|k| functions.get(k).cloned())
            .collect()
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

    /// As many offspring as there are parents, by crossover and mutation.
    /// Parents are drawn uniformly in the first generation, by the selection
    /// operator afterwards.
    fn offspring(&self, parents: &[Rc<C>], ctx: &mut SearchContext) -> Result<Vec<C>> {
        let size = parents.len();
        let mut offspring = Vec::with_capacity(size);
        while offspring.len() < size {
            let (parent1, parent2) = if self.run.iterations == 0 {
                let i = ctx.rng.next_index(parents.len());
                let j = ctx.rng.next_index(parents.len());
                (Rc::clone(&parents[i]), Rc::clone(&parents[j]))
            } else {
                (
                    self.selection.apply(parents, None, &mut ctx.rng)?,
                    self.selection.apply(parents, None, &mut ctx.rng)?,
                )
            };
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
            if offspring.len() < size {
                offspring.push(child2);
            }
        }
        Ok(offspring)
    }

    /// Splits `chromosomes` into fronts, best first.
    pub fn preference_sorting(&self, chromosomes: &[Rc<C>]) -> Result<Vec<Vec<Rc<C>>>> {
        let goals = self.uncovered_functions();
        let mut best_front: Vec<Rc<C>> = Vec::new();
        for function in &goals {
            let mut best: Option<&Rc<C>> = None;
            for candidate in chromosomes {
                let better = match best {
                    None => true,
                    Some(incumbent) => is_better_or_shorter(function, candidate, incumbent)?,
                };
                if better {
                    best = Some(candidate);
                }
            }
            if let Some(best) = best {
                if !best_front.iter().any(|c| Rc::ptr_eq(c, best)) {
                    best_front.push(Rc::clone(best));
                }
            }
        }

        let remaining: Vec<Rc<C>> = chromosomes
            .iter()
            .filter(|c| !best_front.iter().any(|b| Rc::ptr_eq(b, c)))
            .cloned()
            .collect();

        let mut fronts = Vec::new();
        let overflow = best_front.len() > self.properties.population_size;
        if !best_front.is_empty() {
            fronts.push(best_front);
        }
        if remaining.is_empty() {
            return Ok(fronts);
        }
        if overflow {
            fronts.push(remaining);
        } else {
            let objectives = objective_matrix(&remaining, &goals)?;
            for front in fast_non_dominated_sort(&objectives, &goals) {
                fronts.push(front.into_iter().map(|i| Rc::clone(&remaining[i])).collect());
            }
        }
        Ok(fronts)
    }

    /// Orders `front` ascending by sub-vector dominance distance; ties keep
    /// a random order.
    pub fn sub_vector_dominance_sort(&self, front: &mut Vec<Rc<C>>, ctx: &mut SearchContext) -> Result<()> {
        ctx.rng.shuffle(front);
        let functions: Vec<FitnessRef<C>> = self.run.fitness_functions().values().cloned().collect();
        let objectives = objective_matrix(front, &functions)?;
        let distances: Vec<usize> = (0..front.len())
            .map(|i| {
                (0..front.len())
                    .filter(|&j| j != i)
                    .map(|j| worse_objective_count(&objectives[i], &objectives[j], &functions))
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        let mut order: Vec<usize> = (0..front.len()).collect();
        order.sort_by_key(|&i| distances[i]);
        let sorted: Vec<Rc<C>> = order.into_iter().map(|i| Rc::clone(&front[i])).collect();
        *front = sorted;
        Ok(())
    }

    fn next_generation(&self, union: &[Rc<C>], ctx: &mut SearchContext) -> Result<Vec<Rc<C>>> {
        let size = self.properties.population_size;
        let mut next: Vec<Rc<C>> = Vec::with_capacity(size);
        for mut front in self.preference_sorting(union)? {
            if next.len() >= size {
                break;
            }
            self.sub_vector_dominance_sort(&mut front, ctx)?;
            let room = size - next.len();
            next.extend(front.into_iter().take(room));
        }
        // Best last, as rank selection expects.
        next.reverse();
        Ok(next)
    }
}

/// `matrix[i][g]`: fitness of chromosome `i` for goal `g`.
fn objective_matrix<C: Chromosome>(chromosomes: &[Rc<C>], goals: &[FitnessRef<C>]) -> Result<Vec<Vec<f64>>> {
    chromosomes
        .iter()
        .map(|c| goals.iter().map(|f| c.get_fitness(f)).collect::<Result<Vec<f64>>>())
        .collect()
}

/// Goals on which `a` is worse than `b`.
fn worse_objective_count<C>(a: &[f64], b: &[f64], goals: &[FitnessRef<C>]) -> usize {
    goals
        .iter()
        .enumerate()
        .filter(|&(g, f)| f.compare(a[g], b[g]) < 0.0)
        .count()
}

/// Pareto dominance over the given goals: never worse, better at least once.
fn dominates<C>(a: &[f64], b: &[f64], goals: &[FitnessRef<C>]) -> bool {
    let mut better = false;
    for (g, function) in goals.iter().enumerate() {
        let comparison = function.compare(a[g], b[g]);
        if comparison < 0.0 {
            return false;
        }
        if comparison > 0.0 {
            better = true;
        }
    }
    better
}

/// Index fronts of `objectives`, best first.
pub fn fast_non_dominated_sort<C>(objectives: &[Vec<f64>], goals: &[FitnessRef<C>]) -> Vec<Vec<usize>> {
    let n = objectives.len();
    let mut fronts = vec![vec![]];
    let mut domination_count = vec![0usize; n];
    let mut dominated_indices = vec![vec![]; n];

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if dominates(&objectives[i], &objectives[j], goals) {
                dominated_indices[i].push(j);
            } else if dominates(&objectives[j], &objectives[i], goals) {
                domination_count[i] += 1;
            }
        }
        if domination_count[i] == 0 {
            fronts[0].push(i);
        }
    }

    let mut curr = 0;
    while curr < fronts.len() && !fronts[curr].is_empty() {
        let mut next_front = vec![];
        for &i in &fronts[curr] {
            for &j in &dominated_indices[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next_front.push(j);
                }
            }
        }
        if next_front.is_empty() {
            break;
        }
        fronts.push(next_front);
        curr += 1;
    }
    fronts.retain(|f| !f.is_empty());
    fronts
}

delegate_search_state!(Mosa, run);

impl<C: Chromosome> SearchAlgorithm<C> for Mosa<C> {
    fn find_solution(&mut self, ctx: &mut SearchContext) -> Result<BTreeMap<usize, Rc<C>>> {
        self.run.begin(ctx);
        info!("MOSA started with {} goals", self.run.fitness_functions().len());

        let initial = self.initial_population(ctx)?;
        let mut population = self.run.evaluate_population(initial, ctx)?;
        self.refresh_non_optimised();
        self.run.apply_local_search(&mut population, 0, ctx)?;
        if self.run.is_finished()? {
            self.run.update_statistics(self.properties.population_size, ctx);
        }

        while !self.run.is_finished()? {
            let offspring = self.offspring(&population, ctx)?;
            let offspring = self.run.evaluate_population(offspring, ctx)?;
            self.refresh_non_optimised();

            let mut union = population;
            union.extend(offspring);
            if union.is_empty() {
                debug!("population died out, resampling");
                let initial = self.initial_population(ctx)?;
                population = self.run.evaluate_population(initial, ctx)?;
                self.run.iterations += 1;
                continue;
            }
            population = self.next_generation(&union, ctx)?;
            let generation = self.run.iterations;
            self.run.apply_local_search(&mut population, generation, ctx)?;

            self.run.iterations += 1;
            let created = (self.run.iterations + 1) * self.properties.population_size;
            self.run.update_statistics(created, ctx);
            debug!(
                "iteration {}: covered goals {}/{}",
                self.run.iterations,
                self.run.archive.len(),
                self.run.fitness_functions().len()
            );
        }

        info!(
            "MOSA completed after {} iterations, covered {}/{}",
            self.run.iterations,
            self.run.archive.len(),
            self.run.fitness_functions().len()
        );
        Ok(self.run.solution())
    }

    fn name(&self) -> &'static str {
        "MOSA"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstring::{BitflipMutation, BitstringChromosome, BitstringChromosomeGenerator};
    use crate::operators::{RankSelection, SinglePointCrossover};
    use crate::stopping::FixedIterationsStoppingCondition;
    use crate::NoOpEvaluator;

    fn mosa(population_size: usize) -> Mosa<BitstringChromosome> {
        let components = SearchComponents::new(
            Box::new(BitstringChromosomeGenerator::new(
                6,
                Rc::new(BitflipMutation),
                Rc::new(SinglePointCrossover),
            )),
            Box::new(NoOpEvaluator),
            Box::new(FixedIterationsStoppingCondition::new(1)),
            BTreeMap::new(),
        );
        let properties = GeneticAlgorithmProperties {
            population_size,
            crossover_probability: 0.8,
            mutation_probability: 1.0,
        };
        Mosa::new(components, properties, Box::new(RankSelection))
    }

    fn parents(count: usize) -> Vec<Rc<BitstringChromosome>> {
        (0..count)
            .map(|i| {
                let bits = (0..6).map(|b| (i + b) % 2 == 0).collect();
                Rc::new(BitstringChromosome::new(bits, Rc::new(BitflipMutation), Rc::new(SinglePointCrossover)))
            })
            .collect()
    }

    #[test]
    fn offspring_match_a_short_parent_population() {
        let mosa = mosa(10);
        let mut ctx = SearchContext::new(4);
        assert_eq!(mosa.offspring(&parents(3), &mut ctx).unwrap().len(), 3);
        assert_eq!(mosa.offspring(&parents(4), &mut ctx).unwrap().len(), 4);
    }

    #[test]
    fn no_parents_no_offspring() {
        let mosa = mosa(10);
        assert!(mosa.offspring(&[], &mut SearchContext::new(4)).unwrap().is_empty());
    }
}
