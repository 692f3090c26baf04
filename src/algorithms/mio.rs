//! Many Independent Objective algorithm.
//!
//! MIO keeps, per uncovered goal, a small population of chromosomes ranked
//! by a heuristic in `[0, 1]` (1 = covered) and focuses mutation on the goal
//! sampled least often. As the search progresses the parameters move from
//! exploration (high random sampling, large populations) towards the focused
//! phase.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use log::{debug, info, warn};

use crate::algorithms::common::{SearchComponents, SearchRun, delegate_search_state};
use crate::config::MioProperties;
use crate::operators::LocalSearch;
use crate::{Chromosome, Result, SearchAlgorithm, SearchContext, SearchError};

/// Maps a goal's fitness value to `[0, 1]`, where 1 means covered.
pub type Heuristic = Rc<dyn Fn(f64) -> f64>;

struct ArchiveTuple<C> {
    chromosome: Rc<C>,
    heuristic: f64,
}

pub struct Mio<C> {
    run: SearchRun<C>,
    properties: MioProperties,
    heuristics: BTreeMap<usize, Heuristic>,
    uncovered: BTreeMap<usize, Vec<ArchiveTuple<C>>>,
    /// Goals whose uncovered populations are still maintained.
    independent: BTreeSet<usize>,
    /// Goals whose coverage implies the others'; all goals when unset.
    independent_goals: Option<BTreeSet<usize>>,
    sampling_counter: BTreeMap<usize, usize>,
    random_selection_probability: f64,
    max_archive_size: usize,
    max_mutation_count: usize,
}

impl<C: Chromosome> Mio<C> {
    pub fn new(
        components: SearchComponents<C>,
        properties: MioProperties,
        heuristics: BTreeMap<usize, Heuristic>,
    ) -> Self {
        Self {
            run: SearchRun::new(components),
            random_selection_probability: properties.selection_probability.start,
            max_archive_size: properties.max_archive_size.start,
            max_mutation_count: properties.max_mutation_count.start,
            properties,
            heuristics,
            uncovered: BTreeMap::new(),
            independent: BTreeSet::new(),
            independent_goals: None,
            sampling_counter: BTreeMap::new(),
        }
    }

    /// Restricts the uncovered populations to `keys`, e.g. the
    /// [independent statements](crate::testcase::StatementFitnessFunction::independent_statements)
    /// of a program. Keys without a goal are ignored.
    #[must_use]
    pub fn with_independent_goals(mut self, keys: BTreeSet<usize>) -> Self {
        self.independent_goals = Some(keys);
        self
    }

    /// Goals that still keep a population of uncovered chromosomes.
    pub fn open_independent_goals(&self) -> &BTreeSet<usize> {
        &self.independent
    }

    pub fn random_selection_probability(&self) -> f64 {
        self.random_selection_probability
    }

    pub fn max_archive_size(&self) -> usize {
        self.max_archive_size
    }

    pub fn max_mutation_count(&self) -> usize {
        self.max_mutation_count
    }

    /// Number of chromosomes kept for `key` while it is uncovered.
    pub fn uncovered_population_size(&self, key: usize) -> usize {
        self.uncovered.get(&key).map_or(0, Vec::len)
    }

    fn heuristic(&self, chromosome: &C, key: usize) -> Result<f64> {
        let function = self
            .run
            .fitness_functions()
            .get(&key)
            .ok_or(SearchError::MissingComponent("fitness function"))?;
        let heuristic = self
            .heuristics
            .get(&key)
            .ok_or(SearchError::MissingComponent("heuristic function"))?;
        Ok(heuristic(chromosome.get_fitness(function)?))
    }

    /// Positive when `c1` is closer to covering the goals overall.
    fn compare_with_equal_heuristic(&self, c1: &C, c2: &C) -> Result<f64> {
        let mut sum1 = 0.0;
        let mut sum2 = 0.0;
        for &key in self.run.fitness_functions().keys() {
            sum1 += self.heuristic(c1, key)?;
            sum2 += self.heuristic(c2, key)?;
        }
        Ok(sum1 - sum2)
    }

    fn update_archive(&mut self, chromosome: &Rc<C>, ctx: &mut SearchContext) -> Result<()> {
        self.update_covered_archive(chromosome, ctx)?;
        self.update_uncovered_archive(chromosome)
    }

    fn update_covered_archive(&mut self, chromosome: &Rc<C>, ctx: &mut SearchContext) -> Result<()> {
        let keys: Vec<usize> = self.run.fitness_functions().keys().copied().collect();
        for key in keys {
            if self.heuristic(chromosome, key)? != 1.0 {
                continue;
            }
            if let Some(old) = self.run.archive.get(key).cloned() {
                if chromosome.len() <= old.len()
                    && (old.len() > chromosome.len()
                        || self.compare_with_equal_heuristic(chromosome, &old)? > 0.0)
                {
                    self.set_best_covering(chromosome, key, ctx);
                }
            } else {
                ctx.statistics.increment_covered_fitness_function_count();
                self.uncovered.remove(&key);
                self.set_best_covering(chromosome, key, ctx);
                debug!("found test for goal {key}");
                let created = self.run.iterations;
                self.run.latch_full_coverage(created, ctx);
                self.independent.remove(&key);
            }
        }
        Ok(())
    }

    fn set_best_covering(&mut self, chromosome: &Rc<C>, key: usize, ctx: &mut SearchContext) {
        self.run.archive.insert(key, Rc::clone(chromosome));
        self.run.best_individuals = self.run.archive.best_individuals().to_vec();
        ctx.statistics.best_test_suite_size = self.run.best_individuals.len();
        self.sampling_counter.insert(key, 0);
    }

    fn update_uncovered_archive(&mut self, chromosome: &Rc<C>) -> Result<()> {
        let keys: Vec<usize> = self.independent.iter().copied().collect();
        for key in keys {
            let heuristic = self.heuristic(chromosome, key)?;
            if heuristic <= 0.0 || self.run.archive.contains(key) {
                continue;
            }
            let mut tuples = self.uncovered.remove(&key).unwrap_or_default();
            let duplicate = tuples.iter().any(|t| t.chromosome.same_genes(chromosome));
            if !duplicate {
                let tuple = ArchiveTuple {
                    chromosome: Rc::clone(chromosome),
                    heuristic,
                };
                if tuples.len() < self.max_archive_size {
                    tuples.push(tuple);
                } else if let Some(worst) = self.worst_tuple(&tuples)? {
                    let worst_heuristic = tuples[worst].heuristic;
                    if worst_heuristic < heuristic
                        || (worst_heuristic == heuristic
                            && self.compare_with_equal_heuristic(chromosome, &tuples[worst].chromosome)? >= 0.0)
                    {
                        tuples.remove(worst);
                        tuples.push(tuple);
                        self.sampling_counter.insert(key, 0);
                    }
                }
            }
            if !tuples.is_empty() {
                self.uncovered.insert(key, tuples);
            }
        }
        Ok(())
    }

    /// Lowest heuristic; ties go to the chromosome that is further from the
    /// goals overall.
    fn worst_tuple(&self, tuples: &[ArchiveTuple<C>]) -> Result<Option<usize>> {
        let mut worst: Option<usize> = None;
        let mut worst_heuristic = 1.0;
        for (i, tuple) in tuples.iter().enumerate() {
            let replace = match worst {
                None => true,
                Some(w) => {
                    tuple.heuristic < worst_heuristic
                        || (tuple.heuristic == worst_heuristic
                            && self.compare_with_equal_heuristic(&tuples[w].chromosome, &tuple.chromosome)? > 0.0)
                }
            };
            if replace {
                worst = Some(i);
                worst_heuristic = tuple.heuristic;
            }
        }
        Ok(worst)
    }

    /// The least sampled goal among the uncovered or the covered ones.
    fn least_sampled_goal(&self, among_uncovered: bool) -> Option<usize> {
        let keys: Vec<usize> = if among_uncovered {
            self.uncovered.keys().copied().collect()
        } else {
            self.run.archive.entries().keys().copied().collect()
        };
        let mut best: Option<(usize, usize)> = None;
        for key in keys {
            let count = self.sampling_counter.get(&key).copied().unwrap_or(0);
            if best.is_none_or(|(_, min)| count < min) {
                best = Some((key, count));
            }
        }
        best.map(|(key, _)| key)
    }

    fn is_focused_phase_reached(&self) -> bool {
        let p = &self.properties;
        self.random_selection_probability == p.selection_probability.focused_phase
            && self.max_archive_size == p.max_archive_size.focused_phase
            && self.max_mutation_count == p.max_mutation_count.focused_phase
    }

    /// Interpolates the parameters linearly between start and focused phase.
    fn update_parameters(&mut self) -> Result<()> {
        let progress = self.run.progress()?;
        let p = &self.properties;
        let ratio = if p.start_of_focused_phase > 0.0 {
            progress / p.start_of_focused_phase
        } else {
            1.0
        };
        let previous_archive_size = self.max_archive_size;
        if ratio >= 1.0 {
            self.random_selection_probability = p.selection_probability.focused_phase;
            self.max_archive_size = p.max_archive_size.focused_phase;
            self.max_mutation_count = p.max_mutation_count.focused_phase;
        } else {
            let interpolate = |start: f64, focused: f64| start + (focused - start) * ratio;
            self.random_selection_probability =
                interpolate(p.selection_probability.start, p.selection_probability.focused_phase);
            self.max_archive_size = interpolate(
                p.max_archive_size.start as f64,
                p.max_archive_size.focused_phase as f64,
            )
            .round() as usize;
            self.max_mutation_count = interpolate(
                p.max_mutation_count.start as f64,
                p.max_mutation_count.focused_phase as f64,
            )
            .round() as usize;
        }

        if previous_archive_size > self.max_archive_size {
            let keys: Vec<usize> = self.uncovered.keys().copied().collect();
            for key in keys {
                let mut tuples = self.uncovered.remove(&key).unwrap_or_default();
                while tuples.len() > self.max_archive_size {
                    match self.worst_tuple(&tuples)? {
                        Some(worst) => {
                            tuples.remove(worst);
                        }
                        None => break,
                    }
                }
                if !tuples.is_empty() {
                    self.uncovered.insert(key, tuples);
                }
            }
        }
        Ok(())
    }

    fn apply_local_search(&mut self, chromosome: &Rc<C>, ctx: &mut SearchContext) -> Result<()> {
        let mut operators = self.run.take_local_search();
        let outcome = self.run_local_search(&mut operators, chromosome, ctx);
        self.run.restore_local_search(operators);
        outcome
    }

    fn run_local_search(
        &mut self,
        operators: &mut [Box<dyn LocalSearch<C>>],
        chromosome: &Rc<C>,
        ctx: &mut SearchContext,
    ) -> Result<()> {
        for operator in operators.iter_mut() {
            let progress = self.run.progress()?;
            if !operator.is_applicable(chromosome, progress, self.run.iterations)
                || ctx.rng.next_double() >= operator.probability()
            {
                continue;
            }
            match operator.apply(chromosome, ctx) {
                Ok(modified) => self.update_archive(&Rc::new(modified), ctx)?,
                Err(e) => warn!("local search failed: {e}"),
            }
        }
        Ok(())
    }

    fn reset(&mut self, ctx: &mut SearchContext) -> Result<()> {
        for key in self.run.fitness_functions().keys() {
            if !self.heuristics.contains_key(key) {
                return Err(SearchError::MissingComponent("heuristic function"));
            }
        }
        self.run.begin(ctx);
        self.uncovered.clear();
        let keys: BTreeSet<usize> = self.run.fitness_functions().keys().copied().collect();
        self.sampling_counter = keys.iter().map(|&k| (k, 0)).collect();
        self.independent = match &self.independent_goals {
            Some(goals) if goals.iter().any(|k| keys.contains(k)) => goals.intersection(&keys).copied().collect(),
            _ => keys,
        };
        self.random_selection_probability = self.properties.selection_probability.start;
        self.max_archive_size = self.properties.max_archive_size.start;
        self.max_mutation_count = self.properties.max_mutation_count.start;
        self.update_parameters()
    }

    fn sample_fresh(&mut self, ctx: &mut SearchContext) -> Result<()> {
        let chromosome = self.run.generate(ctx);
        if let Some(chromosome) = self.run.evaluate(chromosome, ctx) {
            self.update_archive(&chromosome, ctx)?;
            self.apply_local_search(&chromosome, ctx)?;
        }
        self.run.iterations += 1;
        ctx.statistics.increment_iteration_count();
        Ok(())
    }

    /// Mutates a chromosome archived for `key`, hill-climbing on the goal's
    /// heuristic.
    fn focus_on(&mut self, key: usize, among_uncovered: bool, ctx: &mut SearchContext) -> Result<()> {
        *self.sampling_counter.entry(key).or_insert(0) += 1;
        let start = if among_uncovered {
            self.uncovered
                .get(&key)
                .and_then(|tuples| ctx.rng.pick(tuples))
                .map(|t| Rc::clone(&t.chromosome))
        } else {
            self.run.archive.get(key).cloned()
        };
        let Some(mut chromosome) = start else {
            return self.sample_fresh(ctx);
        };
        let target = self.run.fitness_functions().get(&key).cloned();
        let mut current = self.heuristic(&chromosome, key)?;
        let mut mutations = 0;
        while mutations < self.max_mutation_count && !self.run.archive.contains(key) {
            let mut mutant = chromosome.mutate(&mut ctx.rng);
            mutant.set_target_fitness(target.clone());
            if let Some(mutant) = self.run.evaluate(mutant, ctx) {
                self.update_archive(&mutant, ctx)?;
                let mutant_heuristic = self.heuristic(&mutant, key)?;
                if current <= mutant_heuristic {
                    chromosome = mutant;
                    current = mutant_heuristic;
                }
            }
            mutations += 1;
            self.run.iterations += 1;
            ctx.statistics.increment_iteration_count();
        }
        self.apply_local_search(&chromosome, ctx)
    }
}

delegate_search_state!(Mio, run);

impl<C: Chromosome> SearchAlgorithm<C> for Mio<C> {
    fn find_solution(&mut self, ctx: &mut SearchContext) -> Result<BTreeMap<usize, Rc<C>>> {
        self.reset(ctx)?;
        info!("MIO started with {} goals", self.run.fitness_functions().len());

        while !self.run.is_finished()? {
            let nothing_archived = self.uncovered.is_empty() && self.run.archive.is_empty();
            let sample = nothing_archived
                || self.max_mutation_count == 0
                || ctx.rng.next_double() < self.random_selection_probability;
            if sample {
                self.sample_fresh(ctx)?;
            } else {
                let among_uncovered = !self.uncovered.is_empty();
                match self.least_sampled_goal(among_uncovered) {
                    Some(key) => self.focus_on(key, among_uncovered, ctx)?,
                    None => self.sample_fresh(ctx)?,
                }
            }
            if !self.is_focused_phase_reached() {
                self.update_parameters()?;
            }
            debug!(
                "iteration {}: covered goals {}/{}, open independent goals {}",
                self.run.iterations,
                self.run.archive.len(),
                self.run.fitness_functions().len(),
                self.independent.len()
            );
        }

        info!(
            "MIO completed after {} iterations, covered {}/{}",
            self.run.iterations,
            self.run.archive.len(),
            self.run.fitness_functions().len()
        );
        Ok(self.run.solution())
    }

    fn name(&self) -> &'static str {
        "MIO"
    }
}
