//! Neuroevolution search: networks instead of event sequences play the
//! program, and the population evolves through speciation.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::archive::Archive;
use crate::neat::{NeatPopulation, NeatProperties, NetworkChromosome, NetworkExecutor, NetworkFitnessFunction};
use crate::stopping::StoppingCondition;
use crate::testcase::ProgramUnderTest;
use crate::{
    Chromosome, ChromosomeGenerator, FitnessMap, FitnessRef, Randomness, Result, SearchAlgorithm, SearchContext,
    SearchState,
};

/// NEAT over a program under test.
///
/// Every generation each network plays the program once and is rated by the
/// network fitness function. Goals are archived the first time a network
/// covers them; the fittest network so far is kept under the key following
/// the last goal. All networks of a generation share one target goal, kept
/// until it is covered.
pub struct Neat<P: ProgramUnderTest> {
    properties: NeatProperties,
    population: NeatPopulation,
    generator: Box<dyn ChromosomeGenerator<NetworkChromosome>>,
    executor: NetworkExecutor<P>,
    network_fitness: Box<dyn NetworkFitnessFunction<P>>,
    stopping_condition: Box<dyn StoppingCondition<NetworkChromosome>>,
    fitness_functions: FitnessMap<NetworkChromosome>,
    archive: Archive<NetworkChromosome>,
    target_key: Option<usize>,
    iterations: usize,
    start_time: Instant,
}

impl<P: ProgramUnderTest> Neat<P> {
    pub fn new(
        properties: NeatProperties,
        generator: Box<dyn ChromosomeGenerator<NetworkChromosome>>,
        executor: NetworkExecutor<P>,
        network_fitness: Box<dyn NetworkFitnessFunction<P>>,
        stopping_condition: Box<dyn StoppingCondition<NetworkChromosome>>,
        fitness_functions: FitnessMap<NetworkChromosome>,
    ) -> Self {
        Self {
            population: NeatPopulation::new(properties.clone()),
            properties,
            generator,
            executor,
            network_fitness,
            stopping_condition,
            fitness_functions,
            archive: Archive::new(),
            target_key: None,
            iterations: 0,
            start_time: Instant::now(),
        }
    }

    pub fn population(&self) -> &NeatPopulation {
        &self.population
    }

    pub fn executor(&self) -> &NetworkExecutor<P> {
        &self.executor
    }

    pub fn archive(&self) -> &Archive<NetworkChromosome> {
        &self.archive
    }

    /// Archive key of the fittest network.
    pub fn best_network_key(&self) -> usize {
        self.fitness_functions.len() + 1
    }

    /// The fittest network found so far.
    pub fn best_network(&self) -> Option<&Rc<NetworkChromosome>> {
        self.archive.get(self.best_network_key())
    }

    /// The goal the current generation is evolved towards.
    pub fn target(&self) -> Option<&FitnessRef<NetworkChromosome>> {
        self.target_key.and_then(|key| self.fitness_functions.get(&key))
    }

    fn is_finished(&self) -> Result<bool> {
        self.stopping_condition.is_finished(self)
    }

    /// Keeps the current target until it is covered, then moves on to an
    /// uncovered goal: one reached by the start event if there is any, a
    /// random one otherwise.
    fn update_target(&mut self, rng: &mut Randomness) {
        if self.target_key.is_some_and(|key| !self.archive.contains(key)) {
            return;
        }
        let uncovered: Vec<usize> = self
            .fitness_functions
            .keys()
            .copied()
            .filter(|&key| !self.archive.contains(key))
            .collect();
        self.target_key = uncovered
            .iter()
            .copied()
            .find(|key| self.fitness_functions[key].is_start_event_goal())
            .or_else(|| (!uncovered.is_empty()).then(|| uncovered[rng.next_index(uncovered.len())]));
        if let Some(target) = self.target() {
            debug!("next target: {}", target.describe());
        }
    }

    /// Plays every network once; stops early when the budget runs out.
    fn evaluate_population(&mut self, ctx: &mut SearchContext) -> Result<()> {
        self.update_target(&mut ctx.rng);
        let target = self.target().cloned();
        let statements: Vec<FitnessRef<NetworkChromosome>> = self.fitness_functions.values().cloned().collect();
        for position in self.population.positions() {
            let Some(network) = self.population.network_mut(position) else {
                continue;
            };
            network.set_target_fitness(target.clone());
            if let Err(e) = self.network_fitness.get_fitness(&mut self.executor, network, ctx) {
                warn!("skipping network that failed to play: {e}");
                continue;
            }
            network.determine_covered_statements(&statements)?;
            let snapshot = Rc::new(network.clone());
            self.update_archive(&snapshot, ctx)?;
            if self.is_finished()? {
                break;
            }
        }
        Ok(())
    }

    fn update_archive(&mut self, network: &Rc<NetworkChromosome>, ctx: &mut SearchContext) -> Result<()> {
        for (&key, function) in &self.fitness_functions {
            if self.archive.contains(key) {
                continue;
            }
            if function.is_optimal(network.get_fitness(function)?) {
                ctx.statistics.increment_covered_fitness_function_count();
                self.archive.insert(key, Rc::clone(network));
            }
        }

        let key = self.best_network_key();
        let improved = self
            .archive
            .get(key)
            .is_none_or(|best| network.network_fitness() > best.network_fitness());
        if improved {
            self.archive.insert(key, Rc::clone(network));
        }
        Ok(())
    }

    fn update_statistics(&mut self, ctx: &mut SearchContext) {
        let statistics = &mut ctx.statistics;
        statistics.best_test_suite_size = self.archive.best_individuals().len();
        statistics.increment_iteration_count();

        if let Some(champion) = self.population.champion() {
            if champion.network_fitness() > statistics.highest_network_fitness {
                statistics.highest_network_fitness = champion.network_fitness();
            }
            if champion.score() > statistics.best_network_score {
                statistics.best_network_score = champion.score();
            }
            let survived = champion.play_time_ms() as f64 / 1000.0;
            if survived > statistics.best_survive_time {
                statistics.best_survive_time = survived;
            }
        }

        let created = (self.iterations + 1) * self.population.properties().population_size;
        self.archive.latch_full_coverage(&self.fitness_functions, created, statistics);
    }

    fn report(&self) {
        debug!(
            "generation {}: highest fitness {:.3}, average fitness {:.3}, {} species, covered goals {}/{}",
            self.population.generation(),
            self.population.highest_fitness(),
            self.population.average_fitness(),
            self.population.species().len(),
            self.fitness_functions.keys().filter(|k| self.archive.contains(**k)).count(),
            self.fitness_functions.len()
        );
        if let Some(champion) = self.population.champion() {
            debug!("champion: {champion:?}");
        }
    }
}

impl<P: ProgramUnderTest> SearchState<NetworkChromosome> for Neat<P> {
    fn iterations(&self) -> usize {
        self.iterations
    }

    fn start_time(&self) -> Instant {
        self.start_time
    }

    fn current_solution(&self) -> &[Rc<NetworkChromosome>] {
        self.archive.best_individuals()
    }

    fn fitness_functions(&self) -> &FitnessMap<NetworkChromosome> {
        &self.fitness_functions
    }
}

impl<P: ProgramUnderTest> SearchAlgorithm<NetworkChromosome> for Neat<P> {
    fn find_solution(&mut self, ctx: &mut SearchContext) -> Result<BTreeMap<usize, Rc<NetworkChromosome>>> {
        self.iterations = 0;
        self.start_time = Instant::now();
        self.archive.clear();
        self.target_key = None;
        ctx.begin_search(self.fitness_functions.len());
        self.population = NeatPopulation::new(self.properties.clone());
        self.population.generate(self.generator.as_mut(), &mut ctx.rng);
        info!("NEAT started with {} networks", self.population.len());

        while !self.is_finished()? {
            self.evaluate_population(ctx)?;
            self.population.update_population_statistics();
            self.update_statistics(ctx);
            self.report();
            self.population.evolve(&mut ctx.rng);
            self.iterations += 1;
        }

        self.executor.reset_state();
        info!(
            "NEAT completed after {} generations, covered goals {}/{}",
            self.iterations,
            ctx.statistics.covered_fitness_function_count,
            self.fitness_functions.len()
        );
        Ok(self.archive.entries().clone())
    }

    fn name(&self) -> &'static str {
        "NEAT"
    }
}
