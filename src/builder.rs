//! Assembles chromosome-level search algorithms from their parts.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use log::debug;

use crate::algorithms::common::SearchComponents;
use crate::algorithms::mio::{Heuristic, Mio};
use crate::algorithms::mosa::Mosa;
use crate::algorithms::one_plus_one::OnePlusOneEA;
use crate::algorithms::random_search::RandomSearch;
use crate::algorithms::simple::SimpleGA;
use crate::bitstring::{BitstringChromosome, OneMaxFitnessFunction, SingleBitFitnessFunction};
use crate::config::{AlgorithmKind, GeneticAlgorithmProperties, MioProperties, SearchConfig, SelectionConfig};
use crate::operators::{LocalSearch, RankSelection, Selection, TournamentSelection};
use crate::stopping::StoppingCondition;
use crate::testcase::{HasTrace, StatementFitnessFunction};
use crate::{
    Chromosome, ChromosomeGenerator, Evaluator, FitnessFunction, FitnessMap, FitnessRef, NoOpEvaluator,
    Result, SearchAlgorithm, SearchError,
};

/// Collects the generator, goals, heuristics and operators of a search and
/// builds the configured algorithm.
///
/// NEAT evolves networks against a program instead of chromosomes against
/// goals alone and is assembled directly through
/// [`Neat::new`](crate::algorithms::neat::Neat::new).
pub struct SearchAlgorithmBuilder<C> {
    algorithm: AlgorithmKind,
    generator: Option<Box<dyn ChromosomeGenerator<C>>>,
    evaluator: Box<dyn Evaluator<C>>,
    stopping_condition: Option<Box<dyn StoppingCondition<C>>>,
    fitness_functions: FitnessMap<C>,
    heuristics: BTreeMap<usize, Heuristic>,
    independent_goals: Option<BTreeSet<usize>>,
    selection: Box<dyn Selection<C>>,
    local_search: Vec<Box<dyn LocalSearch<C>>>,
    properties: GeneticAlgorithmProperties,
    mio_properties: MioProperties,
}

impl<C: Chromosome> SearchAlgorithmBuilder<C> {
    pub fn new(algorithm: AlgorithmKind) -> Self {
        Self {
            algorithm,
            generator: None,
            evaluator: Box::new(NoOpEvaluator),
            stopping_condition: None,
            fitness_functions: FitnessMap::new(),
            heuristics: BTreeMap::new(),
            independent_goals: None,
            selection: Box::new(RankSelection),
            local_search: Vec::new(),
            properties: GeneticAlgorithmProperties::default(),
            mio_properties: MioProperties::default(),
        }
    }

    /// Takes algorithm, properties, selection and stopping condition from
    /// `config`. Generator, goals and local search are added separately.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let selection: Box<dyn Selection<C>> = match config.selection {
            SelectionConfig::Rank => Box::new(RankSelection),
            SelectionConfig::Tournament { tournament_size } => Box::new(TournamentSelection::new(tournament_size)),
        };
        Ok(Self::new(config.algorithm)
            .add_properties(config.genetic_algorithm_properties())
            .add_mio_properties(config.mio_properties())
            .add_selection_operator(selection)
            .add_stopping_condition(config.stopping_condition()?))
    }

    #[must_use]
    pub fn add_chromosome_generator(mut self, generator: Box<dyn ChromosomeGenerator<C>>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn add_evaluator(mut self, evaluator: Box<dyn Evaluator<C>>) -> Self {
        self.evaluator = evaluator;
        self
    }

    #[must_use]
    pub fn add_stopping_condition(mut self, stopping_condition: Box<dyn StoppingCondition<C>>) -> Self {
        self.stopping_condition = Some(stopping_condition);
        self
    }

    /// Registers a goal under `key` together with its MIO heuristic.
    #[must_use]
    pub fn add_fitness_function(mut self, key: usize, function: FitnessRef<C>, heuristic: Heuristic) -> Self {
        self.fitness_functions.insert(key, function);
        self.heuristics.insert(key, heuristic);
        self
    }

    /// Goals MIO keeps uncovered populations for.
    #[must_use]
    pub fn add_independent_goals(mut self, keys: BTreeSet<usize>) -> Self {
        self.independent_goals = Some(keys);
        self
    }

    #[must_use]
    pub fn add_selection_operator(mut self, selection: Box<dyn Selection<C>>) -> Self {
        self.selection = selection;
        self
    }

    #[must_use]
    pub fn add_local_search_operator(mut self, operator: Box<dyn LocalSearch<C>>) -> Self {
        self.local_search.push(operator);
        self
    }

    #[must_use]
    pub fn add_properties(mut self, properties: GeneticAlgorithmProperties) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn add_mio_properties(mut self, properties: MioProperties) -> Self {
        self.mio_properties = properties;
        self
    }

    pub fn fitness_functions(&self) -> &FitnessMap<C> {
        &self.fitness_functions
    }

    pub fn build(self) -> Result<Box<dyn SearchAlgorithm<C>>> {
        let generator = self.generator.ok_or(SearchError::MissingComponent("chromosome generator"))?;
        let stopping_condition = self
            .stopping_condition
            .ok_or(SearchError::MissingComponent("stopping condition"))?;
        if self.fitness_functions.is_empty() {
            return Err(SearchError::MissingComponent("fitness functions"));
        }
        debug!(
            "building {:?} over {} goals",
            self.algorithm,
            self.fitness_functions.len()
        );

        let mut components =
            SearchComponents::new(generator, self.evaluator, stopping_condition, self.fitness_functions);
        components.local_search = self.local_search;

        Ok(match self.algorithm {
            AlgorithmKind::Random => Box::new(RandomSearch::new(components)),
            AlgorithmKind::OnePlusOne => Box::new(OnePlusOneEA::new(components)),
            AlgorithmKind::SimpleGa => Box::new(SimpleGA::new(components, self.properties, self.selection)),
            AlgorithmKind::Mosa => Box::new(Mosa::new(components, self.properties, self.selection)),
            AlgorithmKind::Mio => {
                if let Some(key) = components.fitness_functions.keys().find(|k| !self.heuristics.contains_key(*k)) {
                    return Err(SearchError::InvalidArgument(format!("goal {key} has no heuristic")));
                }
                let mio = Mio::new(components, self.mio_properties, self.heuristics);
                match self.independent_goals {
                    Some(keys) => Box::new(mio.with_independent_goals(keys)),
                    None => Box::new(mio),
                }
            }
            AlgorithmKind::Neat => {
                return Err(SearchError::InvalidArgument(String::from(
                    "NEAT searches over networks and is built with Neat::new",
                )));
            }
        })
    }
}

impl SearchAlgorithmBuilder<BitstringChromosome> {
    /// One OneMax goal per bit, heuristic `v / length`.
    #[must_use]
    pub fn with_one_max_fitness(mut self, length: usize) -> Self {
        for key in 0..length {
            let function = Rc::new(OneMaxFitnessFunction::new(length));
            self = self.add_fitness_function(key, function, fraction_of(length));
        }
        self
    }

    /// One goal per bit position, heuristic `v / length`.
    pub fn with_single_bit_fitness(mut self, length: usize) -> Result<Self> {
        for key in 0..length {
            let function = Rc::new(SingleBitFitnessFunction::new(length, key)?);
            self = self.add_fitness_function(key, function, fraction_of(length));
        }
        Ok(self)
    }
}

impl<C: Chromosome + HasTrace> SearchAlgorithmBuilder<C> {
    /// One goal per statement, keyed in order, heuristic `1 / (1 + v)`.
    /// The program's independent statements become the independent goals.
    #[must_use]
    pub fn with_statement_fitness(mut self, functions: Vec<StatementFitnessFunction<C>>) -> Self {
        let independent = StatementFitnessFunction::independent_statements(&functions);
        debug!("{} of {} statements are independent", independent.len(), functions.len());
        self = self.add_independent_goals(independent);
        for (key, function) in functions.into_iter().enumerate() {
            let function: Rc<dyn FitnessFunction<C>> = Rc::new(function);
            self = self.add_fitness_function(key, function, Rc::new(|v: f64| 1.0 / (1.0 + v)));
        }
        self
    }
}

fn fraction_of(length: usize) -> Heuristic {
    let length = length.max(1) as f64;
    Rc::new(move |v: f64| v / length)
}
