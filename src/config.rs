//! JSON search configuration.
//!
//! Mirrors the configuration files of the test generator: camelCase keys,
//! algorithm specific sections optional.

use serde::{Deserialize, Serialize};

use crate::neat::NeatProperties;
use crate::stopping::{
    FixedIterationsStoppingCondition, FixedTimeStoppingCondition, OneOfStoppingCondition,
    OptimalSolutionStoppingCondition, StoppingCondition,
};
use crate::{Chromosome, Result, SearchError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlgorithmKind {
    Random,
    OnePlusOne,
    #[serde(rename = "simpleGA")]
    SimpleGa,
    Mosa,
    Mio,
    Neat,
}

/// A parameter annealed from `start` to `focused_phase`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRange<T> {
    pub start: T,
    pub focused_phase: T,
}

impl<T> PhaseRange<T> {
    pub fn new(start: T, focused_phase: T) -> Self {
        Self { start, focused_phase }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneticAlgorithmProperties {
    pub population_size: usize,
    pub crossover_probability: f64,
    pub mutation_probability: f64,
}

impl Default for GeneticAlgorithmProperties {
    fn default() -> Self {
        Self {
            population_size: 50,
            crossover_probability: 0.8,
            mutation_probability: 0.2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MioProperties {
    pub max_archive_size: PhaseRange<usize>,
    pub max_mutation_count: PhaseRange<usize>,
    pub selection_probability: PhaseRange<f64>,
    /// Fraction of the budget after which the focused phase starts.
    pub start_of_focused_phase: f64,
}

impl Default for MioProperties {
    fn default() -> Self {
        Self {
            max_archive_size: PhaseRange::new(10, 1),
            max_mutation_count: PhaseRange::new(1, 10),
            selection_probability: PhaseRange::new(0.5, 0.0),
            start_of_focused_phase: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegerRange {
    pub min: i64,
    pub max: i64,
}

impl Default for IntegerRange {
    fn default() -> Self {
        Self { min: 0, max: 420 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChromosomeConfig {
    pub max_length: usize,
    pub min_initial_length: usize,
    pub max_initial_length: usize,
}

impl Default for ChromosomeConfig {
    fn default() -> Self {
        Self {
            max_length: 20,
            min_initial_length: 2,
            max_initial_length: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationOperator {
    BitFlip,
    #[default]
    IntegerList,
    VariableLength,
    BiasedVariableLength,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MutationConfig {
    pub operator: MutationOperator,
    pub probability: f64,
    pub gaussian_mutation_power: f64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            operator: MutationOperator::default(),
            probability: 0.2,
            gaussian_mutation_power: 5.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CrossoverOperator {
    #[default]
    SinglePoint,
    SinglePointRelative,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrossoverConfig {
    pub operator: CrossoverOperator,
    pub probability: f64,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            operator: CrossoverOperator::default(),
            probability: 0.8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "operator")]
pub enum SelectionConfig {
    Rank,
    #[serde(rename_all = "camelCase")]
    Tournament { tournament_size: usize },
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self::Rank
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum StoppingConditionConfig {
    FixedIteration { iterations: usize },
    /// Duration in milliseconds.
    FixedTime { duration: u64 },
    Optimal,
    Combined { conditions: Vec<StoppingConditionConfig> },
}

impl StoppingConditionConfig {
    pub fn build<C: Chromosome>(&self) -> Result<Box<dyn StoppingCondition<C>>> {
        Ok(match self {
            Self::FixedIteration { iterations } => Box::new(FixedIterationsStoppingCondition::new(*iterations)),
            Self::FixedTime { duration } => Box::new(FixedTimeStoppingCondition::from_millis(*duration)),
            Self::Optimal => Box::new(OptimalSolutionStoppingCondition),
            Self::Combined { conditions } => {
                if conditions.is_empty() {
                    return Err(SearchError::InvalidArgument(String::from(
                        "combined stopping condition without members",
                    )));
                }
                let members = conditions.iter().map(|c| c.build()).collect::<Result<Vec<_>>>()?;
                Box::new(OneOfStoppingCondition::new(members))
            }
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum LocalSearchConfig {
    #[serde(rename_all = "camelCase")]
    Extension {
        probability: f64,
        #[serde(default = "default_depleted_resources_threshold")]
        depleted_resources_threshold: f64,
        #[serde(default = "default_generation_interval")]
        generation_interval: usize,
    },
    Reduction { probability: f64 },
}

fn default_depleted_resources_threshold() -> f64 {
    0.1
}

fn default_generation_interval() -> usize {
    1
}

/// Top-level search configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    pub algorithm: AlgorithmKind,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    #[serde(default)]
    pub chromosome: ChromosomeConfig,
    #[serde(default)]
    pub integer_range: IntegerRange,
    #[serde(default)]
    pub mutation: MutationConfig,
    #[serde(default)]
    pub crossover: CrossoverConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Upper bound on each uncovered goal's MIO population.
    #[serde(default = "default_archive")]
    pub archive: PhaseRange<usize>,
    #[serde(default = "default_mutation_count")]
    pub mutation_count: PhaseRange<usize>,
    #[serde(default = "default_random_selection_probability")]
    pub random_selection_probability: PhaseRange<f64>,
    #[serde(default = "default_start_of_focused_phase")]
    pub start_of_focused_phase: f64,
    /// Steps a wait codon appended by local search lasts.
    #[serde(default = "default_wait_step_upper_bound")]
    pub wait_step_upper_bound: i64,
    pub stopping_condition: StoppingConditionConfig,
    #[serde(default)]
    pub local_search: Vec<LocalSearchConfig>,
    #[serde(default)]
    pub neat: NeatProperties,
}

fn default_population_size() -> usize {
    GeneticAlgorithmProperties::default().population_size
}

fn default_archive() -> PhaseRange<usize> {
    MioProperties::default().max_archive_size
}

fn default_mutation_count() -> PhaseRange<usize> {
    MioProperties::default().max_mutation_count
}

fn default_random_selection_probability() -> PhaseRange<f64> {
    MioProperties::default().selection_probability
}

fn default_start_of_focused_phase() -> f64 {
    MioProperties::default().start_of_focused_phase
}

fn default_wait_step_upper_bound() -> i64 {
    200
}

impl SearchConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let probabilities = [
            ("mutation.probability", self.mutation.probability),
            ("crossover.probability", self.crossover.probability),
            ("randomSelectionProbability.start", self.random_selection_probability.start),
            (
                "randomSelectionProbability.focusedPhase",
                self.random_selection_probability.focused_phase,
            ),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(SearchError::InvalidArgument(format!("{name} must lie in [0, 1], got {value}")));
            }
        }
        if self.integer_range.min > self.integer_range.max {
            return Err(SearchError::InvalidArgument(String::from("integerRange.min exceeds max")));
        }
        Ok(())
    }

    pub fn stopping_condition<C: Chromosome>(&self) -> Result<Box<dyn StoppingCondition<C>>> {
        self.stopping_condition.build()
    }

    pub fn genetic_algorithm_properties(&self) -> GeneticAlgorithmProperties {
        GeneticAlgorithmProperties {
            population_size: self.population_size,
            crossover_probability: self.crossover.probability,
            mutation_probability: self.mutation.probability,
        }
    }

    pub fn mio_properties(&self) -> MioProperties {
        MioProperties {
            max_archive_size: self.archive,
            max_mutation_count: self.mutation_count,
            selection_probability: self.random_selection_probability,
            start_of_focused_phase: self.start_of_focused_phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIO_CONFIG: &str = r#"{
        "algorithm": "mio",
        "seed": 7,
        "chromosome": { "maxLength": 30 },
        "integerRange": { "min": 0, "max": 100 },
        "mutation": { "operator": "variableLength", "probability": 0.5 },
        "archive": { "start": 8, "focusedPhase": 2 },
        "mutationCount": { "start": 1, "focusedPhase": 5 },
        "randomSelectionProbability": { "start": 0.4, "focusedPhase": 0.1 },
        "startOfFocusedPhase": 0.6,
        "stoppingCondition": {
            "type": "combined",
            "conditions": [
                { "type": "fixedIteration", "iterations": 100 },
                { "type": "optimal" }
            ]
        },
        "localSearch": [
            { "type": "reduction", "probability": 0.3 }
        ]
    }"#;

    #[test]
    fn parses_mio_configuration() {
        let config = SearchConfig::from_json(MIO_CONFIG).unwrap();
        assert_eq!(config.algorithm, AlgorithmKind::Mio);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.chromosome.max_length, 30);
        assert_eq!(config.mutation.operator, MutationOperator::VariableLength);
        let mio = config.mio_properties();
        assert_eq!(mio.max_archive_size, PhaseRange::new(8, 2));
        assert_eq!(mio.max_mutation_count.focused_phase, 5);
        assert_eq!(mio.start_of_focused_phase, 0.6);
        assert_eq!(config.local_search, vec![LocalSearchConfig::Reduction { probability: 0.3 }]);
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = SearchConfig::from_json(
            r#"{ "algorithm": "simpleGA", "stoppingCondition": { "type": "fixedTime", "duration": 1000 } }"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, AlgorithmKind::SimpleGa);
        assert_eq!(config.population_size, 50);
        assert_eq!(config.selection, SelectionConfig::Rank);
        assert!(config.local_search.is_empty());
    }

    #[test]
    fn tournament_selection_carries_its_size() {
        let config = SearchConfig::from_json(
            r#"{ "algorithm": "mosa", "selection": { "operator": "tournament", "tournamentSize": 4 },
                 "stoppingCondition": { "type": "optimal" } }"#,
        )
        .unwrap();
        assert_eq!(config.selection, SelectionConfig::Tournament { tournament_size: 4 });
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let result = SearchConfig::from_json(
            r#"{ "algorithm": "random", "mutation": { "probability": 1.5 },
                 "stoppingCondition": { "type": "optimal" } }"#,
        );
        assert!(matches!(result, Err(SearchError::InvalidArgument(_))));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(SearchConfig::from_json("{"), Err(SearchError::Config(_))));
    }
}
