use serde::{Deserialize, Serialize};

use crate::neat::gene::ActivationFunction;

/// How a network picks the next event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventSelection {
    /// Softmax over the classification outputs, highest share wins.
    #[default]
    Activation,
    Random,
    /// Always waits; used when the target is reached by the start event alone.
    Wait,
}

/// Initial wiring of generated networks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum NetworkTopology {
    /// Every input feeds every output.
    Fully,
    /// One hidden node per sprite between that sprite's inputs and all outputs.
    FullyHidden,
    /// Random sprite groups connected to all outputs, one more group while
    /// `rand < input_rate`.
    Sparse {
        #[serde(rename = "inputRate")]
        input_rate: f64,
    },
}

impl Default for NetworkTopology {
    fn default() -> Self {
        Self::Fully
    }
}

/// Hyperparameters of NEAT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NeatProperties {
    pub population_size: usize,
    pub number_of_species: usize,
    /// Share of a species allowed to reproduce.
    pub parents_per_species: f64,
    /// Generations without improvement before a species is penalised.
    pub penalizing_age: usize,
    /// Fitness boost of species younger than ten generations.
    pub age_significance: f64,
    /// Current speciation threshold, adapted every generation.
    pub distance_threshold: f64,
    pub excess_coefficient: f64,
    pub disjoint_coefficient: f64,
    pub weight_coefficient: f64,

    pub mutation_add_node: f64,
    pub mutation_add_connection: f64,
    pub mutate_weights: f64,
    pub mutate_toggle_enable_connection: f64,
    pub toggle_enable_connection_times: usize,
    pub mutate_enable_connection: f64,
    pub perturbation_power: f64,
    pub recurrent_connection: f64,
    pub add_connection_tries: usize,
    pub population_champion_connection_mutation: f64,

    pub crossover_without_mutation: f64,
    pub mutation_without_crossover: f64,
    pub interspecies_mating: f64,
    pub crossover_average_weights: f64,
    pub population_champion_number_clones: usize,
    pub population_champion_number_offspring: usize,

    /// Playthrough budget in program milliseconds.
    pub timeout: u64,
    pub event_selection: EventSelection,
    pub topology: NetworkTopology,
    pub hidden_activation_function: ActivationFunction,
}

impl Default for NeatProperties {
    fn default() -> Self {
        Self {
            population_size: 150,
            number_of_species: 5,
            parents_per_species: 0.2,
            penalizing_age: 15,
            age_significance: 1.0,
            distance_threshold: 3.0,
            excess_coefficient: 1.0,
            disjoint_coefficient: 1.0,
            weight_coefficient: 0.5,
            mutation_add_node: 0.03,
            mutation_add_connection: 0.05,
            mutate_weights: 0.6,
            mutate_toggle_enable_connection: 0.1,
            toggle_enable_connection_times: 1,
            mutate_enable_connection: 0.03,
            perturbation_power: 2.5,
            recurrent_connection: 0.1,
            add_connection_tries: 50,
            population_champion_connection_mutation: 0.3,
            crossover_without_mutation: 0.25,
            mutation_without_crossover: 0.25,
            interspecies_mating: 0.001,
            crossover_average_weights: 0.4,
            population_champion_number_clones: 1,
            population_champion_number_offspring: 3,
            timeout: 10_000,
            event_selection: EventSelection::default(),
            topology: NetworkTopology::default(),
            hidden_activation_function: ActivationFunction::Sigmoid,
        }
    }
}
