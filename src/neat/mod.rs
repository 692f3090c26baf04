//! Neuroevolution of augmenting topologies.
//!
//! Networks are evolved instead of event sequences: a network observes the
//! program's sprite features and decides which event to send next, so one
//! network can react to nondeterministic programs.
//!
//! # Layout
//!
//! - [`gene`]: node and connection genes, activation functions.
//! - [`registry`]: the innovation registry shared by a population. It hands
//!   out one innovation number per structural link and one node id per
//!   feature, event, parameter and split connection, so genomes of the same
//!   population can be aligned.
//! - [`network`]: [`NetworkChromosome`], its activation and runtime growth.
//! - [`mutation`] and [`crossover`]: the NEAT operators.
//! - [`species`] and [`population`]: speciation, fitness sharing and
//!   reproduction.
//! - [`generator`]: initial networks wired `fully`, `fullyHidden` or
//!   `sparse`.
//! - [`executor`] and [`fitness`]: playing the program with a network and
//!   rating the playthrough.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use whisker_search::neat::{
//!     InnovationRegistry, NeatProperties, NetworkChromosomeGenerator, SpriteFeatures,
//! };
//! use whisker_search::testcase::Event;
//! use whisker_search::{ChromosomeGenerator, Randomness};
//!
//! let mut features = SpriteFeatures::new();
//! features.insert(
//!     "Player".to_string(),
//!     BTreeMap::from([("X".to_string(), 0.5), ("Y".to_string(), -0.5)]),
//! );
//! let events = vec![Event::wait(), Event::action("KeyPress:right", vec![])];
//!
//! let properties = NeatProperties::default();
//! let mut generator =
//!     NetworkChromosomeGenerator::new(&features, events.clone(), &properties, InnovationRegistry::shared());
//! let mut rng = Randomness::new(42);
//! let mut network = generator.get(&mut rng);
//!
//! assert!(network.activate_settled(&features));
//! assert!(network.classify(&events) < events.len());
//! ```

pub mod crossover;
pub mod executor;
pub mod fitness;
pub mod gene;
pub mod generator;
pub mod mutation;
pub mod network;
pub mod population;
pub mod properties;
pub mod registry;
pub mod species;

pub use crossover::NeatCrossover;
pub use executor::NetworkExecutor;
pub use fitness::{
    CombinedNetworkFitness, KeywordScoringStrategy, NetworkFitnessFunction, NoveltyFitness,
    ReliableStatementFitness, ScoreFitness, ScoringStrategy, StatementNetworkFitness, SurviveFitness,
};
pub use gene::{ActivationFunction, ConnectionGene, NodeGene, NodeRole, NodeState};
pub use generator::NetworkChromosomeGenerator;
pub use mutation::NeatMutation;
pub use network::{NetworkChromosome, NetworkGenome, SpriteFeatures, ACTIVATION_CAP};
pub use population::NeatPopulation;
pub use properties::{EventSelection, NeatProperties, NetworkTopology};
pub use registry::{InnovationRegistry, SharedRegistry};
pub use species::{compatibility_distance, Species};
