//! Variation and selection operators plus local search.

pub mod crossover;
pub mod local_search;
pub mod selection;

pub use crossover::{SinglePointCrossover, SinglePointRelativeCrossover};
pub use local_search::{ExtensionLocalSearch, LocalSearch, ReductionLocalSearch};
pub use selection::{RankSelection, Selection, TournamentSelection};
