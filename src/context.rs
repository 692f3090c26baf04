use crate::randomness::Randomness;
use crate::statistics::StatisticsCollector;

/// Mutable state scoped to one search run.
///
/// Algorithms, executors and operators borrow the context instead of
/// reaching for globals, so two searches can run side by side.
#[derive(Clone, Debug, Default)]
pub struct SearchContext {
    pub rng: Randomness,
    pub statistics: StatisticsCollector,
}

impl SearchContext {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Randomness::new(seed),
            statistics: StatisticsCollector::new(),
        }
    }

    /// Clears the statistics for a fresh run. The random stream continues.
    pub fn begin_search(&mut self, fitness_function_count: usize) {
        self.statistics.reset();
        self.statistics.fitness_function_count = fitness_function_count;
    }
}
