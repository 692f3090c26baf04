//! Search metrics collected over one `find_solution` run.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Counters describing the progress of a search.
///
/// One collector lives in each [`SearchContext`](crate::SearchContext); it is
/// reset at the start of every search run.
#[derive(Clone, Debug)]
pub struct StatisticsCollector {
    pub fitness_function_count: usize,
    pub iteration_count: usize,
    pub covered_fitness_function_count: usize,
    pub best_coverage: f64,
    /// Events contained in the final test suite.
    pub test_event_count: usize,
    /// Events executed over the whole run.
    pub events_count: usize,
    pub best_test_suite_size: usize,
    pub created_tests_count: usize,
    pub created_tests_to_reach_full_coverage: usize,
    pub time_to_reach_full_coverage: Duration,
    pub number_fitness_evaluations: usize,
    pub highest_network_fitness: f64,
    pub best_network_score: f64,
    pub best_survive_time: f64,
    full_coverage_reached: bool,
    start_time: Instant,
    covered_over_time: BTreeMap<u64, usize>,
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self {
            fitness_function_count: 0,
            iteration_count: 0,
            covered_fitness_function_count: 0,
            best_coverage: 0.0,
            test_event_count: 0,
            events_count: 0,
            best_test_suite_size: 0,
            created_tests_count: 0,
            created_tests_to_reach_full_coverage: 0,
            time_to_reach_full_coverage: Duration::ZERO,
            number_fitness_evaluations: 0,
            highest_network_fitness: 0.0,
            best_network_score: 0.0,
            best_survive_time: 0.0,
            full_coverage_reached: false,
            start_time: Instant::now(),
            covered_over_time: BTreeMap::new(),
        }
    }
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every counter and restarts the clock.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn increment_iteration_count(&mut self) {
        self.iteration_count += 1;
    }

    pub fn increment_events_count(&mut self) {
        self.events_count += 1;
    }

    /// Records a newly covered goal, timestamped relative to the start.
    pub fn increment_covered_fitness_function_count(&mut self) {
        self.covered_fitness_function_count += 1;
        let timestamp = self.elapsed().as_millis() as u64;
        self.covered_over_time
            .insert(timestamp, self.covered_fitness_function_count);
    }

    /// Latches the cost of full coverage. Later calls are ignored.
    pub fn record_full_coverage(&mut self, created_tests: usize) {
        if !self.full_coverage_reached {
            self.full_coverage_reached = true;
            self.created_tests_to_reach_full_coverage = created_tests;
            self.time_to_reach_full_coverage = self.elapsed();
        }
    }

    /// Coverage timeline bucketed to whole seconds and forward filled.
    pub fn coverage_over_time(&self) -> BTreeMap<u64, usize> {
        let mut adjusted = BTreeMap::new();
        let mut max_time = 0;
        for (&timestamp, &count) in &self.covered_over_time {
            let rounded = ((timestamp as f64 / 1000.0).round() as u64) * 1000;
            adjusted.insert(rounded, count);
            max_time = max_time.max(rounded);
        }
        let mut last = 0;
        let mut t = 0;
        while t <= max_time {
            match adjusted.get(&t) {
                Some(&count) => last = count,
                None => {
                    adjusted.insert(t, last);
                }
            }
            t += 1000;
        }
        adjusted
    }

    /// Two-row CSV: a header row and a data row.
    pub fn as_csv(&self) -> String {
        let timeline = self.coverage_over_time();
        let mut header: Vec<String> = [
            "fitnessFunctionCount",
            "iterationCount",
            "coveredFitnessFunctionCount",
            "bestCoverage",
            "testsuiteEventCount",
            "executedEventsCount",
            "bestTestSuiteSize",
            "createdTestsCount",
            "createdTestsToReachFullCoverage",
            "timeToReachFullCoverage",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let mut data = vec![
            self.fitness_function_count.to_string(),
            self.iteration_count.to_string(),
            self.covered_fitness_function_count.to_string(),
            self.best_coverage.to_string(),
            self.test_event_count.to_string(),
            self.events_count.to_string(),
            self.best_test_suite_size.to_string(),
            self.created_tests_count.to_string(),
            self.created_tests_to_reach_full_coverage.to_string(),
            self.time_to_reach_full_coverage.as_millis().to_string(),
        ];
        for (timestamp, count) in timeline {
            header.push(timestamp.to_string());
            data.push(count.to_string());
        }
        format!("{}\n{}", header.join(","), data.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_has_matching_columns() {
        let mut stats = StatisticsCollector::new();
        stats.fitness_function_count = 4;
        stats.increment_covered_fitness_function_count();
        let csv = stats.as_csv();
        let rows: Vec<_> = csv.lines().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].split(',').count(), rows[1].split(',').count());
        assert!(rows[0].starts_with("fitnessFunctionCount,iterationCount"));
        assert!(rows[1].starts_with("4,0,1"));
    }

    #[test]
    fn timeline_is_forward_filled() {
        let mut stats = StatisticsCollector::new();
        stats.covered_over_time.insert(400, 1);
        stats.covered_over_time.insert(2600, 3);
        let timeline = stats.coverage_over_time();
        assert_eq!(timeline.get(&0), Some(&1));
        assert_eq!(timeline.get(&1000), Some(&1));
        assert_eq!(timeline.get(&2000), Some(&1));
        assert_eq!(timeline.get(&3000), Some(&3));
    }

    #[test]
    fn full_coverage_latches_once() {
        let mut stats = StatisticsCollector::new();
        stats.record_full_coverage(100);
        stats.record_full_coverage(500);
        assert_eq!(stats.created_tests_to_reach_full_coverage, 100);
    }
}
