//! Goal → best chromosome bookkeeping shared by all search algorithms.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::statistics::StatisticsCollector;
use crate::{Chromosome, FitnessMap, Result};

/// Collapses duplicate references, keeping first-seen order.
pub fn distinct<'a, C: 'a>(values: impl IntoIterator<Item = &'a Rc<C>>) -> Vec<Rc<C>> {
    let mut unique: Vec<Rc<C>> = Vec::new();
    for value in values {
        if !unique.iter().any(|u| Rc::ptr_eq(u, value)) {
            unique.push(Rc::clone(value));
        }
    }
    unique
}

/// Best covering chromosome per goal.
///
/// A goal's entry is only ever replaced by a chromosome that is optimal for
/// the goal and has no more genes than the incumbent. Full coverage is
/// latched the first time every goal has an entry.
#[derive(Debug)]
pub struct Archive<C> {
    entries: BTreeMap<usize, Rc<C>>,
    best_individuals: Vec<Rc<C>>,
    full_coverage_reached: bool,
}

impl<C> Default for Archive<C> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            best_individuals: Vec::new(),
            full_coverage_reached: false,
        }
    }
}

impl<C: Chromosome> Archive<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.best_individuals.clear();
        self.full_coverage_reached = false;
    }

    /// Offers `candidate` for every goal. Returns `true` if any entry changed.
    pub fn update(
        &mut self,
        candidate: &Rc<C>,
        fitness_functions: &FitnessMap<C>,
        statistics: &mut StatisticsCollector,
    ) -> Result<bool> {
        let mut changed = false;
        for (&key, function) in fitness_functions {
            let best_length = self.entries.get(&key).map_or(usize::MAX, |c| c.len());
            if candidate.len() > best_length {
                continue;
            }
            if let Some(incumbent) = self.entries.get(&key) {
                if Rc::ptr_eq(incumbent, candidate) {
                    continue;
                }
            }
            let fitness = candidate.get_fitness(function)?;
            if function.is_optimal(fitness) {
                if !self.entries.contains_key(&key) {
                    statistics.increment_covered_fitness_function_count();
                }
                self.entries.insert(key, Rc::clone(candidate));
                changed = true;
            }
        }
        if changed {
            self.refresh_best_individuals();
        }
        Ok(changed)
    }

    /// Stores `chromosome` under `key` unconditionally.
    pub fn insert(&mut self, key: usize, chromosome: Rc<C>) {
        self.entries.insert(key, chromosome);
        self.refresh_best_individuals();
    }

    pub fn remove(&mut self, key: usize) -> Option<Rc<C>> {
        let removed = self.entries.remove(&key);
        self.refresh_best_individuals();
        removed
    }

    fn refresh_best_individuals(&mut self) {
        self.best_individuals = distinct(self.entries.values());
    }

    /// Latches full coverage once every goal of `fitness_functions` is
    /// covered. Returns `true` only on the call that latches.
    pub fn latch_full_coverage(
        &mut self,
        fitness_functions: &FitnessMap<C>,
        created_tests: usize,
        statistics: &mut StatisticsCollector,
    ) -> bool {
        if self.full_coverage_reached || !self.covers_all(fitness_functions) {
            return false;
        }
        self.full_coverage_reached = true;
        statistics.record_full_coverage(created_tests);
        true
    }

    pub fn covers_all(&self, fitness_functions: &FitnessMap<C>) -> bool {
        fitness_functions.keys().all(|k| self.entries.contains_key(k))
    }

    pub fn full_coverage_reached(&self) -> bool {
        self.full_coverage_reached
    }

    pub fn get(&self, key: usize) -> Option<&Rc<C>> {
        self.entries.get(&key)
    }

    pub fn contains(&self, key: usize) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<usize, Rc<C>> {
        &self.entries
    }

    pub fn best_individuals(&self) -> &[Rc<C>] {
        &self.best_individuals
    }

    /// Goals of `fitness_functions` without an entry.
    pub fn uncovered_keys(&self, fitness_functions: &FitnessMap<C>) -> Vec<usize> {
        fitness_functions
            .keys()
            .copied()
            .filter(|k| !self.entries.contains_key(k))
            .collect()
    }
}
