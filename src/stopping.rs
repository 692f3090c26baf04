//! Predicates deciding when a search stops.

use std::time::Duration;

use crate::{Chromosome, Result, SearchState};

/// Pluggable termination test, also reporting progress in `[0, 1]`.
pub trait StoppingCondition<C> {
    fn is_finished(&self, state: &dyn SearchState<C>) -> Result<bool>;

    fn progress(&self, state: &dyn SearchState<C>) -> Result<f64>;
}

/// Stops after a number of iterations.
#[derive(Clone, Copy, Debug)]
pub struct FixedIterationsStoppingCondition {
    max_iterations: usize,
}

impl FixedIterationsStoppingCondition {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

impl<C> StoppingCondition<C> for FixedIterationsStoppingCondition {
    fn is_finished(&self, state: &dyn SearchState<C>) -> Result<bool> {
        Ok(state.iterations() >= self.max_iterations)
    }

    fn progress(&self, state: &dyn SearchState<C>) -> Result<f64> {
        if self.max_iterations == 0 {
            return Ok(1.0);
        }
        Ok((state.iterations() as f64 / self.max_iterations as f64).min(1.0))
    }
}

/// Stops once a wall-clock budget is spent.
#[derive(Clone, Copy, Debug)]
pub struct FixedTimeStoppingCondition {
    max_time: Duration,
}

impl FixedTimeStoppingCondition {
    pub fn new(max_time: Duration) -> Self {
        Self { max_time }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }
}

impl<C> StoppingCondition<C> for FixedTimeStoppingCondition {
    fn is_finished(&self, state: &dyn SearchState<C>) -> Result<bool> {
        Ok(state.start_time().elapsed() >= self.max_time)
    }

    fn progress(&self, state: &dyn SearchState<C>) -> Result<f64> {
        if self.max_time.is_zero() {
            return Ok(1.0);
        }
        let ratio = state.start_time().elapsed().as_secs_f64() / self.max_time.as_secs_f64();
        Ok(ratio.min(1.0))
    }
}

/// Stops once every goal is optimal for some member of the current solution.
#[derive(Clone, Copy, Debug, Default)]
pub struct OptimalSolutionStoppingCondition;

impl OptimalSolutionStoppingCondition {
    fn covered<C: Chromosome>(state: &dyn SearchState<C>) -> Result<(usize, usize)> {
        let mut covered = 0;
        let mut total = 0;
        for function in state.fitness_functions().values() {
            total += 1;
            for solution in state.current_solution() {
                if function.is_optimal(solution.get_fitness(function)?) {
                    covered += 1;
                    break;
                }
            }
        }
        Ok((covered, total))
    }
}

impl<C: Chromosome> StoppingCondition<C> for OptimalSolutionStoppingCondition {
    fn is_finished(&self, state: &dyn SearchState<C>) -> Result<bool> {
        let (covered, total) = Self::covered(state)?;
        Ok(covered == total)
    }

    fn progress(&self, state: &dyn SearchState<C>) -> Result<f64> {
        let (covered, total) = Self::covered(state)?;
        if total == 0 {
            return Ok(1.0);
        }
        Ok(covered as f64 / total as f64)
    }
}

/// Finished as soon as any member is finished.
pub struct OneOfStoppingCondition<C> {
    conditions: Vec<Box<dyn StoppingCondition<C>>>,
}

impl<C> OneOfStoppingCondition<C> {
    pub fn new(conditions: Vec<Box<dyn StoppingCondition<C>>>) -> Self {
        Self { conditions }
    }
}

impl<C> StoppingCondition<C> for OneOfStoppingCondition<C> {
    fn is_finished(&self, state: &dyn SearchState<C>) -> Result<bool> {
        for condition in &self.conditions {
            if condition.is_finished(state)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn progress(&self, state: &dyn SearchState<C>) -> Result<f64> {
        let mut max = 0.0f64;
        for condition in &self.conditions {
            max = max.max(condition.progress(state)?);
        }
        Ok(max)
    }
}

/// Finished only when every member is finished.
pub struct AllOfStoppingCondition<C> {
    conditions: Vec<Box<dyn StoppingCondition<C>>>,
}

impl<C> AllOfStoppingCondition<C> {
    pub fn new(conditions: Vec<Box<dyn StoppingCondition<C>>>) -> Self {
        Self { conditions }
    }
}

impl<C> StoppingCondition<C> for AllOfStoppingCondition<C> {
    fn is_finished(&self, state: &dyn SearchState<C>) -> Result<bool> {
        for condition in &self.conditions {
            if !condition.is_finished(state)? {
                return Ok(false);
            }
        }
        Ok(!self.conditions.is_empty())
    }

    fn progress(&self, state: &dyn SearchState<C>) -> Result<f64> {
        if self.conditions.is_empty() {
            return Ok(0.0);
        }
        let mut min = 1.0f64;
        for condition in &self.conditions {
            min = min.min(condition.progress(state)?);
        }
        Ok(min)
    }
}
