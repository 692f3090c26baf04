//! Network fitness: how well a network played, as opposed to the per-goal
//! [`FitnessFunction`](crate::FitnessFunction)s kept in the archive.

use std::collections::VecDeque;

use log::debug;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::neat::executor::NetworkExecutor;
use crate::neat::network::NetworkChromosome;
use crate::neat::properties::EventSelection;
use crate::position::Position2D;
use crate::testcase::{HasTrace, ProgramUnderTest};
use crate::{cmp_f64_nan_last, Chromosome, FitnessRef, Result, SearchContext, SearchError};

/// Turns the program's variables into a game score.
pub trait ScoringStrategy {
    fn score(&self, variables: &[(String, f64)]) -> f64;
}

/// Sums the absolute values of variables that look like score counters:
/// names containing a score keyword, or equal to a progress keyword.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordScoringStrategy;

impl KeywordScoringStrategy {
    const CONTAINS: [&'static str; 6] = ["punkte", "points", "score", "level", "hits", "treffer"];
    const EXACT: [&'static str; 4] = ["distance", "länge", "geimpfte", "progress"];

    pub fn is_score_variable(name: &str) -> bool {
        let name = name.to_lowercase();
        Self::CONTAINS.iter().any(|k| name.contains(k)) || Self::EXACT.contains(&name.as_str())
    }
}

impl ScoringStrategy for KeywordScoringStrategy {
    fn score(&self, variables: &[(String, f64)]) -> f64 {
        variables
            .iter()
            .filter(|(name, _)| Self::is_score_variable(name))
            .map(|(_, value)| value.abs())
            .sum()
    }
}

/// Rates a network by playing the program with it.
pub trait NetworkFitnessFunction<P: ProgramUnderTest> {
    /// Plays once and stores the result as the network fitness.
    fn get_fitness(
        &mut self,
        executor: &mut NetworkExecutor<P>,
        network: &mut NetworkChromosome,
        ctx: &mut SearchContext,
    ) -> Result<f64> {
        executor.execute(network, ctx)?;
        let fitness = self.get_fitness_without_playing(network)?;
        network.set_network_fitness(fitness);
        Ok(fitness)
    }

    /// Fitness of the last playthrough recorded in `network`.
    fn get_fitness_without_playing(&mut self, network: &NetworkChromosome) -> Result<f64>;

    /// Positive when `value1` is better.
    fn compare(&self, value1: f64, value2: f64) -> f64 {
        value1 - value2
    }
}

/// The game score; negative scores count as 0.01.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScoreFitness;

impl<P: ProgramUnderTest> NetworkFitnessFunction<P> for ScoreFitness {
    fn get_fitness_without_playing(&mut self, network: &NetworkChromosome) -> Result<f64> {
        let score = network.score();
        Ok(if score < 0.0 { 0.01 } else { score })
    }
}

/// Survived play time in tenths of a second.
#[derive(Clone, Copy, Debug, Default)]
pub struct SurviveFitness;

impl<P: ProgramUnderTest> NetworkFitnessFunction<P> for SurviveFitness {
    fn get_fitness_without_playing(&mut self, network: &NetworkChromosome) -> Result<f64> {
        Ok((network.play_time_ms() as f64 / 100.0).round())
    }
}

/// Sum of several network fitness functions over a single playthrough.
pub struct CombinedNetworkFitness<P> {
    components: Vec<Box<dyn NetworkFitnessFunction<P>>>,
}

impl<P: ProgramUnderTest> CombinedNetworkFitness<P> {
    pub fn new(components: Vec<Box<dyn NetworkFitnessFunction<P>>>) -> Self {
        Self { components }
    }
}

impl<P: ProgramUnderTest> NetworkFitnessFunction<P> for CombinedNetworkFitness<P> {
    fn get_fitness_without_playing(&mut self, network: &NetworkChromosome) -> Result<f64> {
        let mut sum = 0.0;
        for component in &mut self.components {
            sum += component.get_fitness_without_playing(network)?;
        }
        Ok(sum)
    }
}

/// Number of statements covered in the last playthrough.
pub struct StatementNetworkFitness {
    statements: Vec<FitnessRef<NetworkChromosome>>,
}

impl StatementNetworkFitness {
    pub fn new(statements: Vec<FitnessRef<NetworkChromosome>>) -> Self {
        Self { statements }
    }
}

fn covers(network: &NetworkChromosome, statement: &FitnessRef<NetworkChromosome>) -> Result<bool> {
    Ok(statement.is_optimal(network.get_fitness(statement)?))
}

impl<P: ProgramUnderTest> NetworkFitnessFunction<P> for StatementNetworkFitness {
    fn get_fitness_without_playing(&mut self, network: &NetworkChromosome) -> Result<f64> {
        let mut covered = 0;
        for statement in &self.statements {
            if covers(network, statement)? {
                covered += 1;
            }
        }
        Ok(covered as f64)
    }
}

/// Rewards covering the network's target statement repeatedly.
///
/// The target is read from each network, see
/// [`NetworkChromosome::target_fitness`]; a network without one is an
/// error. An uncovering playthrough scores `1 / d` for target fitness `d`.
/// A covering one scores 1 and is replayed under `stable_count - 1` fresh
/// seeds, each further cover adding 1; the first miss adds `1 / d` and ends
/// the check. Replays leave no trace: the network's playthrough data and
/// the evaluation counter are restored afterwards.
pub struct ReliableStatementFitness {
    stable_count: usize,
}

impl ReliableStatementFitness {
    pub fn new(stable_count: usize) -> Self {
        Self { stable_count }
    }

    pub fn stable_count(&self) -> usize {
        self.stable_count
    }

    fn target_of(network: &NetworkChromosome) -> Result<FitnessRef<NetworkChromosome>> {
        network
            .target_fitness()
            .cloned()
            .ok_or_else(|| SearchError::InvalidArgument(String::from("network has no target statement")))
    }

    fn partial(network: &NetworkChromosome, target: &FitnessRef<NetworkChromosome>) -> Result<f64> {
        let distance = network.get_fitness(target)?;
        if target.is_optimal(distance) {
            Ok(1.0)
        } else if distance > 0.0 {
            Ok(1.0 / distance)
        } else {
            Ok(0.0)
        }
    }

    fn check_stable_coverage<P: ProgramUnderTest>(
        &self,
        executor: &mut NetworkExecutor<P>,
        network: &mut NetworkChromosome,
        target: &FitnessRef<NetworkChromosome>,
        ctx: &mut SearchContext,
    ) -> Result<f64> {
        let score = network.score();
        let play_time = network.play_time_ms();
        let position = network.final_position();
        let trace = network.trace().cloned().unwrap_or_default();
        let coverage = network.coverage().clone();
        let codons = network.codons().to_vec();
        let evaluations = ctx.statistics.number_fitness_evaluations;

        let mut fitness = 1.0;
        for _ in 1..self.stable_count {
            let seed = ctx.rng.next_int(0, i64::MAX) as u64;
            if executor.event_selection() == EventSelection::Random {
                executor.execute_saved_trace(network, seed, ctx)?;
            } else {
                executor.execute_seeded(network, seed, ctx)?;
            }
            let covered = covers(network, target)?;
            fitness += Self::partial(network, target)?;
            if !covered {
                break;
            }
        }

        network.set_outcome(score, play_time, position);
        network.set_execution(trace, coverage);
        *network.codons_mut() = codons;
        ctx.statistics.number_fitness_evaluations = evaluations;
        debug!("{}: reliable fitness {fitness}", target.describe());
        Ok(fitness)
    }
}

impl<P: ProgramUnderTest> NetworkFitnessFunction<P> for ReliableStatementFitness {
    fn get_fitness(
        &mut self,
        executor: &mut NetworkExecutor<P>,
        network: &mut NetworkChromosome,
        ctx: &mut SearchContext,
    ) -> Result<f64> {
        let target = Self::target_of(network)?;
        executor.execute(network, ctx)?;
        let fitness = if covers(network, &target)? {
            self.check_stable_coverage(executor, network, &target, ctx)?
        } else {
            Self::partial(network, &target)?
        };
        network.set_network_fitness(fitness);
        Ok(fitness)
    }

    fn get_fitness_without_playing(&mut self, network: &NetworkChromosome) -> Result<f64> {
        Self::partial(network, &Self::target_of(network)?)
    }
}

/// Sparseness of the final player position: mean distance to the `k`
/// nearest behaviours among the archive and the most recent playthroughs.
///
/// Behaviours sparser than `archive_threshold` enter the archive; once it
/// holds `archive_limit` behaviours the oldest one is dropped. Without any
/// neighbour the sparseness is the stage diagonal; networks without a
/// player position score 0.
pub struct NoveltyFitness {
    neighbour_count: usize,
    archive_threshold: f64,
    window: usize,
    archive_limit: usize,
    archive: Vec<Position2D>,
    recent: VecDeque<Position2D>,
}

impl NoveltyFitness {
    pub const DEFAULT_ARCHIVE_LIMIT: usize = 1_000;

    pub fn new(neighbour_count: usize, archive_threshold: f64, window: usize) -> Self {
        Self {
            neighbour_count: neighbour_count.max(1),
            archive_threshold,
            window,
            archive_limit: Self::DEFAULT_ARCHIVE_LIMIT,
            archive: Vec::new(),
            recent: VecDeque::with_capacity(window),
        }
    }

    #[must_use]
    pub fn with_archive_limit(mut self, limit: usize) -> Self {
        self.archive_limit = limit.max(1);
        self
    }

    pub fn archive(&self) -> &[Position2D] {
        &self.archive
    }

    pub fn sparseness(&self, position: Position2D) -> f64 {
        let neighbours: Vec<Position2D> = self.archive.iter().chain(self.recent.iter()).copied().collect();

        #[cfg(feature = "parallel")]
        let mut distances: Vec<f64> = neighbours.par_iter().map(|n| n.distance_to(&position)).collect();

        #[cfg(not(feature = "parallel"))]
        let mut distances: Vec<f64> = neighbours.iter().map(|n| n.distance_to(&position)).collect();

        if distances.is_empty() {
            return Position2D::stage_diagonal();
        }
        distances.sort_by(|a, b| cmp_f64_nan_last(*a, *b));
        let k = self.neighbour_count.min(distances.len());
        distances[..k].iter().sum::<f64>() / k as f64
    }

    fn remember(&mut self, position: Position2D, sparseness: f64) {
        if sparseness > self.archive_threshold {
            if self.archive.len() == self.archive_limit {
                self.archive.remove(0);
            }
            self.archive.push(position);
        }
        if self.window > 0 {
            if self.recent.len() == self.window {
                self.recent.pop_front();
            }
            self.recent.push_back(position);
        }
    }
}

impl<P: ProgramUnderTest> NetworkFitnessFunction<P> for NoveltyFitness {
    fn get_fitness_without_playing(&mut self, network: &NetworkChromosome) -> Result<f64> {
        let Some(position) = network.final_position() else {
            return Ok(0.0);
        };
        let sparseness = self.sparseness(position);
        self.remember(position, sparseness);
        Ok(sparseness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_scoring_matches_substrings_and_exact_names() {
        let variables = vec![
            ("Punkte".to_string(), 3.0),
            ("my score".to_string(), -2.0),
            ("distance".to_string(), 4.0),
            ("distance to goal".to_string(), 100.0),
            ("speed".to_string(), 9.0),
        ];
        assert_eq!(KeywordScoringStrategy.score(&variables), 9.0);
    }

    #[test]
    fn novelty_without_neighbours_is_the_stage_diagonal() {
        let novelty = NoveltyFitness::new(3, 10.0, 5);
        let s = novelty.sparseness(Position2D::new(0.0, 0.0));
        assert_eq!(s, Position2D::stage_diagonal());
    }

    #[test]
    fn novelty_averages_nearest_neighbours() {
        let mut novelty = NoveltyFitness::new(2, 1000.0, 10);
        novelty.remember(Position2D::new(3.0, 0.0), 0.0);
        novelty.remember(Position2D::new(5.0, 0.0), 0.0);
        novelty.remember(Position2D::new(100.0, 0.0), 0.0);
        assert_eq!(novelty.sparseness(Position2D::new(0.0, 0.0)), 4.0);
        assert!(novelty.archive().is_empty());
    }

    #[test]
    fn recent_window_is_bounded() {
        let mut novelty = NoveltyFitness::new(1, 0.0, 2);
        for x in 0..5 {
            novelty.remember(Position2D::new(f64::from(x), 0.0), 1.0);
        }
        assert_eq!(novelty.recent.len(), 2);
        assert_eq!(novelty.archive().len(), 5);
    }

    #[test]
    fn archive_drops_oldest_behaviour_at_limit() {
        let mut novelty = NoveltyFitness::new(1, 0.0, 0).with_archive_limit(3);
        for x in 0..5 {
            novelty.remember(Position2D::new(f64::from(x), 0.0), 1.0);
        }
        let xs: Vec<Position2D> = (2..5).map(|x| Position2D::new(f64::from(x), 0.0)).collect();
        assert_eq!(novelty.archive(), xs.as_slice());
    }
}
