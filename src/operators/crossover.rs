use crate::{Crossover, ListChromosome, Randomness};

/// Swaps the tails of two equally long parents at one random position.
///
/// Parents of different length are returned as unchanged copies.
#[derive(Clone, Copy, Debug, Default)]
pub struct SinglePointCrossover;

impl SinglePointCrossover {
    pub fn apply_at_position<C: ListChromosome>(parent1: &C, parent2: &C, position: usize) -> (C, C) {
        let genes1 = parent1.genes();
        let genes2 = parent2.genes();
        let position = position.min(genes1.len());
        let mut offspring1 = genes1[..position].to_vec();
        let mut offspring2 = genes2[..position].to_vec();
        offspring1.extend_from_slice(&genes2[position..]);
        offspring2.extend_from_slice(&genes1[position..]);
        (parent1.clone_with(offspring1), parent2.clone_with(offspring2))
    }
}

impl<C: ListChromosome> Crossover<C> for SinglePointCrossover {
    fn apply(&self, parent1: &C, parent2: &C, rng: &mut Randomness) -> (C, C) {
        if parent1.len() != parent2.len() {
            return (
                parent1.clone_with(parent1.genes().to_vec()),
                parent2.clone_with(parent2.genes().to_vec()),
            );
        }
        let position = rng.next_index(parent1.len());
        Self::apply_at_position(parent1, parent2, position)
    }
}

/// Cuts both parents at the same relative position, so parents of
/// different lengths can be recombined.
#[derive(Clone, Copy, Debug, Default)]
pub struct SinglePointRelativeCrossover;

impl SinglePointRelativeCrossover {
    fn splice<C: ListChromosome>(head: &C, tail: &C, head_end: usize, tail_start: usize) -> C {
        let mut genes = head.genes()[..head_end].to_vec();
        genes.extend_from_slice(&tail.genes()[tail_start..]);
        head.clone_with(genes)
    }
}

impl<C: ListChromosome> Crossover<C> for SinglePointRelativeCrossover {
    fn apply(&self, parent1: &C, parent2: &C, rng: &mut Randomness) -> (C, C) {
        if parent1.len() < 2 || parent2.len() < 2 {
            return (
                parent1.clone_with(parent1.genes().to_vec()),
                parent2.clone_with(parent2.genes().to_vec()),
            );
        }
        let split = rng.next_double();
        let pos1 = ((parent1.len() - 1) as f64 * split).floor() as usize + 1;
        let pos2 = ((parent2.len() - 1) as f64 * split).floor() as usize + 1;
        (
            Self::splice(parent1, parent2, pos1, pos2),
            Self::splice(parent2, parent1, pos2, pos1),
        )
    }
}
