//! Integer codon lists, the encoding behind test chromosomes.

use std::fmt;
use std::rc::Rc;

use crate::{
    Chromosome, ChromosomeGenerator, Crossover, FitnessCache, ListChromosome, Mutation, Randomness,
};

#[derive(Clone)]
pub struct IntegerListChromosome {
    codons: Vec<i64>,
    mutation: Rc<dyn Mutation<IntegerListChromosome>>,
    crossover: Rc<dyn Crossover<IntegerListChromosome>>,
    cache: FitnessCache,
}

impl IntegerListChromosome {
    pub fn new(
        codons: Vec<i64>,
        mutation: Rc<dyn Mutation<IntegerListChromosome>>,
        crossover: Rc<dyn Crossover<IntegerListChromosome>>,
    ) -> Self {
        Self {
            codons,
            mutation,
            crossover,
            cache: FitnessCache::new(),
        }
    }

    pub fn codons(&self) -> &[i64] {
        &self.codons
    }
}

impl fmt::Debug for IntegerListChromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntegerListChromosome").field(&self.codons).finish()
    }
}

impl Chromosome for IntegerListChromosome {
    fn len(&self) -> usize {
        self.codons.len()
    }

    fn mutate(&self, rng: &mut Randomness) -> Self {
        self.mutation.apply(self, rng)
    }

    fn crossover(&self, other: &Self, rng: &mut Randomness) -> (Self, Self) {
        self.crossover.apply(self, other, rng)
    }

    fn fitness_cache(&self) -> &FitnessCache {
        &self.cache
    }

    fn same_genes(&self, other: &Self) -> bool {
        self.codons == other.codons
    }
}

impl ListChromosome for IntegerListChromosome {
    type Gene = i64;

    fn genes(&self) -> &[i64] {
        &self.codons
    }

    fn clone_with(&self, genes: Vec<i64>) -> Self {
        Self::new(genes, Rc::clone(&self.mutation), Rc::clone(&self.crossover))
    }
}

/// Fixed-length codon lists drawn uniformly from `[min, max)`.
pub struct IntegerListChromosomeGenerator {
    length: usize,
    min: i64,
    max: i64,
    mutation: Rc<dyn Mutation<IntegerListChromosome>>,
    crossover: Rc<dyn Crossover<IntegerListChromosome>>,
}

impl IntegerListChromosomeGenerator {
    pub fn new(
        length: usize,
        min: i64,
        max: i64,
        mutation: Rc<dyn Mutation<IntegerListChromosome>>,
        crossover: Rc<dyn Crossover<IntegerListChromosome>>,
    ) -> Self {
        Self {
            length,
            min,
            max,
            mutation,
            crossover,
        }
    }
}

impl ChromosomeGenerator<IntegerListChromosome> for IntegerListChromosomeGenerator {
    fn get(&mut self, rng: &mut Randomness) -> IntegerListChromosome {
        let codons = (0..self.length).map(|_| rng.next_int(self.min, self.max)).collect();
        IntegerListChromosome::new(codons, Rc::clone(&self.mutation), Rc::clone(&self.crossover))
    }
}

/// Replaces each codon with probability `1 / len` by a fresh value in `[min, max)`.
#[derive(Clone, Copy, Debug)]
pub struct IntegerListMutation {
    min: i64,
    max: i64,
}

impl IntegerListMutation {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }
}

impl<C: ListChromosome<Gene = i64>> Mutation<C> for IntegerListMutation {
    fn apply(&self, chromosome: &C, rng: &mut Randomness) -> C {
        let genes = chromosome.genes();
        let probability = 1.0 / genes.len().max(1) as f64;
        let mutated = genes
            .iter()
            .map(|&codon| {
                if rng.next_double() < probability {
                    rng.next_int(self.min, self.max)
                } else {
                    codon
                }
            })
            .collect();
        chromosome.clone_with(mutated)
    }
}

/// Shared machinery of the variable-length mutations: walk the codons and,
/// at each selected index, insert, perturb or delete one codon.
#[derive(Clone, Copy, Debug)]
pub struct VariableLengthParameters {
    pub min: i64,
    pub max: i64,
    /// Upper bound on the number of codons.
    pub length: usize,
    pub gaussian_mutation_power: f64,
}

impl VariableLengthParameters {
    fn apply_up_to<C, P>(&self, chromosome: &C, max_position: usize, probability: P, rng: &mut Randomness) -> C
    where
        C: ListChromosome<Gene = i64>,
        P: Fn(usize, usize) -> f64,
    {
        let mut codons = chromosome.genes().to_vec();
        let mut index: isize = 0;
        while (index as usize) < max_position && (index as usize) < codons.len() {
            if rng.next_double() < probability(index as usize, max_position) {
                index = self.mutate_at_index(&mut codons, index, rng);
            }
            index += 1;
        }
        chromosome.clone_with(codons)
    }

    fn mutate_at_index(&self, codons: &mut Vec<i64>, index: isize, rng: &mut Randomness) -> isize {
        let position = index as usize;
        match rng.next_int(0, 3) {
            0 => {
                if codons.len() < self.length {
                    codons.insert(position, rng.next_int(self.min, self.max));
                    return index + 1;
                }
            }
            1 => codons[position] = self.gaussian_codon(codons[position], rng),
            _ => {
                if codons.len() > 1 {
                    codons.remove(position);
                    return index - 1;
                }
            }
        }
        index
    }

    /// Gaussian perturbation wrapped into `[0, max]`.
    fn gaussian_codon(&self, value: i64, rng: &mut Randomness) -> i64 {
        let sampled = rng.next_gaussian_int(value, self.gaussian_mutation_power);
        sampled.rem_euclid(self.max + 1)
    }
}

/// Every codon is selected with probability `1 / n`.
#[derive(Clone, Copy, Debug)]
pub struct VariableLengthMutation(pub VariableLengthParameters);

impl<C: ListChromosome<Gene = i64>> Mutation<C> for VariableLengthMutation {
    fn apply(&self, chromosome: &C, rng: &mut Randomness) -> C {
        self.0
            .apply_up_to(chromosome, chromosome.len(), |_, n| 1.0 / n as f64, rng)
    }
}

/// Later codons are selected more often: `2(i + 1) / (n (n + 1))`.
#[derive(Clone, Copy, Debug)]
pub struct BiasedVariableLengthMutation(pub VariableLengthParameters);

impl BiasedVariableLengthMutation {
    pub fn probability(index: usize, codons: usize) -> f64 {
        2.0 * (index + 1) as f64 / (codons * (codons + 1)) as f64
    }
}

impl<C: ListChromosome<Gene = i64>> Mutation<C> for BiasedVariableLengthMutation {
    fn apply(&self, chromosome: &C, rng: &mut Randomness) -> C {
        self.0
            .apply_up_to(chromosome, chromosome.len(), Self::probability, rng)
    }
}
