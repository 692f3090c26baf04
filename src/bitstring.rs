//! Fixed-length bit strings, mostly used to exercise the algorithms on
//! problems with known optima.

use std::fmt;
use std::rc::Rc;

use crate::{
    Chromosome, ChromosomeGenerator, Crossover, FitnessCache, FitnessFunction, ListChromosome,
    Mutation, Randomness, Result, SearchError,
};

#[derive(Clone)]
pub struct BitstringChromosome {
    bits: Vec<bool>,
    mutation: Rc<dyn Mutation<BitstringChromosome>>,
    crossover: Rc<dyn Crossover<BitstringChromosome>>,
    cache: FitnessCache,
}

impl BitstringChromosome {
    pub fn new(
        bits: Vec<bool>,
        mutation: Rc<dyn Mutation<BitstringChromosome>>,
        crossover: Rc<dyn Crossover<BitstringChromosome>>,
    ) -> Self {
        Self {
            bits,
            mutation,
            crossover,
            cache: FitnessCache::new(),
        }
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }
}

impl fmt::Debug for BitstringChromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = self.bits.iter().map(|&b| if b { '1' } else { '0' }).collect();
        write!(f, "BitstringChromosome({s})")
    }
}

impl Chromosome for BitstringChromosome {
    fn len(&self) -> usize {
        self.bits.len()
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
        self.bits == other.bits
    }
}

impl ListChromosome for BitstringChromosome {
    type Gene = bool;

    fn genes(&self) -> &[bool] {
        &self.bits
    }

    fn clone_with(&self, genes: Vec<bool>) -> Self {
        Self::new(genes, Rc::clone(&self.mutation), Rc::clone(&self.crossover))
    }
}

/// Flips each bit with probability `1 / len`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BitflipMutation;

impl Mutation<BitstringChromosome> for BitflipMutation {
    fn apply(&self, chromosome: &BitstringChromosome, rng: &mut Randomness) -> BitstringChromosome {
        let len = chromosome.len();
        let probability = 1.0 / len.max(1) as f64;
        let bits = chromosome
            .bits
            .iter()
            .map(|&bit| if rng.next_double() < probability { !bit } else { bit })
            .collect();
        chromosome.clone_with(bits)
    }
}

pub struct BitstringChromosomeGenerator {
    length: usize,
    mutation: Rc<dyn Mutation<BitstringChromosome>>,
    crossover: Rc<dyn Crossover<BitstringChromosome>>,
}

impl BitstringChromosomeGenerator {
    pub fn new(
        length: usize,
        mutation: Rc<dyn Mutation<BitstringChromosome>>,
        crossover: Rc<dyn Crossover<BitstringChromosome>>,
    ) -> Self {
        Self {
            length,
            mutation,
            crossover,
        }
    }
}

impl ChromosomeGenerator<BitstringChromosome> for BitstringChromosomeGenerator {
    fn get(&mut self, rng: &mut Randomness) -> BitstringChromosome {
        let bits = (0..self.length).map(|_| rng.random_bool()).collect();
        BitstringChromosome::new(bits, Rc::clone(&self.mutation), Rc::clone(&self.crossover))
    }
}

fn check_size(chromosome: &BitstringChromosome, size: usize) -> Result<()> {
    if chromosome.len() != size {
        return Err(SearchError::InvalidArgument(format!(
            "expected {size} bits, got {}",
            chromosome.len()
        )));
    }
    Ok(())
}

/// Number of set bits. Optimal when every bit is set.
#[derive(Clone, Copy, Debug)]
pub struct OneMaxFitnessFunction {
    size: usize,
}

impl OneMaxFitnessFunction {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl FitnessFunction<BitstringChromosome> for OneMaxFitnessFunction {
    fn get_fitness(&self, chromosome: &BitstringChromosome) -> Result<f64> {
        check_size(chromosome, self.size)?;
        Ok(chromosome.count_ones() as f64)
    }

    fn compare(&self, value1: f64, value2: f64) -> f64 {
        value1 - value2
    }

    fn is_optimal(&self, value: f64) -> bool {
        value == self.size as f64
    }

    fn describe(&self) -> String {
        format!("OneMax({})", self.size)
    }
}

/// Number of positions agreeing with "only bit `position` is set".
#[derive(Clone, Copy, Debug)]
pub struct SingleBitFitnessFunction {
    size: usize,
    position: usize,
}

impl SingleBitFitnessFunction {
    pub fn new(size: usize, position: usize) -> Result<Self> {
        if position >= size {
            return Err(SearchError::InvalidArgument(format!(
                "bit {position} outside of a {size}-bit string"
            )));
        }
        Ok(Self { size, position })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl FitnessFunction<BitstringChromosome> for SingleBitFitnessFunction {
    fn get_fitness(&self, chromosome: &BitstringChromosome) -> Result<f64> {
        check_size(chromosome, self.size)?;
        let matching = chromosome
            .bits
            .iter()
            .enumerate()
            .filter(|&(i, &bit)| bit == (i == self.position))
            .count();
        Ok(matching as f64)
    }

    fn compare(&self, value1: f64, value2: f64) -> f64 {
        value1 - value2
    }

    fn is_optimal(&self, value: f64) -> bool {
        value == self.size as f64
    }

    fn describe(&self) -> String {
        format!("SingleBit({})", self.position)
    }
}
