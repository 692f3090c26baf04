use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::testcase::trace::ExecutionTrace;
use crate::{
    Chromosome, ChromosomeGenerator, Crossover, FitnessCache, FitnessRef, ListChromosome, Mutation, Randomness,
    Result,
};

/// Anything that carries the result of executing the program under test.
pub trait HasTrace {
    fn trace(&self) -> Option<&ExecutionTrace>;

    /// Ids of the blocks executed at least once.
    fn coverage(&self) -> &BTreeSet<String>;
}

/// Codon list decoded into events by the [`TestExecutor`](super::TestExecutor).
#[derive(Clone)]
pub struct TestChromosome {
    codons: Vec<i64>,
    mutation: Rc<dyn Mutation<TestChromosome>>,
    crossover: Rc<dyn Crossover<TestChromosome>>,
    cache: FitnessCache,
    trace: Option<ExecutionTrace>,
    coverage: BTreeSet<String>,
    last_improved_coverage_codon: usize,
    last_improved_trace: Option<ExecutionTrace>,
    target_fitness: Option<FitnessRef<TestChromosome>>,
    last_improved_fitness_codon: usize,
    covered_statements: usize,
}

impl TestChromosome {
    pub fn new(
        codons: Vec<i64>,
        mutation: Rc<dyn Mutation<TestChromosome>>,
        crossover: Rc<dyn Crossover<TestChromosome>>,
    ) -> Self {
        Self {
            codons,
            mutation,
            crossover,
            cache: FitnessCache::new(),
            trace: None,
            coverage: BTreeSet::new(),
            last_improved_coverage_codon: 0,
            last_improved_trace: None,
            target_fitness: None,
            last_improved_fitness_codon: 0,
            covered_statements: 0,
        }
    }

    pub fn codons(&self) -> &[i64] {
        &self.codons
    }

    /// Extends the codons in place. Only the executor calls this, before the
    /// chromosome is shared.
    pub(crate) fn codons_mut(&mut self) -> &mut Vec<i64> {
        &mut self.codons
    }

    /// Installs the result of an execution and drops stale fitness values.
    pub fn set_execution(&mut self, trace: ExecutionTrace, coverage: BTreeSet<String>) {
        self.trace = Some(trace);
        self.coverage = coverage;
        self.cache.clear();
    }

    pub fn set_last_improvement(&mut self, codon: usize, trace: Option<ExecutionTrace>) {
        self.last_improved_coverage_codon = codon;
        self.last_improved_trace = trace;
    }

    /// Codon index after which coverage stopped growing.
    pub fn last_improved_coverage_codon(&self) -> usize {
        self.last_improved_coverage_codon
    }

    pub fn last_improved_trace(&self) -> Option<&ExecutionTrace> {
        self.last_improved_trace.as_ref()
    }

    /// Codon index after which the target fitness last improved; 0 without
    /// a target.
    pub fn last_improved_fitness_codon(&self) -> usize {
        self.last_improved_fitness_codon
    }

    pub(crate) fn set_last_improved_fitness_codon(&mut self, codon: usize) {
        self.last_improved_fitness_codon = codon;
    }

    pub fn covered_statements(&self) -> usize {
        self.covered_statements
    }

    /// Counts and stores how many of `statements` the last execution
    /// covered.
    pub fn determine_covered_statements(&mut self, statements: &[FitnessRef<TestChromosome>]) -> Result<usize> {
        let mut covered = 0;
        for statement in statements {
            if statement.is_optimal(self.get_fitness(statement)?) {
                covered += 1;
            }
        }
        self.covered_statements = covered;
        Ok(covered)
    }

    /// Number of events executed, waits included.
    pub fn event_count(&self) -> usize {
        self.trace.as_ref().map_or(0, |t| t.events.len())
    }
}

impl fmt::Debug for TestChromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestChromosome")
            .field("codons", &self.codons)
            .field("executed", &self.trace.is_some())
            .field("coverage", &self.coverage.len())
            .field("covered_statements", &self.covered_statements)
            .finish()
    }
}

impl HasTrace for TestChromosome {
    fn trace(&self) -> Option<&ExecutionTrace> {
        self.trace.as_ref()
    }

    fn coverage(&self) -> &BTreeSet<String> {
        &self.coverage
    }
}

impl Chromosome for TestChromosome {
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

    fn target_fitness(&self) -> Option<&FitnessRef<Self>> {
        self.target_fitness.as_ref()
    }

    fn set_target_fitness(&mut self, target: Option<FitnessRef<Self>>) {
        self.target_fitness = target;
    }
}

impl ListChromosome for TestChromosome {
    type Gene = i64;

    fn genes(&self) -> &[i64] {
        &self.codons
    }

    fn clone_with(&self, genes: Vec<i64>) -> Self {
        Self::new(genes, Rc::clone(&self.mutation), Rc::clone(&self.crossover))
    }
}

/// Fixed-length test chromosomes with codons in `[min, max)`.
pub struct TestChromosomeGenerator {
    length: usize,
    min: i64,
    max: i64,
    mutation: Rc<dyn Mutation<TestChromosome>>,
    crossover: Rc<dyn Crossover<TestChromosome>>,
}

impl TestChromosomeGenerator {
    pub fn new(
        length: usize,
        min: i64,
        max: i64,
        mutation: Rc<dyn Mutation<TestChromosome>>,
        crossover: Rc<dyn Crossover<TestChromosome>>,
    ) -> Self {
        Self {
            length,
            min,
            max,
            mutation,
            crossover,
        }
    }

    fn build(&self, length: usize, rng: &mut Randomness) -> TestChromosome {
        let codons = (0..length).map(|_| rng.next_int(self.min, self.max)).collect();
        TestChromosome::new(codons, Rc::clone(&self.mutation), Rc::clone(&self.crossover))
    }
}

impl ChromosomeGenerator<TestChromosome> for TestChromosomeGenerator {
    fn get(&mut self, rng: &mut Randomness) -> TestChromosome {
        self.build(self.length, rng)
    }
}

/// Draws the number of events per chromosome from
/// `[min_initial_length, max_initial_length)`; each event reserves
/// `reserved_codons` codons.
pub struct VariableLengthTestChromosomeGenerator {
    inner: TestChromosomeGenerator,
    min_initial_length: usize,
    max_initial_length: usize,
    reserved_codons: usize,
}

impl VariableLengthTestChromosomeGenerator {
    pub fn new(
        inner: TestChromosomeGenerator,
        min_initial_length: usize,
        max_initial_length: usize,
        reserved_codons: usize,
    ) -> Self {
        Self {
            inner,
            min_initial_length,
            max_initial_length,
            reserved_codons,
        }
    }
}

impl ChromosomeGenerator<TestChromosome> for VariableLengthTestChromosomeGenerator {
    fn get(&mut self, rng: &mut Randomness) -> TestChromosome {
        let events = rng.next_int(self.min_initial_length as i64, self.max_initial_length as i64) as usize;
        self.inner.build(events * self.reserved_codons, rng)
    }
}
