//! Test chromosomes: codon lists decoded into event sequences and executed
//! against a program under test, scored by statement coverage.

pub mod chromosome;
pub mod executor;
pub mod graph;
pub mod program;
pub mod statement_fitness;
pub mod trace;

pub use chromosome::{HasTrace, TestChromosome, TestChromosomeGenerator, VariableLengthTestChromosomeGenerator};
pub use executor::TestExecutor;
pub use graph::{BranchInputs, ControlGraph, GraphNode, NodeKind};
pub use program::{Event, EventKind, MutantProducer, ProgramUnderTest};
pub use statement_fitness::{StatementFitnessFunction, StatementFitnessFunctionFactory};
pub use trace::{BlockTrace, EventAndParameters, ExecutionTrace};
