//! Local improvement of single chromosomes between search steps.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet};
use std::rc::{Rc, Weak};

use log::debug;

use crate::testcase::graph::{ControlGraph, NodeKind};
use crate::testcase::{HasTrace, ProgramUnderTest, TestChromosome, TestExecutor};
use crate::{Chromosome, ListChromosome, Result, SearchContext};

/// An operator that derives a possibly better variant of one chromosome.
///
/// Callers check [`is_applicable`](Self::is_applicable), draw against
/// [`probability`](Self::probability), and keep the result only if
/// [`has_improved`](Self::has_improved) holds.
pub trait LocalSearch<C> {
    /// `depleted_resources` is the search progress in `[0, 1]`.
    fn is_applicable(&self, chromosome: &Rc<C>, depleted_resources: f64, generation: usize) -> bool;

    /// Produces an executed variant of `chromosome`.
    fn apply(&mut self, chromosome: &Rc<C>, ctx: &mut SearchContext) -> Result<C>;

    fn has_improved(&self, original: &C, modified: &C) -> bool;

    fn probability(&self) -> f64;
}

/// Appends waits to a test while waiting still reaches new statements.
pub struct ExtensionLocalSearch<P> {
    executor: Rc<RefCell<TestExecutor<P>>>,
    cfg: Rc<ControlGraph>,
    probability: f64,
    depleted_resources_threshold: f64,
    generation_interval: usize,
    upper_length_bound: usize,
    wait_step_upper_bound: i64,
    /// Statements reached by earlier extensions; never chased again.
    discovered: HashSet<String>,
}

impl<P: ProgramUnderTest> ExtensionLocalSearch<P> {
    pub fn new(
        executor: Rc<RefCell<TestExecutor<P>>>,
        cfg: Rc<ControlGraph>,
        probability: f64,
        depleted_resources_threshold: f64,
        generation_interval: usize,
        upper_length_bound: usize,
        wait_step_upper_bound: i64,
    ) -> Self {
        Self {
            executor,
            cfg,
            probability,
            depleted_resources_threshold,
            generation_interval: generation_interval.max(1),
            upper_length_bound,
            wait_step_upper_bound,
            discovered: HashSet::new(),
        }
    }

    pub fn discovered(&self) -> &HashSet<String> {
        &self.discovered
    }

    /// Uncovered statements that waiting alone would reach from `coverage`.
    pub fn reachable_successors(&self, coverage: &BTreeSet<String>) -> HashSet<String> {
        let mut visited = HashSet::new();
        let mut successors = HashSet::new();
        for id in coverage {
            if self.cfg.node(id).is_none() {
                continue;
            }
            for succ in self.definite_successors(id, &mut visited) {
                if !coverage.contains(&succ) && !self.discovered.contains(&succ) {
                    successors.insert(succ);
                }
            }
        }
        successors
    }

    /// Successors of `id` not guarded by a condition.
    fn definite_successors(&self, id: &str, visited: &mut HashSet<String>) -> HashSet<String> {
        let mut successors = HashSet::new();
        let Some(node) = self.cfg.node(id) else {
            return successors;
        };
        if node.kind != NodeKind::Block {
            return successors;
        }
        match node.opcode.as_str() {
            "control_repeat_until" | "control_wait_until" | "control_if" | "control_if_else" => {}
            _ => {
                for succ in self.cfg.successors(id) {
                    if succ.kind == NodeKind::Exit || visited.contains(&succ.id) {
                        continue;
                    }
                    visited.insert(succ.id.clone());
                    successors.insert(succ.id.clone());
                    for next in self.definite_successors(&succ.id, visited) {
                        visited.insert(next.clone());
                        successors.insert(next);
                    }
                }
            }
        }
        successors
    }
}

impl<P: ProgramUnderTest> LocalSearch<TestChromosome> for ExtensionLocalSearch<P> {
    fn is_applicable(&self, chromosome: &Rc<TestChromosome>, depleted_resources: f64, generation: usize) -> bool {
        if self.depleted_resources_threshold > depleted_resources
            || depleted_resources >= 1.0
            || generation % self.generation_interval != 0
        {
            return false;
        }
        !self.reachable_successors(chromosome.coverage()).is_empty()
    }

    fn apply(&mut self, chromosome: &Rc<TestChromosome>, ctx: &mut SearchContext) -> Result<TestChromosome> {
        debug!("extension local search on {chromosome:?}");
        let extended = {
            let mut executor = self.executor.borrow_mut();
            executor.execute_with_wait_extension(
                chromosome,
                self.upper_length_bound,
                self.wait_step_upper_bound,
                |coverage| !self.reachable_successors(coverage).is_empty(),
                ctx,
            )?
        };
        if self.has_improved(chromosome, &extended) {
            let new_blocks: Vec<String> = extended
                .coverage()
                .difference(chromosome.coverage())
                .cloned()
                .collect();
            self.discovered.extend(new_blocks);
        }
        debug!("extension local search result {extended:?}");
        Ok(extended)
    }

    fn has_improved(&self, original: &TestChromosome, modified: &TestChromosome) -> bool {
        original.coverage().len() < modified.coverage().len()
    }

    fn probability(&self) -> f64 {
        self.probability
    }
}

/// Cuts a test after the last event that increased coverage.
#[derive(Default)]
pub struct ReductionLocalSearch {
    probability: f64,
    /// Chromosomes already reduced.
    originals: Vec<Weak<TestChromosome>>,
}

impl ReductionLocalSearch {
    pub fn new(probability: f64) -> Self {
        Self {
            probability,
            originals: Vec::new(),
        }
    }

    fn already_reduced(&self, chromosome: &Rc<TestChromosome>) -> bool {
        self.originals
            .iter()
            .any(|w| w.strong_count() > 0 && std::ptr::eq(w.as_ptr(), Rc::as_ptr(chromosome)))
    }
}

impl LocalSearch<TestChromosome> for ReductionLocalSearch {
    fn is_applicable(&self, chromosome: &Rc<TestChromosome>, _depleted_resources: f64, _generation: usize) -> bool {
        chromosome.len() > 1
            && chromosome.len() > chromosome.last_improved_coverage_codon()
            && chromosome.last_improved_trace().is_some()
            && !self.already_reduced(chromosome)
    }

    fn apply(&mut self, chromosome: &Rc<TestChromosome>, _ctx: &mut SearchContext) -> Result<TestChromosome> {
        self.originals.retain(|w| w.strong_count() > 0);
        self.originals.push(Rc::downgrade(chromosome));

        let cut = chromosome.last_improved_coverage_codon().min(chromosome.len());
        let mut reduced = chromosome.clone_with(chromosome.codons()[..cut].to_vec());
        let trace = chromosome.last_improved_trace().cloned().unwrap_or_default();
        reduced.set_execution(trace, chromosome.coverage().clone());
        reduced.set_last_improvement(cut, None);
        Ok(reduced)
    }

    fn has_improved(&self, original: &TestChromosome, modified: &TestChromosome) -> bool {
        original.coverage().len() <= modified.coverage().len() && original.len() > modified.len()
    }

    fn probability(&self) -> f64 {
        self.probability
    }
}
