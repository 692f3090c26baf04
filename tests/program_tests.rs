use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use whisker_search::builder::SearchAlgorithmBuilder;
use whisker_search::config::AlgorithmKind;
use whisker_search::integerlist::IntegerListMutation;
use whisker_search::operators::{ExtensionLocalSearch, LocalSearch, ReductionLocalSearch, SinglePointCrossover};
use whisker_search::position::Position2D;
use whisker_search::stopping::{FixedIterationsStoppingCondition, OneOfStoppingCondition, OptimalSolutionStoppingCondition};
use whisker_search::testcase::{
    BlockTrace, ControlGraph, Event, GraphNode, HasTrace, ProgramUnderTest, StatementFitnessFunctionFactory,
    TestChromosome, TestChromosomeGenerator, TestExecutor,
};
use whisker_search::{Chromosome, FitnessRef, Result, SearchContext, SearchError};

// --- Mock Infrastructure ---

/// Steps of waiting after which the `late` block runs.
const LATE_AFTER: i64 = 5;

/// A scripted program: the green flag block runs on start, `space` runs on
/// a key press, `late` runs once enough steps have passed, and `big` runs
/// when a number above 100 is typed.
#[derive(Default)]
struct ScriptedProgram {
    running: bool,
    steps: i64,
    covered: BTreeSet<String>,
    traces: Vec<BlockTrace>,
    seeds: Vec<u64>,
    resets: usize,
}

impl ScriptedProgram {
    fn cover(&mut self, id: &str, opcode: &str, distances: Vec<(f64, f64)>) {
        self.covered.insert(id.to_string());
        self.traces.push(BlockTrace::new(id, opcode, distances));
    }

    fn events() -> Vec<Event> {
        vec![
            Event::wait(),
            Event::action("KeyPress:space", vec![]),
            Event::action("TypeNumber", vec![String::from("Value")]),
        ]
    }
}

impl ProgramUnderTest for ScriptedProgram {
    fn start(&mut self) {
        self.running = true;
        self.steps = 0;
        self.covered.clear();
        self.traces.clear();
        self.cover("flag", "event_whenflagclicked", vec![(0.0, 1.0)]);
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn available_events(&self) -> Vec<Event> {
        if self.running { Self::events() } else { Vec::new() }
    }

    fn apply(&mut self, event: &Event, parameters: &[i64]) -> Result<()> {
        match event.id.as_str() {
            "WaitEvent" => {
                self.steps += parameters.first().copied().unwrap_or(1).max(0);
                if self.steps >= LATE_AFTER && !self.covered.contains("late") {
                    self.cover("late", "looks_say", vec![]);
                }
            }
            "KeyPress:space" => self.cover("space", "event_whenkeypressed", vec![(0.0, 1.0)]),
            "TypeNumber" => {
                let value = parameters.first().copied().unwrap_or(0) as f64;
                self.traces
                    .push(BlockTrace::new("check", "control_if", vec![((101.0 - value).max(0.0), 0.0)]));
                if value > 100.0 {
                    self.cover("big", "looks_think", vec![]);
                }
            }
            other => return Err(SearchError::UnknownEvent(other.to_string())),
        }
        Ok(())
    }

    fn current_millis(&self) -> u64 {
        (self.steps.max(0) as u64) * 100
    }

    fn sprite_features(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        BTreeMap::new()
    }

    fn variables(&self) -> Vec<(String, f64)> {
        vec![(String::from("steps"), self.steps as f64)]
    }

    fn player_position(&self) -> Option<Position2D> {
        None
    }

    fn block_traces(&self) -> Vec<BlockTrace> {
        self.traces.clone()
    }

    fn coverage(&self) -> BTreeSet<String> {
        self.covered.clone()
    }

    fn reset_state(&mut self) {
        self.resets += 1;
    }

    fn seed(&mut self, seed: u64) {
        self.seeds.push(seed);
    }
}

fn chromosome(codons: Vec<i64>) -> TestChromosome {
    TestChromosome::new(codons, Rc::new(IntegerListMutation::new(0, 3)), Rc::new(SinglePointCrossover))
}

/// flag → late in both graphs; `space` hangs alone.
fn program_graphs() -> (Rc<ControlGraph>, Rc<ControlGraph>) {
    let mut cfg = ControlGraph::new();
    let mut cdg = ControlGraph::new();
    for node in [
        GraphNode::block("flag", "event_whenflagclicked"),
        GraphNode::block("late", "looks_say"),
        GraphNode::block("space", "event_whenkeypressed"),
    ] {
        cfg.add_node(node.clone());
        cdg.add_node(node);
    }
    cfg.add_edge("flag", "late").unwrap();
    cdg.add_edge("flag", "late").unwrap();
    (Rc::new(cfg), Rc::new(cdg))
}

// ============================================================================
// Executing codon lists
// ============================================================================

#[test]
fn test_codons_select_events_and_parameters() {
    let mut executor = TestExecutor::new(ScriptedProgram::default());
    let mut ctx = SearchContext::new(1);
    let mut test = chromosome(vec![1, 2, 50]);

    executor.execute(&mut test, &mut ctx).unwrap();

    let trace = test.trace().unwrap();
    let ids: Vec<&str> = trace.events.iter().map(|e| e.event.id.as_str()).collect();
    assert_eq!(ids, vec!["KeyPress:space", "WaitEvent", "TypeNumber", "WaitEvent"]);
    assert_eq!(trace.events[2].parameters, vec![50]);
    assert_eq!(trace.action_event_count(), 2);
    assert_eq!(test.event_count(), 4);
    assert!(test.coverage().contains("space"));
    assert_eq!(ctx.statistics.events_count, 2);
    assert_eq!(ctx.statistics.number_fitness_evaluations, 1);
    assert!(!executor.program().is_running());
    assert_eq!(executor.program().resets, 1);
}

#[test]
fn test_parameters_wrap_and_extend_codons() {
    let mut executor = TestExecutor::new(ScriptedProgram::default());
    let mut ctx = SearchContext::new(2);
    let mut test = chromosome(vec![2]);

    executor.execute(&mut test, &mut ctx).unwrap();

    assert_eq!(test.codons(), &[2, 2]);
    assert_eq!(test.trace().unwrap().events[0].parameters, vec![2]);
}

#[test]
fn test_negative_codons_select_valid_events() {
    let mut executor = TestExecutor::new(ScriptedProgram::default());
    let mut ctx = SearchContext::new(3);
    let mut test = chromosome(vec![-2]);

    executor.execute(&mut test, &mut ctx).unwrap();
    assert_eq!(test.trace().unwrap().events[0].event.id, "KeyPress:space");
}

#[test]
fn test_last_improvement_marks_coverage_growth() {
    let mut executor = TestExecutor::new(ScriptedProgram::default());
    let mut ctx = SearchContext::new(4);
    // wait(5), space, wait(5), wait(5)
    let mut test = chromosome(vec![0, 5, 1, 0, 5, 0, 5]);

    executor.execute(&mut test, &mut ctx).unwrap();

    assert_eq!(test.last_improved_coverage_codon(), 3);
    let improved = test.last_improved_trace().unwrap();
    assert_eq!(improved.action_event_count(), 1);
    assert_eq!(test.coverage().len(), 3);
}

/// The program's statements as shared goals, in id order.
fn program_statements() -> Vec<FitnessRef<TestChromosome>> {
    let (cfg, cdg) = program_graphs();
    StatementFitnessFunctionFactory::extract::<TestChromosome>(&cfg, &cdg)
        .unwrap()
        .into_iter()
        .map(|f| {
            let function: FitnessRef<TestChromosome> = Rc::new(f);
            function
        })
        .collect()
}

#[test]
fn test_target_fitness_marks_last_improving_codon() {
    let mut executor = TestExecutor::new(ScriptedProgram::default());
    let mut ctx = SearchContext::new(11);
    // wait(2), wait(2) covers `late`, then space and wait(2)
    let mut test = chromosome(vec![0, 2, 0, 2, 1, 0, 2]);
    let late = program_statements().remove(1);
    assert_eq!(late.describe(), "late of type looks_say");
    test.set_target_fitness(Some(late));

    executor.execute(&mut test, &mut ctx).unwrap();

    assert_eq!(test.last_improved_fitness_codon(), 4);
    assert_eq!(test.last_improved_coverage_codon(), 5);
    assert!(test.target_fitness().is_some());
}

#[test]
fn test_without_target_no_fitness_codon_is_recorded() {
    let mut executor = TestExecutor::new(ScriptedProgram::default());
    let mut test = chromosome(vec![0, 2, 0, 2, 1, 0, 2]);

    executor.execute(&mut test, &mut SearchContext::new(12)).unwrap();

    assert!(test.target_fitness().is_none());
    assert_eq!(test.last_improved_fitness_codon(), 0);
    assert_eq!(test.last_improved_coverage_codon(), 5);
}

#[test]
fn test_covered_statements_counts_goals_reached() {
    let mut executor = TestExecutor::new(ScriptedProgram::default());
    let statements = program_statements();

    let mut short = chromosome(vec![1]);
    executor.execute(&mut short, &mut SearchContext::new(13)).unwrap();
    assert_eq!(short.determine_covered_statements(&statements).unwrap(), 2);

    let mut long = chromosome(vec![0, 2, 0, 2, 1, 0, 2]);
    executor.execute(&mut long, &mut SearchContext::new(13)).unwrap();
    assert_eq!(long.determine_covered_statements(&statements).unwrap(), 3);
    assert_eq!(long.covered_statements(), 3);
}

#[test]
fn test_random_events_record_their_codons() {
    let mut executor = TestExecutor::new(ScriptedProgram::default()).with_parameter_range(0, 10);
    let mut ctx = SearchContext::new(5);
    let mut test = chromosome(vec![]);

    executor.execute_random_events(&mut test, 6, &mut ctx).unwrap();

    assert_eq!(test.codons().len(), 6);
    assert!(test.codons().iter().all(|&c| (0..3).contains(&c)));
    assert_eq!(test.trace().unwrap().events.len(), 12);
}

#[test]
fn test_program_seeded_from_search() {
    let mut executor = TestExecutor::new(ScriptedProgram::default());
    let mut ctx = SearchContext::new(77);
    executor.execute(&mut chromosome(vec![1]), &mut ctx).unwrap();
    executor.reseed(78, &mut ctx.rng);
    executor.execute(&mut chromosome(vec![1]), &mut ctx).unwrap();

    assert_eq!(executor.program().seeds, vec![77, 78, 78]);
    assert_eq!(ctx.rng.seed(), 78);
}

// ============================================================================
// Local search
// ============================================================================

#[test]
fn test_reduction_cuts_after_last_improvement() {
    let mut executor = TestExecutor::new(ScriptedProgram::default());
    let mut ctx = SearchContext::new(6);
    let mut test = chromosome(vec![0, 5, 1, 0, 5, 0, 5]);
    executor.execute(&mut test, &mut ctx).unwrap();
    let test = Rc::new(test);

    let mut reduction = ReductionLocalSearch::new(1.0);
    assert!(reduction.is_applicable(&test, 0.0, 0));

    let reduced = reduction.apply(&test, &mut ctx).unwrap();
    assert_eq!(reduced.codons(), &[0, 5, 1]);
    assert_eq!(reduced.coverage(), test.coverage());
    assert!(reduction.has_improved(&test, &reduced));

    assert!(!reduction.is_applicable(&test, 0.0, 0));
    assert!(!reduction.is_applicable(&Rc::new(reduced), 0.0, 0));
}

#[test]
fn test_reduction_needs_an_execution() {
    let reduction = ReductionLocalSearch::new(1.0);
    assert!(!reduction.is_applicable(&Rc::new(chromosome(vec![1, 1, 1])), 0.0, 0));
}

#[test]
fn test_extension_waits_until_successors_run() {
    let (cfg, _) = program_graphs();
    let executor = Rc::new(RefCell::new(TestExecutor::new(ScriptedProgram::default())));
    let mut ctx = SearchContext::new(7);
    let mut test = chromosome(vec![1]);
    executor.borrow_mut().execute(&mut test, &mut ctx).unwrap();
    assert!(!test.coverage().contains("late"));
    let test = Rc::new(test);

    let mut extension = ExtensionLocalSearch::new(Rc::clone(&executor), cfg, 1.0, 0.5, 1, 10, 25);
    assert!(!extension.is_applicable(&test, 0.2, 0));
    assert!(!extension.is_applicable(&test, 1.0, 0));
    assert!(extension.is_applicable(&test, 0.6, 0));

    let extended = extension.apply(&test, &mut ctx).unwrap();
    assert_eq!(extended.codons(), &[1, 0, 25]);
    assert!(extended.coverage().contains("late"));
    assert!(extension.has_improved(&test, &extended));
    assert!(extension.discovered().contains("late"));
    assert!(!extension.is_applicable(&test, 0.6, 0));
}

#[test]
fn test_extension_stops_at_length_bound() {
    let (cfg, _) = program_graphs();
    let executor = Rc::new(RefCell::new(TestExecutor::new(ScriptedProgram::default())));
    let mut ctx = SearchContext::new(8);
    let test = Rc::new(chromosome(vec![1, 1]));

    let mut extension = ExtensionLocalSearch::new(executor, cfg, 1.0, 0.0, 1, 2, 25);
    let extended = extension.apply(&test, &mut ctx).unwrap();
    assert_eq!(extended.codons(), &[1, 1]);
    assert!(!extended.coverage().contains("late"));
}

// ============================================================================
// Search over programs
// ============================================================================

#[test]
fn test_mosa_covers_program_statements() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (cfg, cdg) = program_graphs();
    let executor = Rc::new(RefCell::new(TestExecutor::new(ScriptedProgram::default())));
    let generator = TestChromosomeGenerator::new(
        6,
        0,
        3,
        Rc::new(IntegerListMutation::new(0, 3)),
        Rc::new(SinglePointCrossover),
    );
    let functions = StatementFitnessFunctionFactory::extract::<TestChromosome>(&cfg, &cdg).unwrap();

    let mut algorithm = SearchAlgorithmBuilder::new(AlgorithmKind::Mosa)
        .add_chromosome_generator(Box::new(generator))
        .add_evaluator(Box::new(Rc::clone(&executor)))
        .with_statement_fitness(functions)
        .add_local_search_operator(Box::new(ReductionLocalSearch::new(0.5)))
        .add_stopping_condition(Box::new(OneOfStoppingCondition::new(vec![
            Box::new(FixedIterationsStoppingCondition::new(100)),
            Box::new(OptimalSolutionStoppingCondition),
        ])))
        .build()
        .unwrap();

    let mut ctx = SearchContext::new(9);
    let solution = algorithm.find_solution(&mut ctx).unwrap();

    assert_eq!(solution.len(), 3);
    assert_eq!(ctx.statistics.covered_fitness_function_count, 3);
    for test in solution.values() {
        assert!(test.trace().is_some());
        assert!(!test.is_empty());
    }
    assert!(ctx.statistics.number_fitness_evaluations > 0);
}
