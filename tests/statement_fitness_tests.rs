use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use proptest::prelude::*;
use whisker_search::testcase::statement_fitness::normalize;
use whisker_search::testcase::{
    BlockTrace, BranchInputs, ControlGraph, ExecutionTrace, GraphNode, HasTrace, NodeKind,
    StatementFitnessFunction, StatementFitnessFunctionFactory,
};
use whisker_search::{FitnessFunction, SearchError};

// --- Mock Infrastructure ---

/// A chromosome that only carries an execution record.
struct Executed {
    trace: Option<ExecutionTrace>,
    coverage: BTreeSet<String>,
}

impl HasTrace for Executed {
    fn trace(&self) -> Option<&ExecutionTrace> {
        self.trace.as_ref()
    }

    fn coverage(&self) -> &BTreeSet<String> {
        &self.coverage
    }
}

fn executed(blocks: Vec<BlockTrace>) -> Executed {
    let coverage = blocks.iter().map(|b| b.id.clone()).collect();
    Executed {
        trace: Some(ExecutionTrace::new(blocks, Vec::new())),
        coverage,
    }
}

fn flag_trace() -> BlockTrace {
    BlockTrace::new("flag", "event_whenflagclicked", vec![(0.0, 1.0)])
}

/// Adds `nodes` to both graphs and the same `edges` to the CDG; the CFG
/// gets `edges` plus `cfg_only`.
fn graphs(
    nodes: Vec<GraphNode>,
    edges: &[(&str, &str)],
    cfg_only: &[(&str, &str)],
) -> (Rc<ControlGraph>, Rc<ControlGraph>) {
    let mut cfg = ControlGraph::new();
    let mut cdg = ControlGraph::new();
    for node in nodes {
        cfg.add_node(node.clone());
        cdg.add_node(node);
    }
    for (from, to) in edges {
        cfg.add_edge(from, to).unwrap();
        cdg.add_edge(from, to).unwrap();
    }
    for (from, to) in cfg_only {
        cfg.add_edge(from, to).unwrap();
    }
    (Rc::new(cfg), Rc::new(cdg))
}

fn function_for(target: &str, cfg: &Rc<ControlGraph>, cdg: &Rc<ControlGraph>) -> StatementFitnessFunction<Executed> {
    let node = cfg.node(target).unwrap().clone();
    StatementFitnessFunction::new(node, Rc::clone(cdg), Rc::clone(cfg)).unwrap()
}

fn substack(id: &str) -> BranchInputs {
    BranchInputs {
        substack: Some(id.to_string()),
        ..BranchInputs::default()
    }
}

/// flag → if1 → ... → ifN → target, every `if` guarding the next block.
fn nested_ifs(depth: usize) -> (Rc<ControlGraph>, Rc<ControlGraph>) {
    let mut nodes = vec![GraphNode::block("flag", "event_whenflagclicked")];
    let mut ids = vec![String::from("flag")];
    for level in 1..=depth {
        let next = if level == depth {
            String::from("target")
        } else {
            format!("if{}", level + 1)
        };
        nodes.push(GraphNode::block(format!("if{level}"), "control_if").with_inputs(substack(&next)));
        ids.push(format!("if{level}"));
    }
    nodes.push(GraphNode::block("target", "looks_say"));
    ids.push(String::from("target"));

    let edges: Vec<(&str, &str)> = ids.windows(2).map(|w| (w[0].as_str(), w[1].as_str())).collect();
    graphs(nodes, &edges, &[])
}

// ============================================================================
// Branch distance per control structure
// ============================================================================

#[test]
fn test_repeat_until_needs_false_condition_to_enter_body() {
    let (cfg, cdg) = graphs(
        vec![
            GraphNode::block("flag", "event_whenflagclicked"),
            GraphNode::block("loop", "control_repeat_until").with_inputs(substack("target")),
            GraphNode::block("target", "looks_say"),
        ],
        &[("flag", "loop"), ("loop", "target")],
        &[("target", "loop")],
    );
    let function = function_for("target", &cfg, &cdg);
    let chromosome = executed(vec![
        flag_trace(),
        BlockTrace::new("loop", "control_repeat_until", vec![(0.0, 10.0)]),
    ]);

    assert_eq!(function.approach_level(&chromosome).unwrap(), 0);
    assert_eq!(function.branch_distance(&chromosome).unwrap(), 10.0);
    let expected = normalize(10.0) + 1.0;
    assert!((function.get_fitness(&chromosome).unwrap() - expected).abs() < 1e-12);
}

#[test]
fn test_repeat_needs_true_condition() {
    let (cfg, cdg) = graphs(
        vec![
            GraphNode::block("repeat", "control_repeat").with_inputs(substack("target")),
            GraphNode::block("target", "motion_movesteps"),
        ],
        &[("repeat", "target")],
        &[],
    );
    let function = function_for("target", &cfg, &cdg);
    let chromosome = executed(vec![BlockTrace::new("repeat", "control_repeat", vec![(1.0, 0.0)])]);

    assert_eq!(function.approach_level(&chromosome).unwrap(), 0);
    assert_eq!(function.get_fitness(&chromosome).unwrap(), 1.5);
}

#[test]
fn test_else_branch_needs_false_condition() {
    let (cfg, cdg) = graphs(
        vec![
            GraphNode::block("choice", "control_if_else").with_inputs(BranchInputs {
                substack: Some("then".into()),
                substack2: Some("target".into()),
                condition: None,
            }),
            GraphNode::block("then", "looks_say"),
            GraphNode::block("target", "looks_think"),
        ],
        &[("choice", "then"), ("choice", "target")],
        &[],
    );
    let function = function_for("target", &cfg, &cdg);
    let chromosome = executed(vec![
        BlockTrace::new("choice", "control_if_else", vec![(0.0, 3.0)]),
        BlockTrace::new("then", "looks_say", vec![]),
    ]);

    assert_eq!(function.branch_distance(&chromosome).unwrap(), 3.0);
}

#[test]
fn test_first_recorded_distance_is_used() {
    let (cfg, cdg) = nested_ifs(1);
    let function = function_for("target", &cfg, &cdg);
    let chromosome = executed(vec![
        flag_trace(),
        BlockTrace::new("if1", "control_if", vec![(7.0, 0.0), (1.0, 0.0)]),
    ]);
    assert_eq!(function.branch_distance(&chromosome).unwrap(), 7.0);
}

#[test]
fn test_closer_control_block_wins() {
    let (cfg, cdg) = nested_ifs(2);
    let function = function_for("target", &cfg, &cdg);
    let chromosome = executed(vec![
        flag_trace(),
        BlockTrace::new("if1", "control_if", vec![(0.0, 2.0)]),
        BlockTrace::new("if2", "control_if", vec![(5.0, 0.0)]),
    ]);

    assert_eq!(function.approach_level(&chromosome).unwrap(), 0);
    assert_eq!(function.branch_distance(&chromosome).unwrap(), 5.0);
}

// ============================================================================
// Approach level and CFG distance
// ============================================================================

#[test]
fn test_reached_target_parent_uses_cfg_distance() {
    let (cfg, cdg) = nested_ifs(0);
    let function = function_for("target", &cfg, &cdg);
    let chromosome = executed(vec![flag_trace()]);

    assert_eq!(function.approach_level(&chromosome).unwrap(), 0);
    assert_eq!(function.branch_distance(&chromosome).unwrap(), 0.0);
    assert_eq!(function.cfg_distance(&chromosome, false), 1);
    assert_eq!(function.get_fitness(&chromosome).unwrap(), normalize(1.0));
}

#[test]
fn test_covered_target_is_optimal_regardless_of_distances() {
    let (cfg, cdg) = nested_ifs(3);
    let function = function_for("target", &cfg, &cdg);
    let mut chromosome = executed(vec![flag_trace()]);
    chromosome.coverage.insert(String::from("target"));

    let fitness = function.get_fitness(&chromosome).unwrap();
    assert!(function.is_optimal(fitness));
}

#[test]
fn test_summary_names_components() {
    let (cfg, cdg) = nested_ifs(2);
    let function = function_for("target", &cfg, &cdg);
    let summary = function.summarize(&executed(vec![flag_trace()])).unwrap();
    let value: serde_json::Value = serde_json::from_str(&summary).unwrap();

    assert_eq!(value["block"], "target");
    assert_eq!(value["ApproachLevel"], 2);
    assert_eq!(value["Fitness"], 3.0);
}

#[test]
fn test_missing_trace_is_reported() {
    let (cfg, cdg) = nested_ifs(1);
    let function = function_for("target", &cfg, &cdg);
    let chromosome = Executed {
        trace: None,
        coverage: BTreeSet::new(),
    };
    assert!(matches!(function.get_fitness(&chromosome), Err(SearchError::TraceNotAvailable)));
    assert!(matches!(function.approach_level(&chromosome), Err(SearchError::TraceNotAvailable)));
}

// ============================================================================
// Factory
// ============================================================================

#[test]
fn test_factory_skips_pseudo_nodes() {
    let (cfg, cdg) = graphs(
        vec![
            GraphNode::pseudo("entry", NodeKind::Entry),
            GraphNode::pseudo("key", NodeKind::UserEvent),
            GraphNode::block("flag", "event_whenflagclicked"),
            GraphNode::block("say", "looks_say"),
        ],
        &[("entry", "flag"), ("key", "say"), ("flag", "say")],
        &[],
    );
    let functions = StatementFitnessFunctionFactory::extract::<Executed>(&cfg, &cdg).unwrap();
    let targets: Vec<&str> = functions.iter().map(|f| f.target().id.as_str()).collect();
    assert_eq!(targets, vec!["flag", "say"]);
    assert_eq!(functions[1].describe(), "say of type looks_say");
}

#[test]
fn test_edges_between_unknown_nodes_fail() {
    let mut graph = ControlGraph::new();
    graph.add_node(GraphNode::block("a", "looks_say"));
    assert!(matches!(graph.add_edge("a", "b"), Err(SearchError::UnknownNode(id)) if id == "b"));
}

#[test]
fn test_repeat_zero_times_has_unit_branch_distance() {
    let (cfg, cdg) = graphs(
        vec![
            GraphNode::block("flag", "event_whenflagclicked"),
            GraphNode::block("repeat", "control_repeat").with_inputs(substack("target")),
            GraphNode::block("target", "motion_movesteps"),
        ],
        &[("flag", "repeat"), ("repeat", "target")],
        &[],
    );
    let function = function_for("target", &cfg, &cdg);
    // `repeat (0)` never enters its body: one iteration short.
    let chromosome = executed(vec![
        flag_trace(),
        BlockTrace::new("repeat", "control_repeat", vec![(1.0, 0.0)]),
    ]);

    assert_eq!(function.approach_level(&chromosome).unwrap(), 0);
    assert_eq!(function.branch_distance(&chromosome).unwrap(), 1.0);
}

// ============================================================================
// Merge nodes
// ============================================================================

/// flag → if1 → after, where if1 guards s1 → s2.
fn merged_script() -> Vec<StatementFitnessFunction<Executed>> {
    let (cfg, cdg) = graphs(
        vec![
            GraphNode::block("flag", "event_whenflagclicked").with_next("if1"),
            GraphNode::block("if1", "control_if")
                .with_inputs(substack("s1"))
                .with_next("after"),
            GraphNode::block("s1", "motion_movesteps").with_next("s2"),
            GraphNode::block("s2", "motion_turnright"),
            GraphNode::block("after", "looks_say"),
        ],
        &[("flag", "if1"), ("flag", "after"), ("if1", "s1"), ("if1", "s2")],
        &[("s2", "after")],
    );
    StatementFitnessFunctionFactory::extract(&cfg, &cdg).unwrap()
}

#[test]
fn test_merge_nodes_close_scripts_and_branches() {
    let functions = merged_script();

    let map = StatementFitnessFunction::merge_node_map(&functions);

    let expected = BTreeMap::from([
        (String::from("flag"), vec![String::from("flag"), String::from("after")]),
        (String::from("if1"), vec![String::from("s2"), String::from("if1")]),
    ]);
    assert_eq!(map, expected);
}

#[test]
fn test_statements_inside_a_branch_are_not_independent() {
    let functions = merged_script();

    let independent: Vec<&str> = StatementFitnessFunction::independent_statements(&functions)
        .into_iter()
        .map(|i| functions[i].target().id.as_str())
        .collect();

    assert_eq!(independent, vec!["after", "flag", "if1", "s2"]);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_nesting_depth_is_approach_level(depth in 1usize..8) {
        let (cfg, cdg) = nested_ifs(depth);
        let function = function_for("target", &cfg, &cdg);
        let chromosome = executed(vec![flag_trace()]);

        prop_assert_eq!(function.approach_level(&chromosome).unwrap(), depth as i64);
        prop_assert_eq!(function.cdg_depth(), depth as i64);
        prop_assert_eq!(function.get_fitness(&chromosome).unwrap(), depth as f64 + 1.0);
    }

    #[test]
    fn prop_each_passed_gate_lowers_approach_level_by_one(
        (depth, passed) in (1usize..8).prop_flat_map(|d| (Just(d), 0..d)),
    ) {
        let (cfg, cdg) = nested_ifs(depth);
        let function = function_for("target", &cfg, &cdg);
        let run = |gates: usize| {
            let mut blocks = vec![flag_trace()];
            blocks.extend((1..=gates).map(|l| BlockTrace::new(format!("if{l}"), "control_if", vec![(0.0, 1.0)])));
            function.approach_level(&executed(blocks)).unwrap()
        };

        prop_assert_eq!(run(passed) - run(passed + 1), 1);
        prop_assert_eq!(run(passed + 1), (depth - passed - 1) as i64);
    }

    #[test]
    fn prop_normalize_stays_below_one(x in 0.0f64..1e12) {
        let n = normalize(x);
        prop_assert!((0.0..1.0).contains(&n));
    }

    #[test]
    fn prop_larger_branch_distance_is_worse(d1 in 0.0f64..1000.0, d2 in 0.0f64..1000.0) {
        let (cfg, cdg) = nested_ifs(1);
        let function = function_for("target", &cfg, &cdg);
        let fitness = |d: f64| {
            function
                .get_fitness(&executed(vec![flag_trace(), BlockTrace::new("if1", "control_if", vec![(d, 0.0)])]))
                .unwrap()
        };
        let (f1, f2) = (fitness(d1), fitness(d2));
        if d1 < d2 {
            prop_assert!(function.compare(f1, f2) >= 0.0);
        }
    }
}
