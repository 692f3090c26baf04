//! Statement coverage as a minimisation problem.
//!
//! The fitness of a chromosome for a target statement combines the approach
//! level (unsatisfied control dependencies between the executed code and
//! the target), the normalised branch distance of the closest traced control
//! block and, once both are zero, the normalised CFG distance.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::marker::PhantomData;
use std::rc::Rc;

use log::warn;
use serde_json::json;

use crate::testcase::chromosome::HasTrace;
use crate::testcase::graph::{ControlGraph, GraphNode, NodeKind};
use crate::testcase::trace::BlockTrace;
use crate::{FitnessFunction, Result, SearchError};

/// Sentinel for "unreachable" approach levels and distances.
pub const MAX_DISTANCE: i64 = 9_007_199_254_740_991;

const EXECUTION_HALTING_OPCODES: [&str; 7] = [
    "control_wait",
    "looks_thinkforsecs",
    "looks_sayforsecs",
    "motion_glideto",
    "motion_glidesecstoxy",
    "sound_playuntildone",
    "text2speech_speakAndWait",
];

const CLONE_START: &str = "control_start_as_clone";

/// Hat block run when the program starts.
pub const START_EVENT_OPCODE: &str = "event_whenflagclicked";

const SINGLE_BRANCH_OPCODES: [&str; 5] = [
    "control_if",
    "control_repeat",
    "control_repeat_until",
    "control_forever",
    "control_wait_until",
];

const DOUBLE_BRANCH_OPCODE: &str = "control_if_else";

const PROCEDURE_DEFINITION: &str = "procedures_definition";

fn is_hat_opcode(opcode: &str) -> bool {
    opcode.starts_with("event_when") || opcode == CLONE_START
}

fn is_single_branch(opcode: &str) -> bool {
    SINGLE_BRANCH_OPCODES.contains(&opcode)
}

fn is_branch(opcode: &str) -> bool {
    is_single_branch(opcode) || opcode == DOUBLE_BRANCH_OPCODE
}

fn child_of<'a>(node: &GraphNode, graph: &'a ControlGraph) -> Option<&'a GraphNode> {
    node.next.as_deref().and_then(|id| graph.node(id))
}

/// The block in front of `id`, or the control block whose branch starts
/// with it.
fn parent_of<'a>(id: &str, graph: &'a ControlGraph) -> Option<&'a GraphNode> {
    graph.nodes().find(|n| {
        n.next.as_deref() == Some(id)
            || n.inputs.substack.as_deref() == Some(id)
            || n.inputs.substack2.as_deref() == Some(id)
    })
}

/// `x / (x + 1)`.
pub fn normalize(x: f64) -> f64 {
    x / (x + 1.0)
}

pub struct StatementFitnessFunction<C> {
    target: GraphNode,
    cdg: Rc<ControlGraph>,
    cfg: Rc<ControlGraph>,
    approach_levels: HashMap<String, i64>,
    /// Node → the event node that triggers it.
    event_mapping: HashMap<String, String>,
    _chromosome: PhantomData<fn(&C)>,
}

impl<C: HasTrace> StatementFitnessFunction<C> {
    pub fn new(target: GraphNode, cdg: Rc<ControlGraph>, cfg: Rc<ControlGraph>) -> Result<Self> {
        if cdg.node(&target.id).is_none() {
            return Err(SearchError::UnknownNode(target.id));
        }
        let (approach_levels, event_mapping) = Self::approach_levels_of(&target, &cdg);
        Ok(Self {
            target,
            cdg,
            cfg,
            approach_levels,
            event_mapping,
            _chromosome: PhantomData,
        })
    }

    /// Reverse BFS over the CDG; the target itself sits at level -1.
    fn approach_levels_of(
        target: &GraphNode,
        cdg: &ControlGraph,
    ) -> (HashMap<String, i64>, HashMap<String, String>) {
        let mut levels: HashMap<String, i64> = HashMap::new();
        let mut mapping = HashMap::new();
        let mut visited = HashSet::new();
        let mut work_list = VecDeque::from([(target.id.clone(), -1i64)]);

        while let Some((id, level)) = work_list.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let current = level + 1;
            for pred in cdg.predecessors(&id) {
                if pred.is_event_node() {
                    mapping.insert(id.clone(), pred.id.clone());
                    for succ in cdg.successor_ids(&pred.id) {
                        mapping.insert(succ.clone(), pred.id.clone());
                    }
                }
                let entry = levels.entry(pred.id.clone()).or_insert(current);
                if *entry > current {
                    *entry = current;
                }
                work_list.push_back((pred.id.clone(), current));
            }
        }
        (levels, mapping)
    }

    pub fn target(&self) -> &GraphNode {
        &self.target
    }

    pub fn cfg(&self) -> &ControlGraph {
        &self.cfg
    }

    pub fn cdg(&self) -> &ControlGraph {
        &self.cdg
    }

    /// Deepest control dependency chain above the target.
    pub fn cdg_depth(&self) -> i64 {
        self.approach_levels.values().copied().max().unwrap_or(0)
    }

    fn level_of(&self, id: &str) -> Option<i64> {
        self.approach_levels.get(id).copied()
    }

    fn approach_level_by_trace(&self, block: &BlockTrace, current_min: i64) -> i64 {
        let mut min = MAX_DISTANCE;
        if let Some(level) = self.level_of(&block.id) {
            if level <= current_min {
                min = level;
            }
        }
        if let Some(level) = self.event_mapping.get(&block.id).and_then(|e| self.level_of(e)) {
            if level <= current_min && level <= min {
                min = level;
            }
        }
        min
    }

    fn trace_of<'a>(&self, chromosome: &'a C) -> Result<&'a [BlockTrace]> {
        chromosome
            .trace()
            .map(|t| t.block_traces.as_slice())
            .ok_or(SearchError::TraceNotAvailable)
    }

    pub fn approach_level(&self, chromosome: &C) -> Result<i64> {
        let mut min = MAX_DISTANCE;
        for block in self.trace_of(chromosome)? {
            min = min.min(self.approach_level_by_trace(block, min));
        }
        Ok(min)
    }

    /// Distance of the traced control block with the lowest approach level
    /// from taking the branch toward the target.
    pub fn branch_distance(&self, chromosome: &C) -> Result<f64> {
        let mut min_level = MAX_DISTANCE;
        let mut distance = MAX_DISTANCE as f64;
        for block in self.trace_of(chromosome)? {
            if block.id == self.target.id {
                return Ok(0.0);
            }
            let level = self.approach_level_by_trace(block, min_level);
            if level > min_level {
                continue;
            }
            let Some(&(true_distance, false_distance)) = block.distances.first() else {
                continue;
            };
            let candidate = if self.can_compute_control_distance(block) {
                let Some(control) = self.cdg.node(&block.id) else {
                    warn!("traced block {} not found in CDG", block.id);
                    continue;
                };
                if self.required_condition(control) {
                    true_distance
                } else {
                    false_distance
                }
            } else if is_hat_opcode(&block.opcode) {
                true_distance
            } else {
                continue;
            };
            if level < min_level || candidate < distance {
                min_level = level;
                distance = candidate;
            }
        }
        Ok(distance)
    }

    fn can_compute_control_distance(&self, block: &BlockTrace) -> bool {
        !is_hat_opcode(&self.target.opcode)
            && (block.opcode.starts_with("control") || EXECUTION_HALTING_OPCODES.contains(&block.opcode.as_str()))
    }

    /// Whether the target needs `control`'s condition to be true.
    fn required_condition(&self, control: &GraphNode) -> bool {
        let substack = control.inputs.substack.as_deref();
        match control.opcode.as_str() {
            "control_forever" | "control_wait_until" | CLONE_START => true,
            "control_repeat" => substack.is_some_and(|s| self.matches_branch_start(control, s)),
            "control_repeat_until" => !substack.is_some_and(|s| self.matches_branch_start(control, s)),
            "control_if" => substack
                .or(control.inputs.condition.as_deref())
                .is_some_and(|s| self.matches_branch_start(control, s)),
            "control_if_else" => {
                let if_branch = substack.or(control.inputs.condition.as_deref());
                if if_branch.is_some_and(|s| self.matches_branch_start(control, s)) {
                    return true;
                }
                match control.inputs.substack2.as_deref() {
                    Some(_) => false,
                    None => true,
                }
            }
            opcode => EXECUTION_HALTING_OPCODES.contains(&opcode),
        }
    }

    /// Walks first CFG predecessors from the target up to `control`, looking
    /// for `branch_start`.
    fn matches_branch_start(&self, control: &GraphNode, branch_start: &str) -> bool {
        let mut current = Some(self.target.id.as_str());
        let mut traversed = HashSet::new();
        while let Some(id) = current {
            if id == control.id || !traversed.insert(id) {
                break;
            }
            if id == branch_start {
                return true;
            }
            current = self.cfg.predecessor_ids(id).first().map(String::as_str);
        }
        false
    }

    /// Number of CFG steps between the target (or, with
    /// `has_unexecuted_cdg_predecessor`, the closest unexecuted CDG
    /// ancestors) and the nearest covered block.
    pub fn cfg_distance(&self, chromosome: &C, has_unexecuted_cdg_predecessor: bool) -> i64 {
        let coverage = chromosome.coverage();
        let start = if has_unexecuted_cdg_predecessor {
            let frontier = self.unexecuted_frontier(coverage);
            if frontier.is_empty() {
                return MAX_DISTANCE;
            }
            frontier
        } else {
            vec![self.target.id.clone()]
        };
        Self::levels_to_coverage(&self.cfg, start, coverage)
    }

    fn levels_to_coverage(graph: &ControlGraph, start: Vec<String>, coverage: &BTreeSet<String>) -> i64 {
        let mut visited: HashSet<String> = start.iter().cloned().collect();
        let mut queue: VecDeque<String> = start.into();
        let mut step = -1;
        while !queue.is_empty() {
            step += 1;
            for _ in 0..queue.len() {
                let Some(id) = queue.pop_front() else { break };
                if coverage.contains(&id) {
                    return step;
                }
                for pred in graph.predecessor_ids(&id) {
                    if visited.insert(pred.clone()) {
                        queue.push_back(pred.clone());
                    }
                }
            }
        }
        // Nothing covered reaches the target: it hangs off an entry or event.
        0
    }

    /// CDG ancestors of the target closest to it whose own predecessor is
    /// covered or a root.
    fn unexecuted_frontier(&self, coverage: &BTreeSet<String>) -> Vec<String> {
        let mut visited = HashSet::from([self.target.id.clone()]);
        let mut queue = VecDeque::from([self.target.id.clone()]);
        let mut frontier: Vec<String> = Vec::new();
        while !queue.is_empty() {
            for _ in 0..queue.len() {
                let Some(id) = queue.pop_front() else { break };
                for pred in self.cdg.predecessor_ids(&id) {
                    if visited.contains(pred) {
                        continue;
                    }
                    if (coverage.contains(pred) || self.cdg.predecessor_ids(pred).is_empty())
                        && !frontier.contains(&id)
                    {
                        frontier.push(id.clone());
                    }
                    visited.insert(pred.clone());
                    queue.push_back(pred.clone());
                }
            }
            if !frontier.is_empty() {
                return frontier;
            }
        }
        warn!("no executed CDG ancestor found for {} ({})", self.target.id, self.target.opcode);
        frontier
    }

    /// Merge nodes per branching, execution halting and hat statement, keyed
    /// by the statement's id.
    ///
    /// A merge node is a statement whose coverage implies that a whole block
    /// structure ran: the last block of each branch plus the branching block
    /// itself, the block after a halting block, or the hat block and the
    /// last block of its script.
    pub fn merge_node_map(functions: &[Self]) -> BTreeMap<String, Vec<String>> {
        let mut map = BTreeMap::new();
        for function in functions {
            let target = &function.target;
            let cdg = function.cdg.as_ref();

            if EXECUTION_HALTING_OPCODES.contains(&target.opcode.as_str()) {
                if let Some(child) = child_of(target, cdg) {
                    map.insert(target.id.clone(), vec![child.id.clone()]);
                }
            }

            if is_branch(&target.opcode) {
                let dependents: Vec<&GraphNode> = cdg
                    .successors(&target.id)
                    .filter(|n| n.kind == NodeKind::Block)
                    .collect();
                let last_blocks = dependents.iter().filter(|n| n.next.is_none());
                let before_nested_branch = dependents
                    .iter()
                    .filter(|n| child_of(n, cdg).is_some_and(|c| is_branch(&c.opcode)));
                let mut merge: Vec<String> = last_blocks
                    .chain(before_nested_branch)
                    .filter(|n| !is_single_branch(&n.opcode))
                    .map(|n| n.id.clone())
                    .collect();
                if !merge.contains(&target.id) {
                    merge.push(target.id.clone());
                }
                let expected = if is_single_branch(&target.opcode) { 2 } else { 3 };
                if merge.len() > expected {
                    merge = Self::last_descendants(merge, target, cdg);
                }
                map.insert(target.id.clone(), merge);
            } else if is_hat_opcode(&target.opcode) || target.opcode == PROCEDURE_DEFINITION {
                let mut merge = vec![target.id.clone()];
                let mut visited = HashSet::from([target.id.as_str()]);
                let mut child = child_of(target, cdg);
                while let Some(node) = child {
                    if node.next.is_none() {
                        merge.push(node.id.clone());
                        break;
                    }
                    if !visited.insert(node.id.as_str()) {
                        break;
                    }
                    child = child_of(node, cdg);
                }
                map.insert(target.id.clone(), merge);
            }
        }
        map
    }

    /// Drops candidates that sit above another candidate in the block
    /// hierarchy below `control`.
    fn last_descendants(candidates: Vec<String>, control: &GraphNode, cdg: &ControlGraph) -> Vec<String> {
        let mut shadowed = HashSet::new();
        for id in &candidates {
            if *id == control.id {
                continue;
            }
            let mut visited = HashSet::new();
            let mut parent = parent_of(id, cdg);
            while let Some(node) = parent {
                if node.id == control.id || !visited.insert(node.id.clone()) {
                    break;
                }
                if candidates.contains(&node.id) {
                    shadowed.insert(node.id.clone());
                }
                parent = parent_of(&node.id, cdg);
            }
        }
        candidates.into_iter().filter(|id| !shadowed.contains(id)).collect()
    }

    /// Indices into `functions` of the statements that are merge nodes of
    /// some statement. Covering those covers the rest.
    pub fn independent_statements(functions: &[Self]) -> BTreeSet<usize> {
        let merge_nodes: HashSet<String> = Self::merge_node_map(functions).into_values().flatten().collect();
        functions
            .iter()
            .enumerate()
            .filter(|(_, f)| merge_nodes.contains(&f.target.id))
            .map(|(i, _)| i)
            .collect()
    }

    /// JSON breakdown of the fitness components for `chromosome`.
    pub fn summarize(&self, chromosome: &C) -> Result<String> {
        let approach_level = self.approach_level(chromosome)?;
        let branch_distance = self.branch_distance(chromosome)?;
        let cfg_distance = if approach_level == 0 && branch_distance == 0.0 {
            self.cfg_distance(chromosome, false)
        } else {
            MAX_DISTANCE
        };
        let summary = json!({
            "block": self.target.id,
            "ApproachLevel": approach_level,
            "BranchDistance": branch_distance,
            "CFGDistance": cfg_distance,
            "Fitness": self.get_fitness(chromosome)?,
        });
        Ok(serde_json::to_string(&summary)?)
    }
}

impl<C: HasTrace> FitnessFunction<C> for StatementFitnessFunction<C> {
    fn get_fitness(&self, chromosome: &C) -> Result<f64> {
        if chromosome.trace().is_none() {
            return Err(SearchError::TraceNotAvailable);
        }
        if chromosome.coverage().contains(&self.target.id) {
            return Ok(0.0);
        }
        let approach_level = self.approach_level(chromosome)?;
        let branch_distance = self.branch_distance(chromosome)?;
        let cfg_component = if approach_level == 0 && branch_distance == 0.0 {
            normalize(self.cfg_distance(chromosome, false) as f64)
        } else {
            1.0
        };
        Ok(approach_level as f64 + normalize(branch_distance) + cfg_component)
    }

    fn compare(&self, value1: f64, value2: f64) -> f64 {
        value2 - value1
    }

    fn is_optimal(&self, value: f64) -> bool {
        value == 0.0
    }

    fn describe(&self) -> String {
        format!("{} of type {}", self.target.id, self.target.opcode)
    }

    fn is_start_event_goal(&self) -> bool {
        self.target.opcode == START_EVENT_OPCODE
    }
}

/// Builds one statement fitness function per statement of a program.
pub struct StatementFitnessFunctionFactory;

impl StatementFitnessFunctionFactory {
    /// One function per block node of `cfg`, in id order.
    pub fn extract<C: HasTrace>(
        cfg: &Rc<ControlGraph>,
        cdg: &Rc<ControlGraph>,
    ) -> Result<Vec<StatementFitnessFunction<C>>> {
        cfg.nodes()
            .filter(|n| n.kind == NodeKind::Block)
            .map(|n| StatementFitnessFunction::new(n.clone(), Rc::clone(cdg), Rc::clone(cfg)))
            .collect()
    }
}
