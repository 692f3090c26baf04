//! Precomputed control-flow and control-dependence graphs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Result, SearchError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// A program statement.
    #[default]
    Block,
    /// Pseudo node for an internal event such as a broadcast.
    Event,
    /// Pseudo node for an input event such as a key press.
    UserEvent,
    Entry,
    Exit,
}

/// Block ids that start the branches of a control block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct BranchInputs {
    #[serde(default)]
    pub substack: Option<String>,
    #[serde(default)]
    pub substack2: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub opcode: String,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub inputs: BranchInputs,
    #[serde(default)]
    pub next: Option<String>,
}

impl GraphNode {
    pub fn block(id: impl Into<String>, opcode: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            opcode: opcode.into(),
            kind: NodeKind::Block,
            inputs: BranchInputs::default(),
            next: None,
        }
    }

    pub fn pseudo(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            opcode: String::new(),
            kind,
            inputs: BranchInputs::default(),
            next: None,
        }
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: BranchInputs) -> Self {
        self.inputs = inputs;
        self
    }

    #[must_use]
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn is_event_node(&self) -> bool {
        matches!(self.kind, NodeKind::Event | NodeKind::UserEvent)
    }
}

/// Directed graph over [`GraphNode`]s with ordered adjacency lists.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ControlGraph {
    nodes: BTreeMap<String, GraphNode>,
    successors: BTreeMap<String, Vec<String>>,
    predecessors: BTreeMap<String, Vec<String>>,
}

impl ControlGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: GraphNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Adds `from → to`. Both ends must already be nodes.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        for id in [from, to] {
            if !self.nodes.contains_key(id) {
                return Err(SearchError::UnknownNode(id.to_string()));
            }
        }
        let succ = self.successors.entry(from.to_string()).or_default();
        if !succ.iter().any(|s| s == to) {
            succ.push(to.to_string());
        }
        let pred = self.predecessors.entry(to.to_string()).or_default();
        if !pred.iter().any(|p| p == from) {
            pred.push(from.to_string());
        }
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn predecessor_ids(&self, id: &str) -> &[String] {
        self.predecessors.get(id).map_or(&[], Vec::as_slice)
    }

    pub fn successor_ids(&self, id: &str) -> &[String] {
        self.successors.get(id).map_or(&[], Vec::as_slice)
    }

    pub fn predecessors<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a GraphNode> + use<'a> {
        self.predecessor_ids(id).iter().filter_map(|p| self.nodes.get(p))
    }

    pub fn successors<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a GraphNode> + use<'a> {
        self.successor_ids(id).iter().filter_map(|s| self.nodes.get(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_require_known_nodes() {
        let mut g = ControlGraph::new();
        g.add_node(GraphNode::block("a", "control_if"));
        assert!(matches!(g.add_edge("a", "b"), Err(SearchError::UnknownNode(id)) if id == "b"));
    }

    #[test]
    fn adjacency_keeps_insertion_order_without_duplicates() {
        let mut g = ControlGraph::new();
        for id in ["a", "b", "c"] {
            g.add_node(GraphNode::block(id, "motion_movesteps"));
        }
        g.add_edge("b", "a").unwrap();
        g.add_edge("c", "a").unwrap();
        g.add_edge("b", "a").unwrap();
        assert_eq!(g.predecessor_ids("a"), &["b".to_string(), "c".to_string()]);
        assert_eq!(g.successor_ids("b"), &["a".to_string()]);
    }
}
