//! Node and connection genes.

use serde::{Deserialize, Serialize};

/// Squashing functions available to hidden and output nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivationFunction {
    /// `1 / (1 + e^(-4.9x))`, the steepened sigmoid of the NEAT paper.
    #[default]
    Sigmoid,
    Tanh,
    Relu,
    /// Identity, used by regression outputs.
    None,
}

impl ActivationFunction {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Sigmoid => 1.0 / (1.0 + (-4.9 * x).exp()),
            Self::Tanh => x.tanh(),
            Self::Relu => x.max(0.0),
            Self::None => x,
        }
    }
}

/// What a node stands for. The declaration order is the activation order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// One feature of one sprite.
    Input { sprite: String, feature: String },
    Bias,
    Hidden,
    /// Votes for an event; the highest softmax share wins.
    Classification { event: String },
    /// Supplies one parameter of an event.
    Regression { event: String, parameter: String },
}

impl NodeRole {
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::Input { .. } => 0,
            Self::Bias => 1,
            Self::Hidden => 2,
            Self::Classification { .. } => 3,
            Self::Regression { .. } => 4,
        }
    }

    /// Inputs and the bias are set from outside and never activated.
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Input { .. } | Self::Bias)
    }

    pub fn is_output(&self) -> bool {
        matches!(self, Self::Classification { .. } | Self::Regression { .. })
    }
}

/// Per-activation values. Never persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeState {
    pub node_value: f64,
    pub activation_value: f64,
    pub last_activation_value: f64,
    pub activation_count: usize,
    pub activated: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    pub id: usize,
    pub role: NodeRole,
    pub activation_function: ActivationFunction,
    #[serde(skip)]
    pub state: NodeState,
}

impl NodeGene {
    pub fn new(id: usize, role: NodeRole, activation_function: ActivationFunction) -> Self {
        Self {
            id,
            role,
            activation_function,
            state: NodeState::default(),
        }
    }

    pub fn input(id: usize, sprite: impl Into<String>, feature: impl Into<String>) -> Self {
        let role = NodeRole::Input {
            sprite: sprite.into(),
            feature: feature.into(),
        };
        Self::new(id, role, ActivationFunction::None)
    }

    pub fn bias(id: usize) -> Self {
        Self::new(id, NodeRole::Bias, ActivationFunction::None)
    }

    pub fn hidden(id: usize, activation_function: ActivationFunction) -> Self {
        Self::new(id, NodeRole::Hidden, activation_function)
    }

    pub fn classification(id: usize, event: impl Into<String>) -> Self {
        let role = NodeRole::Classification { event: event.into() };
        Self::new(id, role, ActivationFunction::Sigmoid)
    }

    pub fn regression(id: usize, event: impl Into<String>, parameter: impl Into<String>) -> Self {
        let role = NodeRole::Regression {
            event: event.into(),
            parameter: parameter.into(),
        };
        Self::new(id, role, ActivationFunction::None)
    }

    /// Sort key of the activation order.
    pub(crate) fn order(&self) -> (u8, usize) {
        (self.role.rank(), self.id)
    }

    pub fn reset(&mut self) {
        self.state = NodeState::default();
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGene {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
    pub enabled: bool,
    pub innovation: u64,
    /// Reads the source's activation from the previous step.
    pub recurrent: bool,
}

impl ConnectionGene {
    pub fn new(source: usize, target: usize, weight: f64, innovation: u64, recurrent: bool) -> Self {
        Self {
            source,
            target,
            weight,
            enabled: true,
            innovation,
            recurrent,
        }
    }

    pub fn links(&self, source: usize, target: usize, recurrent: bool) -> bool {
        self.source == source && self.target == target && self.recurrent == recurrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_steepened() {
        assert!((ActivationFunction::Sigmoid.apply(0.0) - 0.5).abs() < 1e-12);
        let expected = 1.0 / (1.0 + (-4.9f64).exp());
        assert!((ActivationFunction::Sigmoid.apply(1.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn relu_and_identity() {
        assert_eq!(ActivationFunction::Relu.apply(-3.0), 0.0);
        assert_eq!(ActivationFunction::Relu.apply(2.5), 2.5);
        assert_eq!(ActivationFunction::None.apply(-7.0), -7.0);
    }

    #[test]
    fn roles_order_inputs_first() {
        let mut nodes = vec![
            NodeGene::classification(1, "KeyPress"),
            NodeGene::hidden(9, ActivationFunction::Sigmoid),
            NodeGene::bias(5),
            NodeGene::input(7, "Cat", "X"),
        ];
        nodes.sort_by_key(NodeGene::order);
        let ids: Vec<usize> = nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![7, 5, 9, 1]);
    }
}
