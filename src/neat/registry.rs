//! Innovation numbers and node ids shared by one population.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Handle through which the population's operators and networks reach the
/// registry.
pub type SharedRegistry = Rc<RefCell<InnovationRegistry>>;

/// Assigns the same innovation number to structurally identical connections
/// and the same node id to the same input feature, output or split, so that
/// genomes of one population can be aligned gene by gene.
#[derive(Debug, Default)]
pub struct InnovationRegistry {
    connections: HashMap<(usize, usize, bool), u64>,
    inputs: HashMap<(String, String), usize>,
    outputs: HashMap<String, usize>,
    splits: HashMap<(usize, usize), usize>,
    sprite_hidden: HashMap<String, usize>,
    bias: Option<usize>,
    next_innovation: u64,
    next_node_id: usize,
}

impl InnovationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn connection_innovation(&mut self, source: usize, target: usize, recurrent: bool) -> u64 {
        let next = &mut self.next_innovation;
        *self.connections.entry((source, target, recurrent)).or_insert_with(|| {
            *next += 1;
            *next
        })
    }

    pub fn input_node_id(&mut self, sprite: &str, feature: &str) -> usize {
        let key = (sprite.to_string(), feature.to_string());
        if let Some(&id) = self.inputs.get(&key) {
            return id;
        }
        let id = self.fresh_node_id();
        self.inputs.insert(key, id);
        id
    }

    pub fn bias_node_id(&mut self) -> usize {
        if let Some(id) = self.bias {
            return id;
        }
        let id = self.fresh_node_id();
        self.bias = Some(id);
        id
    }

    pub fn classification_node_id(&mut self, event: &str) -> usize {
        self.output_node_id(event.to_string())
    }

    pub fn regression_node_id(&mut self, event: &str, parameter: &str) -> usize {
        self.output_node_id(format!("{event}-{parameter}"))
    }

    fn output_node_id(&mut self, key: String) -> usize {
        if let Some(&id) = self.outputs.get(&key) {
            return id;
        }
        let id = self.fresh_node_id();
        self.outputs.insert(key, id);
        id
    }

    /// Id of the hidden node that splits `source → target`; the first split
    /// of a link fixes it for every later one.
    pub fn split_node_id(&mut self, source: usize, target: usize) -> usize {
        if let Some(&id) = self.splits.get(&(source, target)) {
            return id;
        }
        let id = self.fresh_node_id();
        self.splits.insert((source, target), id);
        id
    }

    /// Hidden node collecting one sprite's inputs in `fullyHidden` networks.
    pub fn sprite_hidden_node_id(&mut self, sprite: &str) -> usize {
        if let Some(&id) = self.sprite_hidden.get(sprite) {
            return id;
        }
        let id = self.fresh_node_id();
        self.sprite_hidden.insert(sprite.to_string(), id);
        id
    }

    pub fn fresh_node_id(&mut self) -> usize {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    pub fn highest_innovation(&self) -> u64 {
        self.next_innovation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_links_share_innovations() {
        let mut registry = InnovationRegistry::new();
        let a = registry.connection_innovation(0, 3, false);
        let b = registry.connection_innovation(1, 3, false);
        assert_ne!(a, b);
        assert_eq!(registry.connection_innovation(0, 3, false), a);
        assert_ne!(registry.connection_innovation(0, 3, true), a);
        assert_eq!(registry.highest_innovation(), 3);
    }

    #[test]
    fn features_map_to_stable_ids() {
        let mut registry = InnovationRegistry::new();
        let x = registry.input_node_id("Cat", "X");
        let y = registry.input_node_id("Cat", "Y");
        let bias = registry.bias_node_id();
        assert_eq!(registry.input_node_id("Cat", "X"), x);
        assert_eq!(registry.bias_node_id(), bias);
        assert_ne!(x, y);
        assert_ne!(
            registry.classification_node_id("KeyPress"),
            registry.regression_node_id("KeyPress", "Key")
        );
    }

    #[test]
    fn splits_reuse_hidden_ids() {
        let mut registry = InnovationRegistry::new();
        let first = registry.split_node_id(0, 4);
        assert_eq!(registry.split_node_id(0, 4), first);
        assert_ne!(registry.split_node_id(4, 0), first);
    }
}
