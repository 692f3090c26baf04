//! Network chromosomes: a NEAT genome plus the state of its last playthrough.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::neat::gene::{ConnectionGene, NodeGene, NodeRole};
use crate::neat::registry::SharedRegistry;
use crate::position::Position2D;
use crate::testcase::{Event, ExecutionTrace, HasTrace};
use crate::{cmp_f64_nan_last, Chromosome, Crossover, FitnessCache, FitnessRef, Mutation, Randomness, Result};

/// Sweeps after which an activation that has not reached any output is
/// abandoned and the network counts as defective.
pub const ACTIVATION_CAP: usize = 20;

/// Sprite → feature → value, normalised to `[-1, 1]`.
pub type SpriteFeatures = BTreeMap<String, BTreeMap<String, f64>>;

/// The heritable part of a network.
///
/// Nodes are kept sorted by (role, id) and connections by innovation number.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkGenome {
    pub nodes: Vec<NodeGene>,
    pub connections: Vec<ConnectionGene>,
}

impl NetworkGenome {
    pub fn new(nodes: Vec<NodeGene>, connections: Vec<ConnectionGene>) -> Self {
        let mut genome = Self { nodes, connections };
        genome.normalize();
        genome
    }

    pub fn normalize(&mut self) {
        self.nodes.sort_by_key(NodeGene::order);
        self.connections.sort_by_key(|c| c.innovation);
    }

    pub fn node(&self, id: usize) -> Option<&NodeGene> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: usize) -> bool {
        self.node(id).is_some()
    }

    pub fn has_connection(&self, source: usize, target: usize, recurrent: bool) -> bool {
        self.connections.iter().any(|c| c.links(source, target, recurrent))
    }

    pub fn hidden_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.role == NodeRole::Hidden).count()
    }
}

/// Where a network stands in its population. Reset for every offspring.
#[derive(Clone, Debug, Default)]
pub(crate) struct Standing {
    pub network_fitness: f64,
    pub shared_fitness: f64,
    pub expected_offspring: f64,
    pub species: Option<usize>,
    pub is_species_champion: bool,
    pub is_population_champion: bool,
    pub has_death_mark: bool,
    pub champion_offspring: usize,
}

#[derive(Clone)]
pub struct NetworkChromosome {
    genome: NetworkGenome,
    mutation: Rc<dyn Mutation<NetworkChromosome>>,
    crossover: Rc<dyn Crossover<NetworkChromosome>>,
    registry: SharedRegistry,
    /// Whether features discovered at runtime are wired to every output.
    wire_new_inputs: bool,
    cache: FitnessCache,
    pub(crate) standing: Standing,
    codons: Vec<i64>,
    trace: Option<ExecutionTrace>,
    coverage: BTreeSet<String>,
    score: f64,
    play_time_ms: u64,
    final_position: Option<Position2D>,
    defective: bool,
    /// Goal the network is currently evolved towards.
    target_fitness: Option<FitnessRef<NetworkChromosome>>,
    covered_statements: usize,
}

impl NetworkChromosome {
    pub fn new(
        genome: NetworkGenome,
        mutation: Rc<dyn Mutation<NetworkChromosome>>,
        crossover: Rc<dyn Crossover<NetworkChromosome>>,
        registry: SharedRegistry,
    ) -> Self {
        let mut genome = genome;
        genome.normalize();
        Self {
            genome,
            mutation,
            crossover,
            registry,
            wire_new_inputs: false,
            cache: FitnessCache::new(),
            standing: Standing::default(),
            codons: Vec::new(),
            trace: None,
            coverage: BTreeSet::new(),
            score: 0.0,
            play_time_ms: 0,
            final_position: None,
            defective: false,
            target_fitness: None,
            covered_statements: 0,
        }
    }

    #[must_use]
    pub fn with_full_input_wiring(mut self, wire: bool) -> Self {
        self.wire_new_inputs = wire;
        self
    }

    /// Same genes and operators, nothing else.
    #[must_use]
    pub fn clone_structure(&self) -> Self {
        self.clone_with_genome(self.genome.clone())
    }

    #[must_use]
    pub fn clone_with_genome(&self, genome: NetworkGenome) -> Self {
        let mut clone = Self::new(
            genome,
            Rc::clone(&self.mutation),
            Rc::clone(&self.crossover),
            Rc::clone(&self.registry),
        )
        .with_full_input_wiring(self.wire_new_inputs);
        clone.flush_node_values();
        clone
    }

    pub fn genome(&self) -> &NetworkGenome {
        &self.genome
    }

    pub(crate) fn genome_mut(&mut self) -> &mut NetworkGenome {
        &mut self.genome
    }

    pub fn nodes(&self) -> &[NodeGene] {
        &self.genome.nodes
    }

    pub fn connections(&self) -> &[ConnectionGene] {
        &self.genome.connections
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn network_fitness(&self) -> f64 {
        self.standing.network_fitness
    }

    pub fn set_network_fitness(&mut self, fitness: f64) {
        self.standing.network_fitness = fitness;
    }

    pub fn shared_fitness(&self) -> f64 {
        self.standing.shared_fitness
    }

    pub fn expected_offspring(&self) -> f64 {
        self.standing.expected_offspring
    }

    pub fn species(&self) -> Option<usize> {
        self.standing.species
    }

    pub fn is_species_champion(&self) -> bool {
        self.standing.is_species_champion
    }

    pub fn is_population_champion(&self) -> bool {
        self.standing.is_population_champion
    }

    pub fn has_death_mark(&self) -> bool {
        self.standing.has_death_mark
    }

    /// Indices of the events chosen in the last playthrough.
    pub fn codons(&self) -> &[i64] {
        &self.codons
    }

    pub(crate) fn codons_mut(&mut self) -> &mut Vec<i64> {
        &mut self.codons
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn play_time_ms(&self) -> u64 {
        self.play_time_ms
    }

    pub fn final_position(&self) -> Option<Position2D> {
        self.final_position
    }

    pub fn set_execution(&mut self, trace: ExecutionTrace, coverage: BTreeSet<String>) {
        self.trace = Some(trace);
        self.coverage = coverage;
        self.cache.clear();
    }

    pub fn set_outcome(&mut self, score: f64, play_time_ms: u64, final_position: Option<Position2D>) {
        self.score = score;
        self.play_time_ms = play_time_ms;
        self.final_position = final_position;
    }

    /// Whether the last playthrough ended because no output could be
    /// activated.
    pub fn is_defective(&self) -> bool {
        self.defective
    }

    pub(crate) fn set_defective(&mut self, defective: bool) {
        self.defective = defective;
    }

    /// Statements covered by the last playthrough, as counted by
    /// [`determine_covered_statements`](Self::determine_covered_statements).
    pub fn covered_statements(&self) -> usize {
        self.covered_statements
    }

    /// Counts and stores how many of `statements` the last playthrough
    /// covered.
    pub fn determine_covered_statements(&mut self, statements: &[FitnessRef<NetworkChromosome>]) -> Result<usize> {
        let mut covered = 0;
        for statement in statements {
            if statement.is_optimal(self.get_fitness(statement)?) {
                covered += 1;
            }
        }
        self.covered_statements = covered;
        Ok(covered)
    }

    pub fn is_recurrent(&self) -> bool {
        self.genome.connections.iter().any(|c| c.enabled && c.recurrent)
    }

    /// Adds an input node for every feature the genome has not seen yet.
    /// Returns whether any node was added.
    pub fn update_input_nodes(&mut self, features: &SpriteFeatures, rng: &mut Randomness) -> bool {
        let mut added = Vec::new();
        {
            let mut registry = self.registry.borrow_mut();
            for (sprite, values) in features {
                for feature in values.keys() {
                    let id = registry.input_node_id(sprite, feature);
                    if !self.genome.contains_node(id) {
                        self.genome.nodes.push(NodeGene::input(id, sprite.as_str(), feature.as_str()));
                        added.push(id);
                    }
                }
            }
        }
        if added.is_empty() {
            return false;
        }
        let outputs = self.output_ids();
        for input in added {
            if self.wire_new_inputs || rng.next_double() < 0.5 {
                for &output in &outputs {
                    self.connect(input, output, rng.next_double_min_max(-1.0, 1.0));
                }
            }
        }
        self.genome.normalize();
        true
    }

    /// Adds classification and regression nodes for events the genome has
    /// not seen yet, wired to every input. Returns whether any node was added.
    pub fn update_output_nodes(&mut self, events: &[Event], rng: &mut Randomness) -> bool {
        let mut added = Vec::new();
        {
            let mut registry = self.registry.borrow_mut();
            for event in events {
                let id = registry.classification_node_id(&event.id);
                if !self.genome.contains_node(id) {
                    self.genome.nodes.push(NodeGene::classification(id, event.id.as_str()));
                    added.push(id);
                }
                for parameter in &event.parameter_names {
                    let id = registry.regression_node_id(&event.id, parameter);
                    if !self.genome.contains_node(id) {
                        self.genome
                            .nodes
                            .push(NodeGene::regression(id, event.id.as_str(), parameter.as_str()));
                        added.push(id);
                    }
                }
            }
        }
        if added.is_empty() {
            return false;
        }
        let inputs: Vec<usize> = self
            .genome
            .nodes
            .iter()
            .filter(|n| matches!(n.role, NodeRole::Input { .. }))
            .map(|n| n.id)
            .collect();
        for output in added {
            for &input in &inputs {
                self.connect(input, output, rng.next_double_min_max(-1.0, 1.0));
            }
        }
        self.genome.normalize();
        true
    }

    fn connect(&mut self, source: usize, target: usize, weight: f64) {
        let innovation = self.registry.borrow_mut().connection_innovation(source, target, false);
        self.genome
            .connections
            .push(ConnectionGene::new(source, target, weight, innovation, false));
    }

    fn output_ids(&self) -> Vec<usize> {
        self.genome.nodes.iter().filter(|n| n.role.is_output()).map(|n| n.id).collect()
    }

    pub fn flush_node_values(&mut self) {
        for node in &mut self.genome.nodes {
            node.reset();
        }
    }

    fn set_up_inputs(&mut self, inputs: &SpriteFeatures) {
        for node in &mut self.genome.nodes {
            let value = match &node.role {
                NodeRole::Input { sprite, feature } => {
                    inputs.get(sprite).and_then(|features| features.get(feature)).copied()
                }
                NodeRole::Bias => Some(1.0),
                _ => None,
            };
            if let Some(value) = value {
                node.state.node_value = value;
                node.state.activation_value = value;
                node.state.activated = true;
                node.state.activation_count += 1;
            }
        }
    }

    /// Relaxes the network until some output has been activated.
    ///
    /// Every sweep first sums each node's enabled incoming connections over
    /// the activations of the previous sweep, then applies the activation
    /// functions. Returns `false` if no output fired within
    /// [`ACTIVATION_CAP`] sweeps.
    pub fn activate(&mut self, inputs: &SpriteFeatures) -> bool {
        self.set_up_inputs(inputs);
        let index: HashMap<usize, usize> =
            self.genome.nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
        let mut sums = vec![0.0; self.genome.nodes.len()];
        let mut fired = vec![false; self.genome.nodes.len()];
        for _ in 0..ACTIVATION_CAP {
            sums.fill(0.0);
            fired.fill(false);
            for connection in self.genome.connections.iter().filter(|c| c.enabled) {
                let (Some(&source), Some(&target)) = (index.get(&connection.source), index.get(&connection.target))
                else {
                    continue;
                };
                let state = &self.genome.nodes[source].state;
                sums[target] += connection.weight * state.activation_value;
                fired[target] |= state.activated;
            }
            for (i, node) in self.genome.nodes.iter_mut().enumerate() {
                if node.role.is_source() {
                    continue;
                }
                node.state.node_value = sums[i];
                node.state.activated = fired[i];
                if fired[i] {
                    node.state.last_activation_value = node.state.activation_value;
                    node.state.activation_value = node.activation_function.apply(sums[i]);
                    node.state.activation_count += 1;
                }
            }
            if self.outputs_activated() {
                return true;
            }
        }
        false
    }

    /// Activation as used while playing: recurrent networks take one step
    /// from their current state, feed-forward networks are flushed and
    /// relaxed until the signal crossed every hidden layer.
    pub fn activate_settled(&mut self, inputs: &SpriteFeatures) -> bool {
        if self.is_recurrent() {
            return self.activate(inputs);
        }
        self.flush_node_values();
        let mut working = true;
        for _ in 0..=self.genome.hidden_count() {
            working = self.activate(inputs);
            if !working {
                break;
            }
        }
        working
    }

    fn outputs_activated(&self) -> bool {
        self.genome
            .nodes
            .iter()
            .any(|n| n.role.is_output() && n.state.activation_count > 0)
    }

    /// All known features set to 1.
    pub fn dummy_inputs(&self) -> SpriteFeatures {
        let mut inputs = SpriteFeatures::new();
        for node in &self.genome.nodes {
            if let NodeRole::Input { sprite, feature } = &node.role {
                inputs.entry(sprite.clone()).or_default().insert(feature.clone(), 1.0);
            }
        }
        inputs
    }

    /// Softmax over the classification outputs of `events`, in event order.
    pub fn softmax(&self, events: &[Event]) -> Vec<f64> {
        let values: Vec<f64> = events
            .iter()
            .map(|event| {
                self.genome
                    .nodes
                    .iter()
                    .find(|n| matches!(&n.role, NodeRole::Classification { event: e } if *e == event.id))
                    .map_or(f64::NEG_INFINITY, |n| n.state.node_value)
            })
            .collect();
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return vec![1.0 / events.len().max(1) as f64; events.len()];
        }
        let exponentials: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
        let denominator: f64 = exponentials.iter().sum();
        exponentials.into_iter().map(|e| e / denominator).collect()
    }

    /// Index of the event with the highest softmax share.
    pub fn classify(&self, events: &[Event]) -> usize {
        self.softmax(events)
            .iter()
            .enumerate()
            .max_by(|a, b| cmp_f64_nan_last(*a.1, *b.1).then(b.0.cmp(&a.0)))
            .map_or(0, |(i, _)| i)
    }

    /// Regression outputs for the parameters of `event`, in parameter order.
    pub fn regression_values(&self, event: &Event) -> Vec<f64> {
        event
            .parameter_names
            .iter()
            .map(|parameter| {
                self.genome
                    .nodes
                    .iter()
                    .find(|n| {
                        matches!(&n.role, NodeRole::Regression { event: e, parameter: p }
                            if *e == event.id && p == parameter)
                    })
                    .map_or(0.0, |n| n.state.activation_value)
            })
            .collect()
    }

    /// Whether a connection `source → target` would close a cycle, that is
    /// whether `target` already feeds `source` through forward connections.
    /// Links leaving an output always count as recurrent.
    pub fn is_recurrent_path(&self, source: usize, target: usize, threshold: usize) -> bool {
        let mut visited = HashSet::new();
        self.reaches_backwards(source, target, 0, threshold, &mut visited)
    }

    fn reaches_backwards(
        &self,
        node: usize,
        target: usize,
        level: usize,
        threshold: usize,
        visited: &mut HashSet<usize>,
    ) -> bool {
        if self.genome.node(node).is_some_and(|n| n.role.is_output()) {
            return true;
        }
        let level = level + 1;
        if level > threshold {
            return false;
        }
        if node == target {
            return true;
        }
        for connection in &self.genome.connections {
            if connection.target != node || !connection.enabled || connection.recurrent {
                continue;
            }
            if visited.insert(connection.source)
                && self.reaches_backwards(connection.source, target, level, threshold, visited)
            {
                return true;
            }
        }
        false
    }
}

impl fmt::Debug for NetworkChromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkChromosome")
            .field("nodes", &self.genome.nodes.len())
            .field("connections", &self.genome.connections.len())
            .field("fitness", &self.standing.network_fitness)
            .field("species", &self.standing.species)
            .field("target", &self.target_fitness.as_ref().map(|t| t.describe()))
            .finish()
    }
}

impl HasTrace for NetworkChromosome {
    fn trace(&self) -> Option<&ExecutionTrace> {
        self.trace.as_ref()
    }

    fn coverage(&self) -> &BTreeSet<String> {
        &self.coverage
    }
}

impl Chromosome for NetworkChromosome {
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

    fn target_fitness(&self) -> Option<&FitnessRef<Self>> {
        self.target_fitness.as_ref()
    }

    fn set_target_fitness(&mut self, target: Option<FitnessRef<Self>>) {
        self.target_fitness = target;
    }

    fn same_genes(&self, other: &Self) -> bool {
        self.genome.connections == other.genome.connections
            && self
                .genome
                .nodes
                .iter()
                .map(|n| n.id)
                .eq(other.genome.nodes.iter().map(|n| n.id))
    }
}
