use std::rc::Rc;

use crate::neat::crossover::NeatCrossover;
use crate::neat::gene::{ActivationFunction, ConnectionGene, NodeGene};
use crate::neat::mutation::NeatMutation;
use crate::neat::network::{NetworkChromosome, NetworkGenome, SpriteFeatures};
use crate::neat::properties::{NeatProperties, NetworkTopology};
use crate::neat::registry::SharedRegistry;
use crate::testcase::{Event, ProgramUnderTest};
use crate::{ChromosomeGenerator, Randomness};

/// Builds initial networks from the features and events a program exposes.
///
/// Inputs are grouped per sprite; the bias forms a group of its own. How
/// groups are wired to the outputs depends on the [`NetworkTopology`].
pub struct NetworkChromosomeGenerator {
    inputs: Vec<(String, Vec<String>)>,
    events: Vec<Event>,
    topology: NetworkTopology,
    hidden_activation_function: ActivationFunction,
    mutation: Rc<NeatMutation>,
    crossover: Rc<NeatCrossover>,
    registry: SharedRegistry,
}

const BIAS_GROUP: &str = "Bias";

impl NetworkChromosomeGenerator {
    pub fn new(
        inputs: &SpriteFeatures,
        events: Vec<Event>,
        properties: &NeatProperties,
        registry: SharedRegistry,
    ) -> Self {
        Self {
            inputs: inputs
                .iter()
                .map(|(sprite, features)| (sprite.clone(), features.keys().cloned().collect()))
                .collect(),
            events,
            topology: properties.topology,
            hidden_activation_function: properties.hidden_activation_function,
            mutation: Rc::new(NeatMutation::new(properties, Rc::clone(&registry))),
            crossover: Rc::new(NeatCrossover::new(properties.crossover_average_weights)),
            registry,
        }
    }

    /// Reads the current features and events of a started program.
    pub fn from_program<P: ProgramUnderTest>(
        program: &P,
        properties: &NeatProperties,
        registry: SharedRegistry,
    ) -> Self {
        Self::new(&program.sprite_features(), program.available_events(), properties, registry)
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn mutation(&self) -> &Rc<NeatMutation> {
        &self.mutation
    }

    /// Input and bias nodes grouped per sprite, then all output nodes.
    fn create_nodes(&self) -> (Vec<(String, Vec<NodeGene>)>, Vec<NodeGene>) {
        let mut registry = self.registry.borrow_mut();
        let mut groups: Vec<(String, Vec<NodeGene>)> = self
            .inputs
            .iter()
            .map(|(sprite, features)| {
                let nodes = features
                    .iter()
                    .map(|feature| NodeGene::input(registry.input_node_id(sprite, feature), sprite.as_str(), feature.as_str()))
                    .collect();
                (sprite.clone(), nodes)
            })
            .collect();
        groups.push((BIAS_GROUP.to_string(), vec![NodeGene::bias(registry.bias_node_id())]));

        let mut outputs = Vec::new();
        for event in &self.events {
            outputs.push(NodeGene::classification(
                registry.classification_node_id(&event.id),
                event.id.as_str(),
            ));
        }
        for event in &self.events {
            for parameter in &event.parameter_names {
                outputs.push(NodeGene::regression(
                    registry.regression_node_id(&event.id, parameter),
                    event.id.as_str(),
                    parameter.as_str(),
                ));
            }
        }
        (groups, outputs)
    }

    fn link(&self, connections: &mut Vec<ConnectionGene>, source: usize, target: usize) {
        if connections.iter().any(|c| c.links(source, target, false)) {
            return;
        }
        let innovation = self.registry.borrow_mut().connection_innovation(source, target, false);
        connections.push(ConnectionGene::new(source, target, 0.0, innovation, false));
    }

    fn wire(
        &self,
        groups: &[(String, Vec<NodeGene>)],
        outputs: &[NodeGene],
        rng: &mut Randomness,
    ) -> (Vec<NodeGene>, Vec<ConnectionGene>) {
        let mut hidden = Vec::new();
        let mut connections = Vec::new();
        match &self.topology {
            NetworkTopology::Fully => {
                for (_, group) in groups {
                    for input in group {
                        for output in outputs {
                            self.link(&mut connections, input.id, output.id);
                        }
                    }
                }
            }
            NetworkTopology::FullyHidden => {
                for (sprite, group) in groups {
                    let id = self.registry.borrow_mut().sprite_hidden_node_id(sprite);
                    hidden.push(NodeGene::hidden(id, self.hidden_activation_function));
                    for input in group {
                        self.link(&mut connections, input.id, id);
                    }
                    for output in outputs {
                        self.link(&mut connections, id, output.id);
                    }
                }
            }
            NetworkTopology::Sparse { input_rate } => loop {
                if let Some((_, group)) = rng.pick(groups) {
                    for input in group {
                        for output in outputs {
                            self.link(&mut connections, input.id, output.id);
                        }
                    }
                }
                if rng.next_double() >= *input_rate {
                    break;
                }
            },
        }
        (hidden, connections)
    }
}

impl ChromosomeGenerator<NetworkChromosome> for NetworkChromosomeGenerator {
    fn get(&mut self, rng: &mut Randomness) -> NetworkChromosome {
        let (groups, outputs) = self.create_nodes();
        let (hidden, connections) = self.wire(&groups, &outputs, rng);
        let nodes = groups
            .into_iter()
            .flat_map(|(_, group)| group)
            .chain(hidden)
            .chain(outputs)
            .collect();
        let full_wiring = !matches!(self.topology, NetworkTopology::Sparse { .. });
        let mut network = NetworkChromosome::new(
            NetworkGenome::new(nodes, connections),
            self.mutation.clone(),
            self.crossover.clone(),
            Rc::clone(&self.registry),
        )
        .with_full_input_wiring(full_wiring);
        self.mutation.mutate_weights(&mut network, 1.0, 1.0, rng);
        network
    }
}
