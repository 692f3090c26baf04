use crate::neat::gene::{ActivationFunction, ConnectionGene, NodeGene, NodeRole};
use crate::neat::network::NetworkChromosome;
use crate::neat::properties::NeatProperties;
use crate::neat::registry::SharedRegistry;
use crate::{Mutation, Randomness};

/// Structural and weight mutation of network chromosomes.
///
/// A population champion either gains a connection or has its weights
/// perturbed. Everyone else gains a node, else a connection, else runs
/// any of weight perturbation, toggling and re-enabling.
pub struct NeatMutation {
    add_node: f64,
    add_connection: f64,
    recurrent_connection: f64,
    add_connection_tries: usize,
    champion_connection: f64,
    mutate_weights: f64,
    perturbation_power: f64,
    toggle_enable: f64,
    toggle_times: usize,
    reenable: f64,
    hidden_activation_function: ActivationFunction,
    registry: SharedRegistry,
}

impl NeatMutation {
    pub fn new(properties: &NeatProperties, registry: SharedRegistry) -> Self {
        Self {
            add_node: properties.mutation_add_node,
            add_connection: properties.mutation_add_connection,
            recurrent_connection: properties.recurrent_connection,
            add_connection_tries: properties.add_connection_tries,
            champion_connection: properties.population_champion_connection_mutation,
            mutate_weights: properties.mutate_weights,
            perturbation_power: properties.perturbation_power,
            toggle_enable: properties.mutate_toggle_enable_connection,
            toggle_times: properties.toggle_enable_connection_times,
            reenable: properties.mutate_enable_connection,
            hidden_activation_function: properties.hidden_activation_function,
            registry,
        }
    }

    /// Tries up to `add_connection_tries` random node pairs for a new link.
    /// With probability `recurrent_connection` the link must close a cycle
    /// (a hidden self-loop a quarter of the time), otherwise it must not.
    pub fn mutate_add_connection(&self, network: &mut NetworkChromosome, rng: &mut Randomness) -> bool {
        let all: Vec<usize> = network.nodes().iter().map(|n| n.id).collect();
        let targets: Vec<usize> = network
            .nodes()
            .iter()
            .filter(|n| !n.role.is_source())
            .map(|n| n.id)
            .collect();
        let hidden: Vec<usize> = network
            .nodes()
            .iter()
            .filter(|n| n.role == NodeRole::Hidden)
            .map(|n| n.id)
            .collect();
        if targets.is_empty() {
            return false;
        }
        let recurrent = rng.next_double() < self.recurrent_connection;
        let threshold = all.len() * all.len();
        let mut found = None;
        for _ in 0..self.add_connection_tries {
            let (source, target) = if recurrent {
                if !hidden.is_empty() && rng.next_double() < 0.25 {
                    let node = hidden[rng.next_index(hidden.len())];
                    (node, node)
                } else {
                    (targets[rng.next_index(targets.len())], targets[rng.next_index(targets.len())])
                }
            } else {
                (all[rng.next_index(all.len())], targets[rng.next_index(targets.len())])
            };
            if !recurrent && source == target {
                continue;
            }
            if network.genome().has_connection(source, target, recurrent) {
                continue;
            }
            if network.is_recurrent_path(source, target, threshold) == recurrent {
                found = Some((source, target));
                break;
            }
        }
        let Some((source, target)) = found else {
            return false;
        };
        let sign = if rng.random_bool() { 1.0 } else { -1.0 };
        let weight = sign * rng.next_double() * self.perturbation_power;
        let innovation = self
            .registry
            .borrow_mut()
            .connection_innovation(source, target, recurrent);
        let genome = network.genome_mut();
        genome
            .connections
            .push(ConnectionGene::new(source, target, weight, innovation, recurrent));
        genome.normalize();
        true
    }

    /// Splits a random enabled connection `a → b` into `a → h → b`. The
    /// incoming link gets weight 1, the outgoing link the old weight.
    pub fn mutate_add_node(&self, network: &mut NetworkChromosome, rng: &mut Randomness) -> bool {
        let connection_count = network.connections().len();
        if connection_count == 0 {
            return false;
        }
        let mut split = None;
        for _ in 0..20 {
            let index = rng.next_index(connection_count);
            let candidate = &network.connections()[index];
            let from_bias = network
                .genome()
                .node(candidate.source)
                .is_some_and(|n| n.role == NodeRole::Bias);
            if candidate.enabled && !from_bias {
                split = Some(index);
                break;
            }
        }
        let Some(index) = split else {
            return false;
        };
        let (source, target, weight, recurrent) = {
            let connection = &mut network.genome_mut().connections[index];
            connection.enabled = false;
            (connection.source, connection.target, connection.weight, connection.recurrent)
        };
        let (hidden, incoming, outgoing) = {
            let mut registry = self.registry.borrow_mut();
            let mut hidden = registry.split_node_id(source, target);
            if network.genome().contains_node(hidden) {
                hidden = registry.fresh_node_id();
            }
            let incoming = registry.connection_innovation(source, hidden, recurrent);
            let outgoing = registry.connection_innovation(hidden, target, false);
            (hidden, incoming, outgoing)
        };
        let genome = network.genome_mut();
        genome
            .nodes
            .push(NodeGene::hidden(hidden, self.hidden_activation_function));
        genome
            .connections
            .push(ConnectionGene::new(source, hidden, 1.0, incoming, recurrent));
        genome
            .connections
            .push(ConnectionGene::new(hidden, target, weight, outgoing, false));
        genome.normalize();
        true
    }

    /// Perturbs (adds to) or replaces weights. A severe round uses fixed
    /// thresholds; otherwise the tail of a large genome is treated more
    /// gently than its head.
    pub fn mutate_weights(&self, network: &mut NetworkChromosome, power: f64, rate: f64, rng: &mut Randomness) {
        let severe = rng.next_double() > 0.5;
        let connections = &mut network.genome_mut().connections;
        let size = connections.len();
        let end_part = size as f64 * 0.8;
        for (counter, connection) in connections.iter_mut().enumerate() {
            let (gauss_point, cold_gauss_point) = if severe {
                (0.3, 0.1)
            } else if size >= 10 && counter as f64 > end_part {
                (0.5, 0.3)
            } else if rng.next_double() > 0.5 {
                (1.0 - rate, 1.0 - rate - 0.1)
            } else {
                (1.0 - rate, 1.0 - rate)
            };
            let sign = if rng.random_bool() { 1.0 } else { -1.0 };
            let modification = sign * rng.next_double() * power;
            let draw = rng.next_double();
            if draw > gauss_point {
                connection.weight += modification;
            } else if draw > cold_gauss_point {
                connection.weight = modification;
            }
        }
    }

    /// Flips `times + 1` random connections. An enabled connection is only
    /// disabled if it is recurrent or its source keeps another enabled link.
    pub fn mutate_toggle_enable_connection(&self, network: &mut NetworkChromosome, times: usize, rng: &mut Randomness) {
        let connections = &mut network.genome_mut().connections;
        if connections.is_empty() {
            return;
        }
        for _ in 0..=times {
            let index = rng.next_index(connections.len());
            let chosen = &connections[index];
            if chosen.enabled {
                let keeps_source_alive = chosen.recurrent
                    || connections.iter().any(|other| {
                        other.source == chosen.source && other.enabled && other.innovation != chosen.innovation
                    });
                if keeps_source_alive {
                    connections[index].enabled = false;
                }
            } else {
                connections[index].enabled = true;
            }
        }
    }

    /// Enables the first disabled connection.
    pub fn mutate_connection_reenable(&self, network: &mut NetworkChromosome) -> bool {
        match network.genome_mut().connections.iter_mut().find(|c| !c.enabled) {
            Some(connection) => {
                connection.enabled = true;
                true
            }
            None => false,
        }
    }
}

impl Mutation<NetworkChromosome> for NeatMutation {
    fn apply(&self, parent: &NetworkChromosome, rng: &mut Randomness) -> NetworkChromosome {
        let mut mutant = parent.clone_structure();
        if parent.is_population_champion() {
            if rng.next_double() <= self.champion_connection {
                self.mutate_add_connection(&mut mutant, rng);
            } else {
                self.mutate_weights(&mut mutant, self.perturbation_power, 1.0, rng);
            }
        } else if rng.next_double() < self.add_node {
            self.mutate_add_node(&mut mutant, rng);
        } else if rng.next_double() < self.add_connection {
            self.mutate_add_connection(&mut mutant, rng);
        } else {
            if rng.next_double() < self.mutate_weights {
                self.mutate_weights(&mut mutant, self.perturbation_power, 1.0, rng);
            }
            if rng.next_double() < self.toggle_enable {
                self.mutate_toggle_enable_connection(&mut mutant, self.toggle_times, rng);
            }
            if rng.next_double() < self.reenable {
                self.mutate_connection_reenable(&mut mutant);
            }
        }
        mutant
    }
}
