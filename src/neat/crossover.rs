use std::collections::BTreeMap;

use crate::neat::gene::{ConnectionGene, NodeGene};
use crate::neat::network::{NetworkChromosome, NetworkGenome};
use crate::{Crossover, Randomness};

/// Multipoint crossover aligning connections by innovation number.
///
/// Matching genes are inherited from either parent at random (or averaged),
/// disjoint and excess genes only from the dominant parent: the fitter one,
/// or the smaller one on a tie.
#[derive(Clone, Copy, Debug)]
pub struct NeatCrossover {
    average_weights_probability: f64,
}

impl NeatCrossover {
    pub fn new(average_weights_probability: f64) -> Self {
        Self {
            average_weights_probability,
        }
    }

    pub fn cross(
        &self,
        parent1: &NetworkChromosome,
        parent2: &NetworkChromosome,
        rng: &mut Randomness,
    ) -> NetworkChromosome {
        let average_weights = rng.next_double() < self.average_weights_probability;
        let (dominant, other) = if Self::first_dominates(parent1, parent2) {
            (parent1, parent2)
        } else {
            (parent2, parent1)
        };

        let recessive: BTreeMap<u64, &ConnectionGene> = other
            .connections()
            .iter()
            .map(|c| (c.innovation, c))
            .collect();

        let mut connections = Vec::with_capacity(dominant.connections().len());
        for gene in dominant.connections() {
            let mut child = match recessive.get(&gene.innovation) {
                Some(&matching) => {
                    let mut inherited = if rng.random_bool() { gene.clone() } else { matching.clone() };
                    if average_weights {
                        inherited.weight = (gene.weight + matching.weight) / 2.0;
                    }
                    if !gene.enabled || !matching.enabled {
                        inherited.enabled = rng.next_double() >= 0.75;
                    }
                    inherited
                }
                None => gene.clone(),
            };
            if child.source == child.target {
                child.recurrent = true;
            }
            connections.push(child);
        }

        let nodes = Self::inherit_nodes(&connections, dominant, other);
        let mut child = dominant.clone_with_genome(NetworkGenome::new(nodes, connections));
        Self::repair(&mut child);
        child
    }

    fn first_dominates(parent1: &NetworkChromosome, parent2: &NetworkChromosome) -> bool {
        let f1 = parent1.network_fitness();
        let f2 = parent2.network_fitness();
        if f1 == f2 {
            parent1.connections().len() <= parent2.connections().len()
        } else {
            f1 > f2
        }
    }

    /// Every input, bias and output node of the dominant parent, plus each
    /// hidden node some inherited connection touches.
    fn inherit_nodes(
        connections: &[ConnectionGene],
        dominant: &NetworkChromosome,
        other: &NetworkChromosome,
    ) -> Vec<NodeGene> {
        let mut nodes: BTreeMap<usize, NodeGene> = dominant
            .nodes()
            .iter()
            .filter(|n| n.role.is_source() || n.role.is_output())
            .map(|n| (n.id, n.clone()))
            .collect();
        for connection in connections {
            for id in [connection.source, connection.target] {
                if nodes.contains_key(&id) {
                    continue;
                }
                if let Some(node) = dominant.genome().node(id).or_else(|| other.genome().node(id)) {
                    nodes.insert(id, node.clone());
                }
            }
        }
        nodes.into_values().collect()
    }

    /// Re-enables connections until the child can propagate a signal to some
    /// output, then clears the trial activation.
    fn repair(child: &mut NetworkChromosome) {
        loop {
            let inputs = child.dummy_inputs();
            if child.activate(&inputs) {
                break;
            }
            let Some(disabled) = child.genome_mut().connections.iter_mut().find(|c| !c.enabled) else {
                break;
            };
            disabled.enabled = true;
            child.flush_node_values();
        }
        child.flush_node_values();
    }
}

impl Crossover<NetworkChromosome> for NeatCrossover {
    fn apply(
        &self,
        parent1: &NetworkChromosome,
        parent2: &NetworkChromosome,
        rng: &mut Randomness,
    ) -> (NetworkChromosome, NetworkChromosome) {
        let first = self.cross(parent1, parent2, rng);
        let second = self.cross(parent2, parent1, rng);
        (first, second)
    }
}
