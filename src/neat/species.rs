//! Species: groups of structurally similar networks that share fitness and
//! breed among themselves.

use log::debug;

use crate::neat::network::{NetworkChromosome, NetworkGenome};
use crate::neat::properties::NeatProperties;
use crate::{Chromosome, Randomness};

/// `cE·E + cD·D + cW·W̄` over the innovation-aligned connection lists.
///
/// The alignment walks as many steps as the larger genome has connections;
/// `W̄` is the mean absolute weight difference of matching genes.
pub fn compatibility_distance(
    genome1: &NetworkGenome,
    genome2: &NetworkGenome,
    properties: &NeatProperties,
) -> f64 {
    let connections1 = &genome1.connections;
    let connections2 = &genome2.connections;
    let size1 = connections1.len();
    let size2 = connections2.len();
    let (mut i1, mut i2) = (0, 0);
    let (mut excess, mut disjoint, mut matching) = (0usize, 0usize, 0usize);
    let mut weight_difference = 0.0;
    for _ in 0..size1.max(size2) {
        if i1 >= size1 {
            excess += 1;
            i2 += 1;
        } else if i2 >= size2 {
            excess += 1;
            i1 += 1;
        } else {
            let c1 = &connections1[i1];
            let c2 = &connections2[i2];
            if c1.innovation == c2.innovation {
                matching += 1;
                weight_difference += (c1.weight - c2.weight).abs();
                i1 += 1;
                i2 += 1;
            } else if c1.innovation < c2.innovation {
                disjoint += 1;
                i1 += 1;
            } else {
                disjoint += 1;
                i2 += 1;
            }
        }
    }
    let structural =
        properties.disjoint_coefficient * disjoint as f64 + properties.excess_coefficient * excess as f64;
    if matching == 0 {
        structural
    } else {
        structural + properties.weight_coefficient * (weight_difference / matching as f64)
    }
}

#[derive(Clone, Debug)]
pub struct Species {
    id: usize,
    pub(crate) members: Vec<NetworkChromosome>,
    /// Offspring assigned to this species during the current speciation
    /// round; they replace `members` once the round is committed.
    pub(crate) incoming: Vec<NetworkChromosome>,
    pub(crate) age: usize,
    pub(crate) age_of_last_improvement: usize,
    current_best_fitness: f64,
    all_time_best_fitness: f64,
    average_fitness: f64,
    pub(crate) expected_offspring: usize,
    pub(crate) is_novel: bool,
}

impl Species {
    pub fn new(id: usize, is_novel: bool) -> Self {
        Self {
            id,
            members: Vec::new(),
            incoming: Vec::new(),
            age: 1,
            age_of_last_improvement: 0,
            current_best_fitness: 0.0,
            all_time_best_fitness: 0.0,
            average_fitness: 0.0,
            expected_offspring: 0,
            is_novel,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn members(&self) -> &[NetworkChromosome] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn age(&self) -> usize {
        self.age
    }

    pub fn expected_offspring(&self) -> usize {
        self.expected_offspring
    }

    pub fn current_best_fitness(&self) -> f64 {
        self.current_best_fitness
    }

    pub fn all_time_best_fitness(&self) -> f64 {
        self.all_time_best_fitness
    }

    pub fn average_fitness(&self) -> f64 {
        self.average_fitness
    }

    /// The network newcomers are compared against.
    pub fn representative(&self) -> Option<&NetworkChromosome> {
        self.members.first().or_else(|| self.incoming.first())
    }

    pub(crate) fn add(&mut self, mut network: NetworkChromosome) {
        network.standing.species = Some(self.id);
        self.members.push(network);
    }

    pub(crate) fn add_incoming(&mut self, mut network: NetworkChromosome) {
        network.standing.species = Some(self.id);
        self.incoming.push(network);
    }

    pub(crate) fn commit_incoming(&mut self) {
        self.members = std::mem::take(&mut self.incoming);
    }

    /// Fitness sharing. Stagnant species are penalised, young ones boosted
    /// by `age_significance`; the result is divided by the species size.
    pub fn assign_adjusted_fitness(&mut self, properties: &NeatProperties) {
        let mut age_debt =
            (self.age as i64 - self.age_of_last_improvement as i64 + 1) - properties.penalizing_age as i64;
        if age_debt == 0 {
            age_debt = 1;
        }
        if age_debt >= 1 {
            debug!("penalizing stagnant species {}", self.id);
        }
        let size = self.members.len() as f64;
        for member in &mut self.members {
            let mut shared = member.standing.network_fitness;
            if age_debt >= 1 {
                shared *= 0.01;
            }
            if self.age <= 10 {
                shared *= properties.age_significance;
            }
            if shared <= 0.0 {
                shared = 0.0001;
            }
            member.standing.shared_fitness = shared / size;
        }
        self.mark_kill_candidates(properties);
    }

    /// Sorts the members best first, records the species' best fitness and
    /// marks everyone outside the top `parents_per_species` share for death.
    /// At least the champion survives.
    pub fn mark_kill_candidates(&mut self, properties: &NeatProperties) {
        self.sort_members();
        let Some(champion) = self.members.first_mut() else {
            return;
        };
        champion.standing.is_species_champion = true;
        let best = champion.standing.network_fitness;
        self.current_best_fitness = best;
        if best > self.all_time_best_fitness {
            self.age_of_last_improvement = self.age;
            self.all_time_best_fitness = best;
        }
        let parents = ((properties.parents_per_species * self.members.len() as f64).floor() as usize).max(1);
        for member in self.members.iter_mut().skip(parents) {
            member.standing.has_death_mark = true;
        }
    }

    /// Adds up the integer parts of the members' expected offspring and
    /// carries the fractional parts over in `left_over`.
    pub fn offspring_count(&mut self, mut left_over: f64) -> f64 {
        self.expected_offspring = 0;
        self.update_average_fitness();
        for member in &self.members {
            let expected = member.standing.expected_offspring;
            self.expected_offspring += expected.floor() as usize;
            left_over += expected.fract();
            if left_over > 1.0 {
                let whole = left_over.floor();
                self.expected_offspring += whole as usize;
                left_over -= whole;
            }
        }
        left_over
    }

    fn update_average_fitness(&mut self) -> f64 {
        let sum: f64 = self.members.iter().map(|m| m.standing.shared_fitness).sum();
        self.average_fitness = sum / self.members.len().max(1) as f64;
        self.average_fitness
    }

    pub fn remove_marked(&mut self) {
        self.members.retain(|m| !m.standing.has_death_mark);
    }

    fn sort_members(&mut self) {
        self.members.sort_by(|a, b| {
            crate::cmp_f64_nan_last(b.standing.network_fitness, a.standing.network_fitness)
        });
    }

    /// Produces `expected_offspring` children.
    ///
    /// The champion is cloned once; a population champion additionally
    /// spends its bonus offspring on clones and mutants. The remaining
    /// children come from mutation alone or from crossover, the second parent
    /// being drawn from another species with probability
    /// `interspecies_mating`. `representatives` holds the first member of
    /// every non-empty species.
    pub fn breed(
        &mut self,
        properties: &NeatProperties,
        representatives: &[(usize, NetworkChromosome)],
        rng: &mut Randomness,
    ) -> Vec<NetworkChromosome> {
        if self.members.is_empty() {
            return Vec::new();
        }
        self.sort_members();
        let mut children = Vec::with_capacity(self.expected_offspring);
        let mut champion_clones = 0;
        for _ in 0..self.expected_offspring {
            let standing = &self.members[0].standing;
            let child = if standing.is_population_champion && standing.champion_offspring > 0 {
                let champion = &mut self.members[0];
                champion.standing.champion_offspring -= 1;
                if champion_clones < properties.population_champion_number_clones {
                    champion_clones += 1;
                    champion.clone_structure()
                } else {
                    champion.mutate(rng)
                }
            } else if champion_clones < 1 {
                champion_clones += 1;
                self.members[0].clone_structure()
            } else if rng.next_double() <= properties.mutation_without_crossover || self.members.len() == 1 {
                self.breed_mutation_only(rng)
            } else {
                self.breed_crossover(properties, representatives, rng)
            };
            children.push(child);
        }
        children
    }

    fn breed_mutation_only(&self, rng: &mut Randomness) -> NetworkChromosome {
        let parent = &self.members[rng.next_index(self.members.len())];
        parent.mutate(rng)
    }

    fn breed_crossover(
        &self,
        properties: &NeatProperties,
        representatives: &[(usize, NetworkChromosome)],
        rng: &mut Randomness,
    ) -> NetworkChromosome {
        let parent1 = &self.members[rng.next_index(self.members.len())];
        let parent2 = if rng.next_double() > properties.interspecies_mating || representatives.is_empty() {
            &self.members[rng.next_index(self.members.len())]
        } else {
            let mut picked = &representatives[rng.next_index(representatives.len())];
            let mut tries = 1;
            while picked.0 == self.id && tries < 5 {
                picked = &representatives[rng.next_index(representatives.len())];
                tries += 1;
            }
            &picked.1
        };
        let (child, _) = parent1.crossover(parent2, rng);
        let distance = compatibility_distance(parent1.genome(), parent2.genome(), properties);
        if rng.next_double() > properties.crossover_without_mutation || distance == 0.0 {
            child.mutate(rng)
        } else {
            child
        }
    }
}
