use log::{debug, info};

use crate::neat::network::NetworkChromosome;
use crate::neat::properties::NeatProperties;
use crate::neat::species::{compatibility_distance, Species};
use crate::{cmp_f64_nan_last, ChromosomeGenerator, Randomness};

/// Adjustment applied to the distance threshold each generation to steer
/// the number of species towards the target.
const COMPATIBILITY_MODIFIER: f64 = 0.3;

/// A speciated population of networks.
///
/// Networks live inside their species; `(species index, member index)`
/// pairs address them from the outside.
pub struct NeatPopulation {
    properties: NeatProperties,
    species: Vec<Species>,
    next_species_id: usize,
    generation: usize,
    highest_fitness: f64,
    highest_fitness_last_changed: usize,
    average_fitness: f64,
    average_shared_fitness: f64,
    champion: Option<NetworkChromosome>,
}

impl NeatPopulation {
    pub fn new(properties: NeatProperties) -> Self {
        Self {
            properties,
            species: Vec::new(),
            next_species_id: 0,
            generation: 0,
            highest_fitness: 0.0,
            highest_fitness_last_changed: 0,
            average_fitness: 0.0,
            average_shared_fitness: 0.0,
            champion: None,
        }
    }

    pub fn properties(&self) -> &NeatProperties {
        &self.properties
    }

    pub fn distance_threshold(&self) -> f64 {
        self.properties.distance_threshold
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn highest_fitness(&self) -> f64 {
        self.highest_fitness
    }

    pub fn average_fitness(&self) -> f64 {
        self.average_fitness
    }

    /// Snapshot of the population champion taken by the last
    /// [`update_population_statistics`](Self::update_population_statistics).
    pub fn champion(&self) -> Option<&NetworkChromosome> {
        self.champion.as_ref()
    }

    pub fn len(&self) -> usize {
        self.species.iter().map(Species::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn networks(&self) -> impl Iterator<Item = &NetworkChromosome> {
        self.species.iter().flat_map(|s| s.members.iter())
    }

    pub fn networks_mut(&mut self) -> impl Iterator<Item = &mut NetworkChromosome> {
        self.species.iter_mut().flat_map(|s| s.members.iter_mut())
    }

    pub fn positions(&self) -> Vec<(usize, usize)> {
        self.species
            .iter()
            .enumerate()
            .flat_map(|(s, species)| (0..species.members.len()).map(move |m| (s, m)))
            .collect()
    }

    pub fn network(&self, (species, member): (usize, usize)) -> Option<&NetworkChromosome> {
        self.species.get(species)?.members.get(member)
    }

    pub fn network_mut(&mut self, (species, member): (usize, usize)) -> Option<&mut NetworkChromosome> {
        self.species.get_mut(species)?.members.get_mut(member)
    }

    /// Fills the population up to `population_size` fresh networks.
    pub fn generate<G>(&mut self, generator: &mut G, rng: &mut Randomness)
    where
        G: ChromosomeGenerator<NetworkChromosome> + ?Sized,
    {
        while self.len() < self.properties.population_size {
            let network = generator.get(rng);
            self.speciate(network, false);
        }
        info!(
            "generated {} networks in {} species",
            self.len(),
            self.species.len()
        );
    }

    /// Puts `network` into the first species whose representative is closer
    /// than the distance threshold, or into a new species.
    pub fn speciate(&mut self, network: NetworkChromosome, incoming: bool) {
        let threshold = self.properties.distance_threshold;
        let found = self.species.iter().position(|species| {
            species.representative().is_some_and(|representative| {
                compatibility_distance(network.genome(), representative.genome(), &self.properties) < threshold
            })
        });
        let index = match found {
            Some(index) => index,
            None => {
                self.species.push(Species::new(self.next_species_id, true));
                self.next_species_id += 1;
                self.species.len() - 1
            }
        };
        let species = &mut self.species[index];
        if incoming {
            species.add_incoming(network);
        } else {
            species.add(network);
        }
    }

    /// Shares fitness, distributes offspring among species and crowns the
    /// population champion. Call once every network has been evaluated.
    pub fn update_population_statistics(&mut self) {
        if self.is_empty() {
            return;
        }
        self.update_compatibility_threshold();
        self.calculate_fitness_distribution();
        self.assign_number_of_offspring();
        let count = self.len() as f64;
        self.average_fitness = self.networks().map(NetworkChromosome::network_fitness).sum::<f64>() / count;
    }

    fn update_compatibility_threshold(&mut self) {
        if self.generation <= 1 {
            return;
        }
        let target = self.properties.number_of_species;
        if self.species.len() < target {
            self.properties.distance_threshold -= COMPATIBILITY_MODIFIER;
        } else if self.species.len() > target {
            self.properties.distance_threshold += COMPATIBILITY_MODIFIER;
        }
        if self.properties.distance_threshold < COMPATIBILITY_MODIFIER {
            self.properties.distance_threshold = COMPATIBILITY_MODIFIER;
        }
    }

    fn calculate_fitness_distribution(&mut self) {
        for species in &mut self.species {
            species.assign_adjusted_fitness(&self.properties);
        }
        let count = self.len() as f64;
        self.average_shared_fitness = self.networks().map(NetworkChromosome::shared_fitness).sum::<f64>() / count;
    }

    fn assign_number_of_offspring(&mut self) {
        let average = self.average_shared_fitness;
        for network in self.networks_mut() {
            network.standing.expected_offspring = network.standing.shared_fitness / average;
        }

        let mut left_over = 0.0;
        let mut total_expected = 0;
        for species in &mut self.species {
            left_over = species.offspring_count(left_over);
            total_expected += species.expected_offspring;
        }

        self.species.sort_by(|a, b| b.expected_offspring.cmp(&a.expected_offspring));

        let Some((champion_species, champion_member)) = self.champion_position() else {
            return;
        };
        let bonus = self.properties.population_champion_number_offspring;
        let champion = &mut self.species[champion_species].members[champion_member];
        champion.standing.is_population_champion = true;
        champion.standing.champion_offspring = bonus;
        let champion_fitness = champion.standing.network_fitness;
        self.champion = Some(champion.clone());

        let start_size = self.properties.population_size;
        if total_expected < start_size {
            self.species[champion_species].expected_offspring += start_size - total_expected;
        }

        if champion_fitness > self.highest_fitness {
            self.highest_fitness = champion_fitness;
            self.highest_fitness_last_changed = 0;
        } else {
            self.highest_fitness_last_changed += 1;
        }

        if self.highest_fitness_last_changed > self.properties.penalizing_age + 5 {
            self.refocus();
        }
    }

    /// First network with the highest network fitness.
    fn champion_position(&self) -> Option<(usize, usize)> {
        let mut best: Option<((usize, usize), f64)> = None;
        for position in self.positions() {
            let Some(network) = self.network(position) else {
                continue;
            };
            let fitness = network.network_fitness();
            let better = best.is_none_or(|(_, f)| cmp_f64_nan_last(fitness, f).is_gt());
            if better {
                best = Some((position, fitness));
            }
        }
        best.map(|(position, _)| position)
    }

    /// Stagnation: only the two most promising species may reproduce.
    fn refocus(&mut self) {
        info!("fitness stagnated, refocusing the search on the most promising species");
        self.highest_fitness_last_changed = 0;
        let start_size = self.properties.population_size;
        if self.species.len() == 1 {
            let species = &mut self.species[0];
            if let Some(champion) = species.members.first_mut() {
                champion.standing.champion_offspring = start_size;
            }
            species.expected_offspring = start_size;
            species.age_of_last_improvement = species.age;
            return;
        }
        for (i, species) in self.species.iter_mut().enumerate() {
            if i <= 1 {
                if let Some(champion) = species.members.first_mut() {
                    champion.standing.champion_offspring = start_size / 2;
                }
                species.expected_offspring = start_size.div_ceil(2);
                species.age_of_last_improvement = species.age;
            } else {
                species.expected_offspring = 0;
            }
        }
    }

    /// Replaces the population by the offspring of its species.
    pub fn evolve(&mut self, rng: &mut Randomness) {
        for species in &mut self.species {
            species.remove_marked();
        }
        let representatives: Vec<(usize, NetworkChromosome)> = self
            .species
            .iter()
            .filter_map(|s| s.members.first().map(|m| (s.id(), m.clone())))
            .collect();

        let mut offspring = Vec::new();
        for index in 0..self.species.len() {
            let children = self.species[index].breed(&self.properties, &representatives, rng);
            offspring.extend(children);
        }
        for child in offspring {
            self.speciate(child, true);
        }
        for species in &mut self.species {
            species.commit_incoming();
        }

        self.species.retain(|s| !s.is_empty());
        for species in &mut self.species {
            if species.is_novel {
                species.is_novel = false;
            } else {
                species.age += 1;
            }
        }
        self.generation += 1;
        debug!(
            "generation {}: {} networks in {} species, threshold {:.2}",
            self.generation,
            self.len(),
            self.species.len(),
            self.properties.distance_threshold
        );
    }
}
