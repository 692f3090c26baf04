use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use whisker_search::algorithms::neat::Neat;
use whisker_search::neat::{
    compatibility_distance, ActivationFunction, CombinedNetworkFitness, ConnectionGene, EventSelection,
    InnovationRegistry, NeatCrossover, NeatMutation, NeatPopulation, NeatProperties, NetworkChromosome,
    NetworkChromosomeGenerator, NetworkExecutor, NetworkFitnessFunction, NetworkGenome, NodeGene, NoveltyFitness,
    ReliableStatementFitness, ScoreFitness, SharedRegistry, SpriteFeatures, StatementNetworkFitness,
    SurviveFitness,
};
use whisker_search::position::Position2D;
use whisker_search::stopping::FixedIterationsStoppingCondition;
use whisker_search::testcase::{
    BlockTrace, ControlGraph, Event, GraphNode, HasTrace, ProgramUnderTest, StatementFitnessFunction,
};
use whisker_search::{
    Chromosome, ChromosomeGenerator, FitnessMap, FitnessRef, Randomness, Result, SearchAlgorithm,
    SearchContext, SearchError,
};

// --- Mock Infrastructure ---

const RIGHT: &str = "KeyPress:right";

/// A one-sprite game: pressing right moves the player ten steps and covers
/// `move`; time advances 100ms per waited step.
struct FakeGame {
    events: Vec<Event>,
    running: bool,
    x: f64,
    millis: u64,
    moved: bool,
}

impl FakeGame {
    fn new() -> Self {
        Self::with_events(vec![Event::wait(), Event::action(RIGHT, vec![])])
    }

    fn with_events(events: Vec<Event>) -> Self {
        Self {
            events,
            running: false,
            x: 0.0,
            millis: 0,
            moved: false,
        }
    }
}

impl ProgramUnderTest for FakeGame {
    fn start(&mut self) {
        self.running = true;
        self.x = 0.0;
        self.millis = 0;
        self.moved = false;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn available_events(&self) -> Vec<Event> {
        self.events.clone()
    }

    fn apply(&mut self, event: &Event, parameters: &[i64]) -> Result<()> {
        if event.is_wait() {
            let steps = parameters.first().copied().unwrap_or(1).max(0) as u64;
            self.millis += 100 * steps;
        } else if event.id == RIGHT {
            self.x += 10.0;
            self.moved = true;
        } else {
            return Err(SearchError::UnknownEvent(event.id.clone()));
        }
        Ok(())
    }

    fn current_millis(&self) -> u64 {
        self.millis
    }

    fn sprite_features(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        BTreeMap::from([(
            String::from("Player"),
            BTreeMap::from([(String::from("X"), self.x / 240.0), (String::from("Y"), 0.0)]),
        )])
    }

    fn variables(&self) -> Vec<(String, f64)> {
        vec![(String::from("score"), self.x / 10.0), (String::from("speed"), 3.0)]
    }

    fn player_position(&self) -> Option<Position2D> {
        Some(Position2D::new(self.x, 0.0))
    }

    fn block_traces(&self) -> Vec<BlockTrace> {
        let mut traces = vec![BlockTrace::new("start", "event_whenflagclicked", vec![(0.0, 1.0)])];
        if self.moved {
            traces.push(BlockTrace::new("move", "motion_changexby", vec![]));
        }
        traces
    }

    fn coverage(&self) -> BTreeSet<String> {
        let mut covered = BTreeSet::from([String::from("start")]);
        if self.moved {
            covered.insert(String::from("move"));
        }
        covered
    }

    fn reset_state(&mut self) {
        self.x = 0.0;
        self.moved = false;
    }

    fn seed(&mut self, _seed: u64) {}
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn features(x: f64) -> SpriteFeatures {
    BTreeMap::from([(
        String::from("Player"),
        BTreeMap::from([(String::from("X"), x), (String::from("Y"), 0.0)]),
    )])
}

fn network(genome: NetworkGenome, registry: &SharedRegistry) -> NetworkChromosome {
    let properties = NeatProperties::default();
    NetworkChromosome::new(
        genome,
        Rc::new(NeatMutation::new(&properties, Rc::clone(registry))),
        Rc::new(NeatCrossover::new(properties.crossover_average_weights)),
        Rc::clone(registry),
    )
}

/// Node ids of the fake game, as the registry hands them out.
struct Ids {
    x: usize,
    y: usize,
    bias: usize,
    wait: usize,
    duration: usize,
    right: usize,
}

fn ids(registry: &SharedRegistry) -> Ids {
    let mut r = registry.borrow_mut();
    Ids {
        x: r.input_node_id("Player", "X"),
        y: r.input_node_id("Player", "Y"),
        bias: r.bias_node_id(),
        wait: r.classification_node_id("WaitEvent"),
        duration: r.regression_node_id("WaitEvent", "Duration"),
        right: r.classification_node_id(RIGHT),
    }
}

/// Every node of the fake game, no connections.
fn unconnected_nodes(ids: &Ids) -> Vec<NodeGene> {
    vec![
        NodeGene::input(ids.x, "Player", "X"),
        NodeGene::input(ids.y, "Player", "Y"),
        NodeGene::bias(ids.bias),
        NodeGene::classification(ids.wait, "WaitEvent"),
        NodeGene::regression(ids.duration, "WaitEvent", "Duration"),
        NodeGene::classification(ids.right, RIGHT),
    ]
}

fn link(registry: &SharedRegistry, source: usize, target: usize, weight: f64) -> ConnectionGene {
    let innovation = registry.borrow_mut().connection_innovation(source, target, false);
    ConnectionGene::new(source, target, weight, innovation, false)
}

fn game_events() -> Vec<Event> {
    vec![Event::wait(), Event::action(RIGHT, vec![])]
}

fn small_properties() -> NeatProperties {
    NeatProperties {
        population_size: 10,
        timeout: 1_000,
        event_selection: EventSelection::Random,
        ..NeatProperties::default()
    }
}

/// start → move in both graphs.
fn game_statements() -> Vec<FitnessRef<NetworkChromosome>> {
    let mut cfg = ControlGraph::new();
    let mut cdg = ControlGraph::new();
    for node in [
        GraphNode::block("start", "event_whenflagclicked"),
        GraphNode::block("move", "motion_changexby"),
    ] {
        cfg.add_node(node.clone());
        cdg.add_node(node);
    }
    cfg.add_edge("start", "move").unwrap();
    cdg.add_edge("start", "move").unwrap();
    let (cfg, cdg) = (Rc::new(cfg), Rc::new(cdg));
    ["start", "move"]
        .iter()
        .map(|id| {
            let target = cfg.node(id).unwrap().clone();
            let function: FitnessRef<NetworkChromosome> =
                Rc::new(StatementFitnessFunction::new(target, Rc::clone(&cdg), Rc::clone(&cfg)).unwrap());
            function
        })
        .collect()
}

// ============================================================================
// Activation
// ============================================================================

#[test]
fn test_activation_feeds_inputs_to_outputs() {
    let registry = InnovationRegistry::shared();
    let ids = ids(&registry);
    let connections = vec![
        link(&registry, ids.x, ids.right, 1.0),
        link(&registry, ids.bias, ids.wait, -1.0),
    ];
    let mut net = network(NetworkGenome::new(unconnected_nodes(&ids), connections), &registry);

    assert!(net.activate(&features(0.5)));

    let events = game_events();
    let shares = net.softmax(&events);
    assert!((shares.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    assert!(shares[1] > shares[0]);
    assert_eq!(net.classify(&events), 1);
}

#[test]
fn test_network_without_paths_is_defective() {
    let registry = InnovationRegistry::shared();
    let ids = ids(&registry);
    let mut net = network(NetworkGenome::new(unconnected_nodes(&ids), vec![]), &registry);
    assert!(!net.activate(&features(0.5)));

    let mut executor = NetworkExecutor::new(FakeGame::new(), 1_000, EventSelection::Activation);
    let mut ctx = SearchContext::new(1);
    executor.execute(&mut net, &mut ctx).unwrap();

    assert!(net.is_defective());
    assert!(net.codons().is_empty());
    assert_eq!(ctx.statistics.number_fitness_evaluations, 1);
}

#[test]
fn test_recurrent_links_are_detected() {
    let registry = InnovationRegistry::shared();
    let ids = ids(&registry);
    let mut net = network(
        NetworkGenome::new(unconnected_nodes(&ids), vec![link(&registry, ids.x, ids.right, 1.0)]),
        &registry,
    );
    assert!(!net.is_recurrent());
    assert!(net.is_recurrent_path(ids.right, ids.x, 100));
    assert!(!net.is_recurrent_path(ids.x, ids.right, 100));

    let hidden = registry.borrow_mut().fresh_node_id();
    let mut genome = net.genome().clone();
    genome.nodes.push(NodeGene::hidden(hidden, ActivationFunction::Tanh));
    let innovation = registry.borrow_mut().connection_innovation(hidden, hidden, true);
    genome.connections.push(ConnectionGene::new(hidden, hidden, 0.5, innovation, true));
    net = net.clone_with_genome(genome);
    assert!(net.is_recurrent());
}

// ============================================================================
// Mutation and crossover
// ============================================================================

#[test]
fn test_add_node_splits_a_connection() {
    let registry = InnovationRegistry::shared();
    let ids = ids(&registry);
    let properties = NeatProperties::default();
    let mutation = NeatMutation::new(&properties, Rc::clone(&registry));
    let original = network(
        NetworkGenome::new(unconnected_nodes(&ids), vec![link(&registry, ids.x, ids.right, 0.7)]),
        &registry,
    );
    let mut rng = Randomness::new(2);

    let mut first = original.clone_structure();
    assert!(mutation.mutate_add_node(&mut first, &mut rng));
    assert_eq!(first.connections().len(), 3);
    assert_eq!(first.genome().hidden_count(), 1);
    assert!(!first.connections()[0].enabled);
    let outgoing = first.connections().iter().find(|c| c.target == ids.right && c.enabled).unwrap();
    assert_eq!(outgoing.weight, 0.7);

    let mut second = original.clone_structure();
    assert!(mutation.mutate_add_node(&mut second, &mut rng));
    let innovations = |n: &NetworkChromosome| n.connections().iter().map(|c| c.innovation).collect::<Vec<_>>();
    assert_eq!(innovations(&first), innovations(&second));
}

#[test]
fn test_add_connection_respects_feed_forward() {
    let registry = InnovationRegistry::shared();
    let ids = ids(&registry);
    let properties = NeatProperties {
        recurrent_connection: 0.0,
        ..NeatProperties::default()
    };
    let mutation = NeatMutation::new(&properties, Rc::clone(&registry));
    let mut net = network(
        NetworkGenome::new(unconnected_nodes(&ids), vec![link(&registry, ids.x, ids.right, 1.0)]),
        &registry,
    );
    let mut rng = Randomness::new(3);

    assert!(mutation.mutate_add_connection(&mut net, &mut rng));
    assert_eq!(net.connections().len(), 2);
    assert!(net.connections().iter().all(|c| !c.recurrent));
    let added = &net.connections()[1];
    assert!(!net.genome().node(added.source).unwrap().role.is_output());
}

#[test]
fn test_crossover_inherits_from_dominant_parent() {
    let registry = InnovationRegistry::shared();
    let ids = ids(&registry);
    let nodes = unconnected_nodes(&ids);
    let mut fitter = network(
        NetworkGenome::new(
            nodes.clone(),
            vec![link(&registry, ids.x, ids.right, 1.0), link(&registry, ids.y, ids.wait, 1.0)],
        ),
        &registry,
    );
    fitter.set_network_fitness(5.0);
    let mut weaker = network(
        NetworkGenome::new(
            nodes,
            vec![link(&registry, ids.x, ids.right, -1.0), link(&registry, ids.bias, ids.duration, 1.0)],
        ),
        &registry,
    );
    weaker.set_network_fitness(1.0);

    let crossover = NeatCrossover::new(0.0);
    let mut rng = Randomness::new(4);
    for _ in 0..10 {
        let child = crossover.cross(&weaker, &fitter, &mut rng);
        let innovations: Vec<u64> = child.connections().iter().map(|c| c.innovation).collect();
        let expected: Vec<u64> = fitter.connections().iter().map(|c| c.innovation).collect();
        assert_eq!(innovations, expected);
        assert!(child.connections()[0].weight.abs() == 1.0);
    }
}

#[test]
fn test_crossover_repairs_silent_children() {
    let registry = InnovationRegistry::shared();
    let ids = ids(&registry);
    let mut disabled = link(&registry, ids.x, ids.right, 1.0);
    disabled.enabled = false;
    let mut parent = network(NetworkGenome::new(unconnected_nodes(&ids), vec![disabled]), &registry);
    parent.set_network_fitness(2.0);
    let other = network(NetworkGenome::new(unconnected_nodes(&ids), vec![]), &registry);

    let mut child = NeatCrossover::new(0.0).cross(&parent, &other, &mut Randomness::new(5));
    assert!(child.connections()[0].enabled);
    let inputs = child.dummy_inputs();
    assert!(child.activate(&inputs));
}

// ============================================================================
// Speciation and evolution
// ============================================================================

#[test]
fn test_compatibility_distance_counts_structure_and_weights() {
    let registry = InnovationRegistry::shared();
    let ids = ids(&registry);
    let a = link(&registry, ids.x, ids.right, 1.0);
    let b = link(&registry, ids.y, ids.right, 1.0);
    let c = link(&registry, ids.bias, ids.right, 1.0);
    let d = link(&registry, ids.x, ids.wait, 1.0);
    let mut a_shifted = a.clone();
    a_shifted.weight = 3.0;

    let properties = NeatProperties::default();
    let nodes = unconnected_nodes(&ids);
    let g1 = NetworkGenome::new(nodes.clone(), vec![a.clone(), b, c]);
    let g2 = NetworkGenome::new(nodes, vec![a_shifted, d]);

    // one match (weight difference 2), two disjoint
    let distance = compatibility_distance(&g1, &g2, &properties);
    assert!((distance - (2.0 + 0.5 * 2.0)).abs() < 1e-12);
    assert_eq!(compatibility_distance(&g1, &g1, &properties), 0.0);
}

#[test]
fn test_speciation_follows_threshold() {
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let mut rng = Randomness::new(6);

    let mut population = NeatPopulation::new(properties.clone());
    population.generate(&mut generator, &mut rng);
    assert_eq!(population.len(), 10);
    assert_eq!(population.species().len(), 1);

    let mut strict = NeatPopulation::new(NeatProperties {
        distance_threshold: 0.0,
        ..properties
    });
    strict.generate(&mut generator, &mut rng);
    assert_eq!(strict.species().len(), 10);
}

#[test]
fn test_evolve_produces_next_generation() {
    init_logging();
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let mut rng = Randomness::new(7);
    let mut population = NeatPopulation::new(properties);
    population.generate(&mut generator, &mut rng);

    for (i, network) in population.networks_mut().enumerate() {
        network.set_network_fitness(i as f64 + 1.0);
    }
    population.update_population_statistics();
    assert_eq!(population.champion().map(|c| c.network_fitness()), Some(10.0));
    assert_eq!(population.highest_fitness(), 10.0);

    population.evolve(&mut rng);
    assert_eq!(population.generation(), 1);
    assert!(!population.is_empty());
    assert!(population.networks().all(|n| n.species().is_some()));
    assert!(population.networks().all(|n| n.network_fitness() == 0.0));
}

// ============================================================================
// Playing the program
// ============================================================================

#[test]
fn test_random_playthrough_records_outcome() {
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let mut rng = Randomness::new(8);
    let mut net = generator.get(&mut rng);

    let mut executor = NetworkExecutor::new(FakeGame::new(), 1_000, EventSelection::Random);
    let mut ctx = SearchContext::new(8);
    executor.execute(&mut net, &mut ctx).unwrap();

    assert!(!net.is_defective());
    assert!(!net.codons().is_empty());
    assert!(net.play_time_ms() >= 1_000);
    let presses = net.codons().iter().filter(|&&c| c == 1).count();
    assert_eq!(net.score(), presses as f64);
    assert_eq!(net.final_position(), Some(Position2D::new(10.0 * presses as f64, 0.0)));
    assert_eq!(net.trace().unwrap().action_event_count(), presses);
    assert_eq!(net.coverage().contains("move"), presses > 0);
}

#[test]
fn test_wait_selection_only_waits() {
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let mut net = generator.get(&mut Randomness::new(9));

    let mut executor = NetworkExecutor::new(FakeGame::new(), 500, EventSelection::Wait);
    executor.execute(&mut net, &mut SearchContext::new(9)).unwrap();

    assert!(net.codons().iter().all(|&c| c == 0));
    assert_eq!(net.score(), 0.0);
    assert!(!net.coverage().contains("move"));
}

#[test]
fn test_activation_playthrough_grows_and_plays() {
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    // The generator only knows the wait event; the right key is discovered while playing.
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), vec![Event::wait()], &properties, Rc::clone(&registry));
    let mut net = generator.get(&mut Randomness::new(10));
    let before = net.nodes().len();

    let mut executor = NetworkExecutor::new(FakeGame::new(), 1_000, EventSelection::Activation);
    executor.execute(&mut net, &mut SearchContext::new(10)).unwrap();

    assert!(net.nodes().len() > before);
    assert!(!net.is_defective());
    assert!(!net.codons().is_empty());
}

#[test]
fn test_score_and_survival_fitness() {
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let mut net = generator.get(&mut Randomness::new(11));
    let mut executor = NetworkExecutor::new(FakeGame::new(), 1_000, EventSelection::Random);
    let mut ctx = SearchContext::new(11);

    let mut score = ScoreFitness;
    let fitness = score.get_fitness(&mut executor, &mut net, &mut ctx).unwrap();
    assert_eq!(fitness, net.score());
    assert_eq!(net.network_fitness(), fitness);

    let mut survive = SurviveFitness;
    let survived = NetworkFitnessFunction::<FakeGame>::get_fitness_without_playing(&mut survive, &net).unwrap();
    assert_eq!(survived, (net.play_time_ms() as f64 / 100.0).round());

    let mut combined: CombinedNetworkFitness<FakeGame> =
        CombinedNetworkFitness::new(vec![Box::new(ScoreFitness), Box::new(SurviveFitness)]);
    assert_eq!(combined.get_fitness_without_playing(&net).unwrap(), fitness + survived);
}

#[test]
fn test_statement_fitness_counts_covered_statements() {
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let mut net = generator.get(&mut Randomness::new(12));
    let mut executor = NetworkExecutor::new(
        FakeGame::with_events(vec![Event::action(RIGHT, vec![])]),
        1_000,
        EventSelection::Random,
    );

    let mut statements = StatementNetworkFitness::new(game_statements());
    let fitness = statements.get_fitness(&mut executor, &mut net, &mut SearchContext::new(12)).unwrap();
    assert_eq!(fitness, 2.0);
}

#[test]
fn test_reliable_coverage_is_replayed_without_trace() {
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let mut net = generator.get(&mut Randomness::new(13));
    let mut executor = NetworkExecutor::new(
        FakeGame::with_events(vec![Event::action(RIGHT, vec![])]),
        1_000,
        EventSelection::Random,
    );
    let mut ctx = SearchContext::new(13);
    net.set_target_fitness(Some(game_statements().remove(1)));

    let mut reliable = ReliableStatementFitness::new(3);
    let fitness = reliable.get_fitness(&mut executor, &mut net, &mut ctx).unwrap();

    assert_eq!(fitness, 3.0);
    assert_eq!(net.network_fitness(), 3.0);
    assert_eq!(ctx.statistics.number_fitness_evaluations, 1);
    assert!(net.coverage().contains("move"));
}

#[test]
fn test_reliable_fitness_follows_each_networks_target() {
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let mut rng = Randomness::new(16);
    let mut reaches_start = generator.get(&mut rng);
    let mut reaches_move = generator.get(&mut rng);
    let statements = game_statements();
    reaches_start.set_target_fitness(Some(Rc::clone(&statements[0])));
    reaches_move.set_target_fitness(Some(Rc::clone(&statements[1])));

    // Only waiting is possible, so `move` stays out of reach.
    let mut executor = NetworkExecutor::new(
        FakeGame::with_events(vec![Event::wait()]),
        1_000,
        EventSelection::Random,
    );
    let mut ctx = SearchContext::new(16);
    let mut reliable = ReliableStatementFitness::new(3);

    let covered = reliable.get_fitness(&mut executor, &mut reaches_start, &mut ctx).unwrap();
    let missed = reliable.get_fitness(&mut executor, &mut reaches_move, &mut ctx).unwrap();
    assert_eq!(covered, 3.0);
    // `move` is one CFG step below the covered hat: distance 0.5.
    assert_eq!(missed, 2.0);
}

#[test]
fn test_reliable_fitness_needs_a_target() {
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let mut net = generator.get(&mut Randomness::new(17));
    let mut executor = NetworkExecutor::new(FakeGame::new(), 1_000, EventSelection::Random);

    let mut reliable = ReliableStatementFitness::new(3);
    let result = reliable.get_fitness(&mut executor, &mut net, &mut SearchContext::new(17));
    assert!(matches!(result, Err(SearchError::InvalidArgument(_))));
}

#[test]
fn test_start_event_target_makes_network_wait() {
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let mut net = generator.get(&mut Randomness::new(18));
    net.set_target_fitness(Some(game_statements().remove(0)));

    // Random selection is overridden by the start event target.
    let mut executor = NetworkExecutor::new(FakeGame::new(), 1_000, EventSelection::Random);
    for seed in 0..5 {
        executor.execute(&mut net, &mut SearchContext::new(seed)).unwrap();
        assert!(!net.codons().is_empty());
        assert!(net.codons().iter().all(|&c| c == 0));
        assert!(!net.coverage().contains("move"));
    }
}

#[test]
fn test_covered_statements_are_counted_after_playing() {
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let mut net = generator.get(&mut Randomness::new(19));
    assert_eq!(net.covered_statements(), 0);

    let mut executor = NetworkExecutor::new(
        FakeGame::with_events(vec![Event::action(RIGHT, vec![])]),
        1_000,
        EventSelection::Random,
    );
    executor.execute(&mut net, &mut SearchContext::new(19)).unwrap();
    assert_eq!(net.determine_covered_statements(&game_statements()).unwrap(), 2);
    assert_eq!(net.covered_statements(), 2);
}

#[test]
fn test_novelty_rewards_first_behaviour() {
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let mut generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let mut net = generator.get(&mut Randomness::new(14));
    let mut executor = NetworkExecutor::new(FakeGame::new(), 1_000, EventSelection::Random);
    let mut ctx = SearchContext::new(14);

    let mut novelty = NoveltyFitness::new(3, 100.0, 5);
    let first = novelty.get_fitness(&mut executor, &mut net, &mut ctx).unwrap();
    assert_eq!(first, Position2D::stage_diagonal());
    assert_eq!(novelty.archive().len(), 1);
}

// ============================================================================
// Search
// ============================================================================

#[test]
fn test_neat_search_archives_goals_and_best_network() {
    init_logging();
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let executor = NetworkExecutor::new(FakeGame::new(), properties.timeout, properties.event_selection);
    let statements = game_statements();
    let goals: FitnessMap<NetworkChromosome> = statements.iter().cloned().enumerate().collect();

    let mut neat = Neat::new(
        properties,
        Box::new(generator),
        executor,
        Box::new(StatementNetworkFitness::new(statements)),
        Box::new(FixedIterationsStoppingCondition::new(3)),
        goals,
    );
    let mut ctx = SearchContext::new(15);
    let solution = neat.find_solution(&mut ctx).unwrap();

    assert_eq!(neat.name(), "NEAT");
    assert_eq!(neat.best_network_key(), 3);
    assert!(solution.contains_key(&0));
    assert!(neat.best_network().is_some());
    assert_eq!(ctx.statistics.iteration_count, 3);
    assert_eq!(ctx.statistics.fitness_function_count, 2);
    assert!(ctx.statistics.highest_network_fitness >= 1.0);
    assert!(!neat.population().is_empty());
    assert_eq!(neat.population().generation(), 3);
}

#[test]
fn test_neat_search_targets_start_event_first() {
    init_logging();
    let registry = InnovationRegistry::shared();
    let properties = small_properties();
    let generator =
        NetworkChromosomeGenerator::new(&features(0.0), game_events(), &properties, Rc::clone(&registry));
    let executor = NetworkExecutor::new(FakeGame::new(), properties.timeout, properties.event_selection);
    let goals: FitnessMap<NetworkChromosome> = game_statements().into_iter().enumerate().collect();

    let mut neat = Neat::new(
        properties,
        Box::new(generator),
        executor,
        Box::new(ReliableStatementFitness::new(2)),
        Box::new(FixedIterationsStoppingCondition::new(2)),
        goals,
    );
    let mut ctx = SearchContext::new(20);
    let solution = neat.find_solution(&mut ctx).unwrap();

    let first = &solution[&0];
    assert_eq!(first.target_fitness().map(|t| t.is_start_event_goal()), Some(true));
    assert!(first.codons().iter().all(|&c| c == 0));
    assert_eq!(first.covered_statements(), 1);
    assert_eq!(
        neat.target().map(|t| t.describe()),
        Some(String::from("move of type motion_changexby"))
    );
}
