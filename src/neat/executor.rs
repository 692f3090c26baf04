use std::rc::Rc;

use log::{debug, warn};

use crate::neat::fitness::{KeywordScoringStrategy, ScoringStrategy};
use crate::neat::network::NetworkChromosome;
use crate::neat::properties::EventSelection;
use crate::testcase::{Event, EventAndParameters, ExecutionTrace, HasTrace, ProgramUnderTest};
use crate::{Chromosome, Result, SearchContext};

/// Lets a network play the program under test.
///
/// Each step the network sees the current sprite features, grows nodes for
/// unseen features and events, and picks the next event; its regression
/// outputs become the event's parameters. A playthrough ends when the
/// program stops, no event is available, the virtual clock reaches the
/// timeout or the network turns out to be defective. A network whose target
/// goal is reached by the start event alone only waits.
pub struct NetworkExecutor<P> {
    program: P,
    timeout: u64,
    event_selection: EventSelection,
    scoring: Rc<dyn ScoringStrategy>,
}

impl<P: ProgramUnderTest> NetworkExecutor<P> {
    pub fn new(program: P, timeout: u64, event_selection: EventSelection) -> Self {
        Self {
            program,
            timeout,
            event_selection,
            scoring: Rc::new(KeywordScoringStrategy),
        }
    }

    #[must_use]
    pub fn with_scoring(mut self, scoring: Rc<dyn ScoringStrategy>) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn program(&self) -> &P {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut P {
        &mut self.program
    }

    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    pub fn event_selection(&self) -> EventSelection {
        self.event_selection
    }

    /// Plays with the program seeded from the search's RNG seed.
    pub fn execute(&mut self, network: &mut NetworkChromosome, ctx: &mut SearchContext) -> Result<()> {
        let seed = ctx.rng.seed();
        self.play(network, seed, self.event_selection, ctx)
    }

    pub fn execute_seeded(&mut self, network: &mut NetworkChromosome, seed: u64, ctx: &mut SearchContext) -> Result<()> {
        self.play(network, seed, self.event_selection, ctx)
    }

    /// Plays uniformly chosen events; the network is never activated.
    pub fn execute_random(&mut self, network: &mut NetworkChromosome, ctx: &mut SearchContext) -> Result<()> {
        let seed = ctx.rng.seed();
        self.play(network, seed, EventSelection::Random, ctx)
    }

    /// Replays the events of the network's last playthrough under `seed`.
    pub fn execute_saved_trace(
        &mut self,
        network: &mut NetworkChromosome,
        seed: u64,
        ctx: &mut SearchContext,
    ) -> Result<()> {
        let saved: Vec<EventAndParameters> = network
            .trace()
            .map(|trace| trace.events.clone())
            .unwrap_or_default();
        self.program.seed(seed);
        self.program.start();
        let mut events = Vec::with_capacity(saved.len());
        for step in saved {
            if !self.program.is_running() || self.program.current_millis() >= self.timeout {
                break;
            }
            self.program.apply(&step.event, &step.parameters)?;
            if !step.event.is_wait() {
                ctx.statistics.increment_events_count();
            }
            events.push(step);
        }
        self.finish(network, events, true, ctx);
        Ok(())
    }

    pub fn reset_state(&mut self) {
        self.program.reset_state();
    }

    fn play(
        &mut self,
        network: &mut NetworkChromosome,
        seed: u64,
        selection: EventSelection,
        ctx: &mut SearchContext,
    ) -> Result<()> {
        let selection = match network.target_fitness() {
            Some(target) if target.is_start_event_goal() => EventSelection::Wait,
            _ => selection,
        };
        self.program.seed(seed);
        self.program.start();
        network.codons_mut().clear();
        network.flush_node_values();
        let mut events = Vec::new();
        let mut working = false;

        while self.program.is_running() && self.program.current_millis() < self.timeout {
            let available = self.program.available_events();
            if available.is_empty() {
                debug!("no events available, ending playthrough");
                break;
            }
            network.update_output_nodes(&available, &mut ctx.rng);
            let features = self.program.sprite_features();
            network.update_input_nodes(&features, &mut ctx.rng);

            let index = match selection {
                EventSelection::Random => {
                    working = true;
                    ctx.rng.next_index(available.len())
                }
                EventSelection::Wait if available.iter().any(Event::is_wait) => {
                    working = true;
                    available.iter().position(Event::is_wait).unwrap_or(0)
                }
                EventSelection::Wait | EventSelection::Activation => {
                    working = network.activate_settled(&features);
                    if !working {
                        break;
                    }
                    network.classify(&available)
                }
            };

            network.codons_mut().push(index as i64);
            let event = available[index].clone();
            let parameters = Self::parameters(network, &event);
            self.send(event, parameters, &mut events, ctx)?;
        }

        self.finish(network, events, working, ctx);
        Ok(())
    }

    /// Regression outputs rounded to integers; wait durations are at
    /// least one step.
    fn parameters(network: &NetworkChromosome, event: &Event) -> Vec<i64> {
        network
            .regression_values(event)
            .into_iter()
            .map(|value| {
                let rounded = if value.is_finite() { value.round() as i64 } else { 0 };
                if event.is_wait() { rounded.max(1) } else { rounded }
            })
            .collect()
    }

    fn send(
        &mut self,
        event: Event,
        parameters: Vec<i64>,
        events: &mut Vec<EventAndParameters>,
        ctx: &mut SearchContext,
    ) -> Result<()> {
        self.program.apply(&event, &parameters)?;
        let is_wait = event.is_wait();
        events.push(EventAndParameters::new(event, parameters));
        if !is_wait {
            let wait = Event::wait();
            self.program.apply(&wait, &[1])?;
            events.push(EventAndParameters::new(wait, vec![1]));
        }
        ctx.statistics.increment_events_count();
        Ok(())
    }

    fn finish(
        &mut self,
        network: &mut NetworkChromosome,
        events: Vec<EventAndParameters>,
        working: bool,
        ctx: &mut SearchContext,
    ) {
        let score = self.scoring.score(&self.program.variables());
        network.set_outcome(score, self.program.current_millis(), self.program.player_position());
        let trace = ExecutionTrace::new(self.program.block_traces(), events);
        network.set_execution(trace, self.program.coverage());
        self.program.stop();
        self.program.reset_state();
        network.set_defective(!working);
        if !working {
            warn!("defective network, no output was reached: {network:?}");
        }
        ctx.statistics.number_fitness_evaluations += 1;
    }
}
