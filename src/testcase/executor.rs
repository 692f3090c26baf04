use std::collections::BTreeSet;

use log::debug;

use crate::testcase::chromosome::TestChromosome;
use crate::testcase::program::{Event, ProgramUnderTest};
use crate::testcase::trace::{EventAndParameters, ExecutionTrace};
use crate::{Chromosome, Evaluator, ListChromosome, Randomness, Result, SearchContext};

/// Decodes test chromosomes into event sequences and plays them.
///
/// Codon `i` selects event `codons[i] % available.len()`; the event's
/// parameters are read from the following codons, wrapping around at the
/// end of the list. Every event is followed by a one-step wait.
pub struct TestExecutor<P> {
    program: P,
    /// Range for randomly chosen event parameters.
    parameter_range: (i64, i64),
}

impl<P: ProgramUnderTest> TestExecutor<P> {
    pub fn new(program: P) -> Self {
        Self {
            program,
            parameter_range: (0, 420),
        }
    }

    #[must_use]
    pub fn with_parameter_range(mut self, min: i64, max: i64) -> Self {
        self.parameter_range = (min, max);
        self
    }

    pub fn program(&self) -> &P {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut P {
        &mut self.program
    }

    fn has_action_events(events: &[Event]) -> bool {
        events.iter().any(|e| !e.is_wait())
    }

    /// Plays `chromosome` and stores trace, coverage and the codon after
    /// which coverage last grew. With a target fitness set, also records the
    /// codon after which the target fitness last improved.
    pub fn execute(&mut self, chromosome: &mut TestChromosome, ctx: &mut SearchContext) -> Result<()> {
        self.program.seed(ctx.rng.seed());
        self.program.start();
        let codons = chromosome.codons().to_vec();
        let mut events = Vec::new();
        let mut available = self.program.available_events();
        let mut num_codon = 0;
        let mut total_coverage = 0;
        let mut codon_last_improved = 0;
        let mut last_improved_trace = None;
        let target = chromosome.target_fitness().cloned();
        let mut best_target_fitness = None;
        let mut codon_target_improved = 0;

        while num_codon < codons.len()
            && (self.program.is_running() || Self::has_action_events(&available))
        {
            available = self.program.available_events();
            if available.is_empty() {
                debug!("no events available, ending playthrough");
                break;
            }
            num_codon = self.select_and_send_event(&codons, num_codon, &available, &mut events, ctx)?;
            let coverage = self.program.coverage();
            if coverage.len() > total_coverage {
                total_coverage = coverage.len();
                codon_last_improved = num_codon;
                last_improved_trace = Some(ExecutionTrace::new(self.program.block_traces(), events.clone()));
            }
            if let Some(target) = &target {
                chromosome.set_execution(ExecutionTrace::new(self.program.block_traces(), events.clone()), coverage);
                let fitness = chromosome.get_fitness(target)?;
                if best_target_fitness.is_none_or(|best| target.compare(fitness, best) > 0.0) {
                    best_target_fitness = Some(fitness);
                    codon_target_improved = num_codon;
                }
            }
        }

        // Parameters may have been read past the end; make them explicit.
        if num_codon > codons.len() && !codons.is_empty() {
            let missing = num_codon - codons.len();
            let extension: Vec<i64> = codons.iter().copied().cycle().take(missing).collect();
            chromosome.codons_mut().extend(extension);
        }

        let trace = ExecutionTrace::new(self.program.block_traces(), events);
        chromosome.set_execution(trace, self.program.coverage());
        chromosome.set_last_improvement(codon_last_improved, last_improved_trace);
        chromosome.set_last_improved_fitness_codon(codon_target_improved);
        self.program.stop();
        self.program.reset_state();
        ctx.statistics.number_fitness_evaluations += 1;
        Ok(())
    }

    /// Plays `number_of_events` uniformly chosen events, recording the
    /// chosen indices as the chromosome's codons.
    pub fn execute_random_events(
        &mut self,
        chromosome: &mut TestChromosome,
        number_of_events: usize,
        ctx: &mut SearchContext,
    ) -> Result<()> {
        self.program.seed(ctx.rng.seed());
        self.program.start();
        let mut events = Vec::new();
        let mut available = self.program.available_events();
        let mut event_count = 0;
        chromosome.codons_mut().clear();

        while event_count < number_of_events
            && (self.program.is_running() || Self::has_action_events(&available))
        {
            available = self.program.available_events();
            if available.is_empty() {
                debug!("no events available, ending playthrough");
                break;
            }
            let index = ctx.rng.next_index(available.len());
            chromosome.codons_mut().push(index as i64);
            let event = available[index].clone();
            let (min, max) = self.parameter_range;
            let parameters: Vec<i64> = (0..event.parameter_count())
                .map(|_| ctx.rng.next_int(min, max))
                .collect();
            event_count += 1;
            self.send(event, parameters, &mut events, ctx)?;
        }

        let trace = ExecutionTrace::new(self.program.block_traces(), events);
        chromosome.set_execution(trace, self.program.coverage());
        self.program.stop();
        self.program.reset_state();
        ctx.statistics.number_fitness_evaluations += 1;
        Ok(())
    }

    /// Decodes the event at `num_codon`, applies it followed by a one-step
    /// wait, and returns the index of the next unread codon.
    pub fn select_and_send_event(
        &mut self,
        codons: &[i64],
        num_codon: usize,
        available: &[Event],
        events: &mut Vec<EventAndParameters>,
        ctx: &mut SearchContext,
    ) -> Result<usize> {
        let index = codons[num_codon].rem_euclid(available.len() as i64) as usize;
        let event = available[index].clone();
        let mut next = num_codon + 1;
        let parameters: Vec<i64> = (0..event.parameter_count())
            .map(|i| codons[(next + i) % codons.len()])
            .collect();
        next += event.parameter_count();
        self.send(event, parameters, events, ctx)?;
        Ok(next)
    }

    fn send(
        &mut self,
        event: Event,
        parameters: Vec<i64>,
        events: &mut Vec<EventAndParameters>,
        ctx: &mut SearchContext,
    ) -> Result<()> {
        self.program.apply(&event, &parameters)?;
        events.push(EventAndParameters::new(event, parameters));
        ctx.statistics.increment_events_count();
        let wait = Event::wait();
        self.program.apply(&wait, &[1])?;
        events.push(EventAndParameters::new(wait, vec![1]));
        Ok(())
    }

    /// Replays `chromosome`'s codons, then keeps appending long waits while
    /// `keep_waiting` holds for the current coverage and the chromosome is
    /// shorter than `upper_length_bound`.
    pub fn execute_with_wait_extension<F>(
        &mut self,
        chromosome: &TestChromosome,
        upper_length_bound: usize,
        wait_duration: i64,
        keep_waiting: F,
        ctx: &mut SearchContext,
    ) -> Result<TestChromosome>
    where
        F: Fn(&BTreeSet<String>) -> bool,
    {
        self.program.seed(ctx.rng.seed());
        self.program.start();
        let mut codons = chromosome.codons().to_vec();
        let mut events = Vec::new();

        let mut num_codon = 0;
        while num_codon < codons.len() {
            let available = self.program.available_events();
            if available.is_empty() {
                debug!("no events available, ending playthrough");
                break;
            }
            num_codon = self.select_and_send_event(&codons, num_codon, &available, &mut events, ctx)?;
        }

        while codons.len() < upper_length_bound {
            let available = self.program.available_events();
            let Some(wait_index) = available.iter().position(Event::is_wait) else {
                break;
            };
            codons.push(wait_index as i64);
            codons.push(wait_duration);
            let wait = Event::wait();
            self.program.apply(&wait, &[wait_duration])?;
            events.push(EventAndParameters::new(wait, vec![wait_duration]));
            if !keep_waiting(&self.program.coverage()) {
                break;
            }
        }

        let mut extended = chromosome.clone_with(codons);
        extended.set_execution(
            ExecutionTrace::new(self.program.block_traces(), events),
            self.program.coverage(),
        );
        self.program.stop();
        self.program.reset_state();
        ctx.statistics.number_fitness_evaluations += 1;
        Ok(extended)
    }

    pub fn reset_state(&mut self) {
        self.program.reset_state();
    }

    /// Reseeds the program and the search randomness alike.
    pub fn reseed(&mut self, seed: u64, rng: &mut Randomness) {
        rng.reseed(seed);
        self.program.seed(seed);
    }
}

impl<P: ProgramUnderTest> Evaluator<TestChromosome> for TestExecutor<P> {
    fn evaluate(&mut self, chromosome: &mut TestChromosome, ctx: &mut SearchContext) -> Result<()> {
        self.execute(chromosome, ctx)
    }
}
