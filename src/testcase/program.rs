//! Interface to the program under test.
//!
//! The runtime itself is external: implementors step a real interpreter,
//! tests step small scripted fakes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::position::Position2D;
use crate::testcase::trace::BlockTrace;
use crate::Result;

pub const WAIT_EVENT_ID: &str = "WaitEvent";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Lets the program run for the given number of steps.
    Wait,
    /// Any user input: key presses, clicks, typed text.
    Action,
}

/// An input the program currently accepts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub kind: EventKind,
    /// Names of the parameters the search has to choose.
    pub parameter_names: Vec<String>,
}

impl Event {
    pub fn action(id: impl Into<String>, parameter_names: Vec<String>) -> Self {
        Self {
            id: id.into(),
            kind: EventKind::Action,
            parameter_names,
        }
    }

    /// The wait event; its single parameter is the number of steps.
    pub fn wait() -> Self {
        Self {
            id: WAIT_EVENT_ID.to_string(),
            kind: EventKind::Wait,
            parameter_names: vec![String::from("Duration")],
        }
    }

    pub fn is_wait(&self) -> bool {
        self.kind == EventKind::Wait
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_names.len()
    }
}

/// A steppable program exposing coverage and observable state.
///
/// All calls come from one thread; the executors never interleave two
/// playthroughs on one instance.
pub trait ProgramUnderTest {
    /// Clears traces and coverage and fires the start event.
    fn start(&mut self);

    /// Stops all scripts.
    fn stop(&mut self);

    /// Whether scripts are still running.
    fn is_running(&self) -> bool;

    fn available_events(&self) -> Vec<Event>;

    /// Applies `event`; wait events advance the program by
    /// `parameters[0]` steps.
    fn apply(&mut self, event: &Event, parameters: &[i64]) -> Result<()>;

    /// Virtual time since [`start`](Self::start), in milliseconds.
    fn current_millis(&self) -> u64;

    /// Numeric features per sprite, e.g. `"Player" → {"X": 0.5}`,
    /// normalised to `[-1, 1]`.
    fn sprite_features(&self) -> BTreeMap<String, BTreeMap<String, f64>>;

    /// Every variable visible in the program.
    fn variables(&self) -> Vec<(String, f64)>;

    /// Location of the player sprite, if the program has one.
    fn player_position(&self) -> Option<Position2D>;

    fn block_traces(&self) -> Vec<BlockTrace>;

    fn coverage(&self) -> BTreeSet<String>;

    /// Restores the snapshot taken before the first playthrough and
    /// disposes of dynamically created entities.
    fn reset_state(&mut self);

    /// Seeds the program's own randomness.
    fn seed(&mut self, seed: u64);
}

/// Produces structurally altered copies of a program.
pub trait MutantProducer {
    type Program: ProgramUnderTest;

    fn generate_mutants(&self, operators: &[String], max_per_operator: usize) -> Vec<Self::Program>;
}
