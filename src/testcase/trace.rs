use serde::{Deserialize, Serialize};

use crate::testcase::program::Event;

/// Execution record of one block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockTrace {
    pub id: String,
    pub opcode: String,
    /// Recorded `(true, false)` branch distances: how far the block's
    /// condition was from evaluating to true and to false.
    pub distances: Vec<(f64, f64)>,
}

impl BlockTrace {
    pub fn new(id: impl Into<String>, opcode: impl Into<String>, distances: Vec<(f64, f64)>) -> Self {
        Self {
            id: id.into(),
            opcode: opcode.into(),
            distances,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventAndParameters {
    pub event: Event,
    pub parameters: Vec<i64>,
}

impl EventAndParameters {
    pub fn new(event: Event, parameters: Vec<i64>) -> Self {
        Self { event, parameters }
    }
}

/// What one execution of the program left behind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub block_traces: Vec<BlockTrace>,
    pub events: Vec<EventAndParameters>,
}

impl ExecutionTrace {
    pub fn new(block_traces: Vec<BlockTrace>, events: Vec<EventAndParameters>) -> Self {
        Self { block_traces, events }
    }

    /// Events other than waits.
    pub fn action_event_count(&self) -> usize {
        self.events.iter().filter(|e| !e.event.is_wait()).count()
    }
}
