//! Observation channel for orchestration runs
//!
//! Agents report what they produced as [`Event`]s. Delivery is best-effort:
//! a run never fails because nobody is listening.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::hierarchy::NodePath;

/// Identifier of one `Orchestrator::run` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Something observable that happened during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run began with this initial prompt
    RunStarted { run_id: RunId, prompt: String },

    /// A meta agent's branch began fanning out to its children
    BranchStarted {
        run_id: RunId,
        node: NodePath,
        children: usize,
    },

    /// An agent produced output
    AgentOutput {
        run_id: RunId,
        node: NodePath,
        output: String,
    },

    /// Special agents are about to run over the combined meta output
    SpecialAgentsStarted { run_id: RunId, count: usize },

    /// The run finished
    RunCompleted { run_id: RunId },

    /// The run aborted
    RunFailed {
        run_id: RunId,
        node: Option<NodePath>,
        error: String,
    },
}

impl Event {
    pub fn run_id(&self) -> RunId {
        match self {
            Event::RunStarted { run_id, .. }
            | Event::BranchStarted { run_id, .. }
            | Event::AgentOutput { run_id, .. }
            | Event::SpecialAgentsStarted { run_id, .. }
            | Event::RunCompleted { run_id }
            | Event::RunFailed { run_id, .. } => *run_id,
        }
    }
}

/// Sending half, held by the orchestrator
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Send an event; dropped silently if the receiver is gone
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Check if the receiving half was dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, held by whoever observes runs
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event; `None` once every sender is dropped
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Take every event already queued
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Create a connected sender/receiver pair
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}
