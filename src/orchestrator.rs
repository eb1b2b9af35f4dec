//! Main orchestrator - runs the two-phase protocol over a hierarchy

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::agent::{ExecutionMode, ThinkContext, Thinker, AGGREGATE_SEPARATOR};
use crate::backend::InferenceBackend;
use crate::channel::{event_channel, Event, EventReceiver, EventSender, RunId};
use crate::error::SynodError;
use crate::hierarchy::{Hierarchy, NodePath};

/// What one run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier, matching the run's events
    pub run_id: RunId,
    /// One output per meta agent, in hierarchy order
    pub meta_outputs: Vec<String>,
    /// Input given to the special agents; `None` when there are none
    pub combined: Option<String>,
    /// One output per special agent, in hierarchy order
    pub special_outputs: Vec<String>,
}

/// The root of the hierarchy
///
/// Phase 1 runs every meta agent (fan-out to its children, then fan-in) on
/// the initial prompt. Phase 2 joins the meta outputs with single spaces.
/// Phase 3 runs each special agent on that combined text, and is skipped
/// entirely when there are no special agents.
///
/// The first inference failure aborts the run and is returned with the
/// failing node's position.
pub struct Orchestrator {
    /// Agents to run
    hierarchy: Hierarchy,
    /// Shared inference backend
    backend: Arc<dyn InferenceBackend>,
    /// Event sender for observers
    events: Option<EventSender>,
    /// How sibling branches are scheduled
    mode: ExecutionMode,
}

impl Orchestrator {
    /// Create an orchestrator over `hierarchy`
    pub fn new(hierarchy: Hierarchy, backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            hierarchy,
            backend,
            events: None,
            mode: ExecutionMode::default(),
        }
    }

    /// Create an orchestrator and return a receiver for its events
    pub fn with_channel(
        hierarchy: Hierarchy,
        backend: Arc<dyn InferenceBackend>,
    ) -> (Self, EventReceiver) {
        let (tx, rx) = event_channel();
        (Self::new(hierarchy, backend).with_events(tx), rx)
    }

    /// Report events to `events`
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Set how sibling work is scheduled
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Run the hierarchy on `initial_prompt`
    #[instrument(skip(self, initial_prompt), fields(mode = ?self.mode, agents = self.hierarchy.len()))]
    pub async fn run(&self, initial_prompt: &str) -> Result<RunReport, SynodError> {
        let mut ctx = ThinkContext::new(self.backend.as_ref()).with_mode(self.mode);
        if let Some(events) = &self.events {
            ctx = ctx.with_events(events);
        }
        let run_id = ctx.run_id;

        info!(%run_id, "Starting run");
        ctx.emit(Event::RunStarted {
            run_id,
            prompt: initial_prompt.to_string(),
        });

        match self.run_phases(&ctx, initial_prompt).await {
            Ok(report) => {
                ctx.emit(Event::RunCompleted { run_id });
                info!(%run_id, "Run complete");
                Ok(report)
            }
            Err(e) => {
                error!(%run_id, error = %e, "Run failed");
                ctx.emit(Event::RunFailed {
                    run_id,
                    node: e.node().cloned(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        ctx: &ThinkContext<'_>,
        initial_prompt: &str,
    ) -> Result<RunReport, SynodError> {
        let meta_outputs = self.run_meta_agents(ctx, initial_prompt).await?;
        let combined = meta_outputs.join(AGGREGATE_SEPARATOR);

        if self.hierarchy.special_agents.is_empty() {
            info!("No special agents, skipping final phase");
            return Ok(RunReport {
                run_id: ctx.run_id,
                meta_outputs,
                combined: None,
                special_outputs: Vec::new(),
            });
        }

        let special_outputs = self.run_special_agents(ctx, &combined).await?;
        Ok(RunReport {
            run_id: ctx.run_id,
            meta_outputs,
            combined: Some(combined),
            special_outputs,
        })
    }

    /// Phase 1: every branch sees the same, unmodified prompt
    async fn run_meta_agents(
        &self,
        ctx: &ThinkContext<'_>,
        initial_prompt: &str,
    ) -> Result<Vec<String>, SynodError> {
        let branches = self.hierarchy.meta_agents.iter().enumerate();
        match self.mode {
            ExecutionMode::Sequential => {
                let mut outputs = Vec::with_capacity(self.hierarchy.meta_agents.len());
                for (i, meta) in branches {
                    info!(meta = meta.name(), "Running meta agent");
                    let path = NodePath::meta(i, meta.name());
                    outputs.push(meta.run(ctx, &path, initial_prompt).await?);
                }
                Ok(outputs)
            }
            ExecutionMode::Concurrent => {
                let runs = branches.map(|(i, meta)| {
                    let path = NodePath::meta(i, meta.name());
                    async move { meta.run(ctx, &path, initial_prompt).await }
                });
                join_all(runs).await.into_iter().collect()
            }
        }
    }

    /// Phase 3: special agents, always one at a time
    async fn run_special_agents(
        &self,
        ctx: &ThinkContext<'_>,
        combined: &str,
    ) -> Result<Vec<String>, SynodError> {
        let specials = &self.hierarchy.special_agents;
        info!(count = specials.len(), "Running special agents on combined meta output");
        ctx.emit(Event::SpecialAgentsStarted {
            run_id: ctx.run_id,
            count: specials.len(),
        });

        let mut outputs = Vec::with_capacity(specials.len());
        for (i, agent) in specials.iter().enumerate() {
            let path = NodePath::special(i, agent.name());
            outputs.push(agent.think(ctx, &path, combined).await?);
        }
        Ok(outputs)
    }
}
