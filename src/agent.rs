//! Agents - the units that turn input text into output text

use std::fmt;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::backend::InferenceBackend;
use crate::channel::{Event, EventSender, RunId};
use crate::error::SynodError;
use crate::hierarchy::NodePath;

/// Separator between an agent's role and its input
pub const ROLE_SEPARATOR: &str = ": ";

/// Separator used when aggregating several outputs into one input
pub const AGGREGATE_SEPARATOR: &str = " ";

/// How sibling work is scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One inference call at a time, in sequence order
    #[default]
    Sequential,
    /// Siblings run together; results are still assembled in sequence order
    Concurrent,
}

/// Everything a node needs while thinking during one run
#[derive(Clone, Copy)]
pub struct ThinkContext<'a> {
    /// Backend every inference call goes through
    pub backend: &'a dyn InferenceBackend,
    /// Where outputs are reported, if anyone is observing
    pub events: Option<&'a EventSender>,
    /// Run the events belong to
    pub run_id: RunId,
    /// How sibling nodes are scheduled
    pub mode: ExecutionMode,
}

impl<'a> ThinkContext<'a> {
    pub fn new(backend: &'a dyn InferenceBackend) -> Self {
        Self {
            backend,
            events: None,
            run_id: RunId::new(),
            mode: ExecutionMode::default(),
        }
    }

    pub fn with_events(mut self, events: &'a EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub(crate) fn emit(&self, event: Event) {
        if let Some(events) = self.events {
            events.emit(event);
        }
    }
}

impl fmt::Debug for ThinkContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThinkContext")
            .field("run_id", &self.run_id)
            .field("mode", &self.mode)
            .field("observed", &self.events.is_some())
            .finish()
    }
}

/// Anything that answers an input by prefixing its role and asking the backend
#[async_trait]
pub trait Thinker: Send + Sync {
    fn name(&self) -> &str;

    fn role(&self) -> &str;

    /// The exact prompt sent for `input`: `role + ": " + input`
    fn prompt_for(&self, input: &str) -> String {
        format!("{}{ROLE_SEPARATOR}{input}", self.role())
    }

    /// Run one inference call for `input`, reporting the output as `node`
    async fn think(
        &self,
        ctx: &ThinkContext<'_>,
        node: &NodePath,
        input: &str,
    ) -> Result<String, SynodError> {
        let prompt = self.prompt_for(input);
        debug!(agent = self.name(), %node, prompt_len = prompt.len(), "Thinking");

        let output = ctx
            .backend
            .infer(&prompt)
            .await
            .map_err(|source| SynodError::Inference {
                node: node.clone(),
                source,
            })?;

        info!(agent = self.name(), %node, output = %output, "Agent output");
        ctx.emit(Event::AgentOutput {
            run_id: ctx.run_id,
            node: node.clone(),
            output: output.clone(),
        });
        Ok(output)
    }
}

/// A leaf agent: one role, no children, no state between calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    /// Agent name
    name: String,
    /// Role prefixed to every prompt
    role: String,
}

impl Agent {
    /// Create a new agent
    ///
    /// `name` should not be blank: topology loading rejects blank names, and
    /// `topology::save_to_file` refuses to write them.
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
        }
    }
}

impl Thinker for Agent {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> &str {
        &self.role
    }
}

/// Outputs of one fan-out, one per child, in child order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildOutputs(Vec<String>);

impl ChildOutputs {
    pub fn new(outputs: Vec<String>) -> Self {
        Self(outputs)
    }

    /// Outputs joined with single spaces, order preserved
    pub fn aggregate(&self) -> String {
        self.0.join(AGGREGATE_SEPARATOR)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for ChildOutputs {
    fn from(outputs: Vec<String>) -> Self {
        Self(outputs)
    }
}

/// An agent that fans a prompt out to its children and thinks over what they said
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaAgent {
    /// Agent name
    name: String,
    /// Role prefixed to the fan-in prompt
    role: String,
    /// Sub agents, in fan-out order
    children: Vec<Agent>,
}

impl MetaAgent {
    /// Create a new meta agent owning `children`
    ///
    /// The same non-blank name rule as [`Agent::new`] applies.
    pub fn new(name: impl Into<String>, role: impl Into<String>, children: Vec<Agent>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            children,
        }
    }

    pub fn children(&self) -> &[Agent] {
        &self.children
    }

    /// Add a child agent
    pub fn add_child(&mut self, child: Agent) {
        self.children.push(child);
    }

    /// Fan-out: every child thinks about the same `prompt`
    ///
    /// With [`ExecutionMode::Concurrent`] all children are awaited even when
    /// one fails, so every successful output is still reported before the
    /// first failure (in child order) is returned.
    #[instrument(skip(self, ctx, prompt), fields(meta = %self.name, children = self.children.len()))]
    pub async fn run_children(
        &self,
        ctx: &ThinkContext<'_>,
        path: &NodePath,
        prompt: &str,
    ) -> Result<ChildOutputs, SynodError> {
        ctx.emit(Event::BranchStarted {
            run_id: ctx.run_id,
            node: path.clone(),
            children: self.children.len(),
        });

        let mut outputs = Vec::with_capacity(self.children.len());
        match ctx.mode {
            ExecutionMode::Sequential => {
                for (i, child) in self.children.iter().enumerate() {
                    debug!(child = child.name(), "Running sub-agent");
                    let node = path.child(i, child.name());
                    outputs.push(child.think(ctx, &node, prompt).await?);
                }
            }
            ExecutionMode::Concurrent => {
                let calls = self.children.iter().enumerate().map(|(i, child)| {
                    let node = path.child(i, child.name());
                    async move { child.think(ctx, &node, prompt).await }
                });
                for result in join_all(calls).await {
                    outputs.push(result?);
                }
            }
        }

        Ok(ChildOutputs::new(outputs))
    }

    /// Fan-in: think over the aggregated child outputs
    ///
    /// Empty `outputs` aggregate to `""`, so the backend still sees `role + ": "`.
    pub async fn think_over(
        &self,
        ctx: &ThinkContext<'_>,
        path: &NodePath,
        outputs: &ChildOutputs,
    ) -> Result<String, SynodError> {
        self.think(ctx, path, &outputs.aggregate()).await
    }

    /// Fan-out followed by fan-in
    pub async fn run(
        &self,
        ctx: &ThinkContext<'_>,
        path: &NodePath,
        prompt: &str,
    ) -> Result<String, SynodError> {
        let outputs = self.run_children(ctx, path, prompt).await?;
        self.think_over(ctx, path, &outputs).await
    }
}

impl Thinker for MetaAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> &str {
        &self.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InferenceError, RecordingBackend};
    use crate::channel::event_channel;

    fn critique() -> MetaAgent {
        MetaAgent::new(
            "M",
            "Critique",
            vec![Agent::new("A", "Summarize"), Agent::new("B", "Expand")],
        )
    }

    // === Agent Tests ===

    #[tokio::test]
    async fn test_agent_prompt_is_role_colon_input() {
        let backend = RecordingBackend::echo();
        let ctx = ThinkContext::new(&backend);
        let agent = Agent::new("A", "Summarize");

        let output = agent
            .think(&ctx, &NodePath::special(0, "A"), "  topic with spaces ")
            .await
            .unwrap();

        assert_eq!(backend.calls(), vec!["Summarize:   topic with spaces "]);
        assert_eq!(output, "[Summarize:   topic with spaces ]");
    }

    #[tokio::test]
    async fn test_agent_output_is_verbatim() {
        let backend = RecordingBackend::new(|_| Ok("  raw\noutput \n".into()));
        let ctx = ThinkContext::new(&backend);

        let output = Agent::new("A", "R")
            .think(&ctx, &NodePath::special(0, "A"), "x")
            .await
            .unwrap();
        assert_eq!(output, "  raw\noutput \n");
    }

    #[test]
    fn test_agent_is_stateless() {
        let backend = RecordingBackend::echo();
        let ctx = ThinkContext::new(&backend);
        let agent = Agent::new("A", "Echo");
        let node = NodePath::special(0, "A");

        let first = tokio_test::block_on(agent.think(&ctx, &node, "same")).unwrap();
        let second = tokio_test::block_on(agent.think(&ctx, &node, "same")).unwrap();
        assert_eq!(first, second);
        assert_eq!(agent, Agent::new("A", "Echo"));
    }

    #[tokio::test]
    async fn test_agent_failure_names_node() {
        let backend = RecordingBackend::failing_on("Summarize");
        let ctx = ThinkContext::new(&backend);
        let node = NodePath::meta(0, "M").child(0, "A");

        let err = Agent::new("A", "Summarize")
            .think(&ctx, &node, "topic")
            .await
            .unwrap_err();

        assert_eq!(err.node(), Some(&node));
        assert!(err.to_string().contains(r#"sub_agents[0] "A""#));
        assert!(matches!(
            err,
            SynodError::Inference { source: InferenceError::Backend(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_agent_emits_output_event() {
        let backend = RecordingBackend::echo();
        let (tx, mut rx) = event_channel();
        let ctx = ThinkContext::new(&backend).with_events(&tx);
        let node = NodePath::special(0, "S");

        Agent::new("S", "Finalize").think(&ctx, &node, "x").await.unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            Event::AgentOutput {
                run_id: ctx.run_id,
                node,
                output: "[Finalize: x]".into(),
            }
        );
    }

    // === MetaAgent Tests ===

    #[tokio::test]
    async fn test_run_children_in_order() {
        let backend = RecordingBackend::echo();
        let ctx = ThinkContext::new(&backend);

        let outputs = critique()
            .run_children(&ctx, &NodePath::meta(0, "M"), "topic")
            .await
            .unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs.as_slice(), ["[Summarize: topic]", "[Expand: topic]"]);
        assert_eq!(backend.calls(), vec!["Summarize: topic", "Expand: topic"]);
    }

    #[tokio::test]
    async fn test_think_over_joins_with_single_spaces() {
        let backend = RecordingBackend::echo();
        let ctx = ThinkContext::new(&backend);
        let outputs = ChildOutputs::new(vec!["a".into(), "b".into(), "c".into()]);

        critique()
            .think_over(&ctx, &NodePath::meta(0, "M"), &outputs)
            .await
            .unwrap();

        assert_eq!(backend.calls(), vec!["Critique: a b c"]);
    }

    #[tokio::test]
    async fn test_think_over_empty_outputs() {
        let backend = RecordingBackend::echo();
        let ctx = ThinkContext::new(&backend);
        let meta = MetaAgent::new("M", "Critique", vec![]);
        let path = NodePath::meta(0, "M");

        let outputs = meta.run_children(&ctx, &path, "topic").await.unwrap();
        assert!(outputs.is_empty());

        meta.think_over(&ctx, &path, &outputs).await.unwrap();
        meta.think_over(&ctx, &path, &ChildOutputs::default()).await.unwrap();

        assert_eq!(backend.calls(), vec!["Critique: ", "Critique: "]);
    }

    #[tokio::test]
    async fn test_runs_do_not_accumulate() {
        let backend = RecordingBackend::echo();
        let ctx = ThinkContext::new(&backend);
        let meta = critique();
        let path = NodePath::meta(0, "M");

        let first = meta.run_children(&ctx, &path, "one").await.unwrap();
        let second = meta.run_children(&ctx, &path, "two").await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.as_slice(), ["[Summarize: two]", "[Expand: two]"]);
    }

    #[tokio::test]
    async fn test_sequential_failure_stops_branch() {
        let backend = RecordingBackend::failing_on("Summarize");
        let ctx = ThinkContext::new(&backend);

        let err = critique()
            .run_children(&ctx, &NodePath::meta(0, "M"), "topic")
            .await
            .unwrap_err();

        assert_eq!(err.node().map(|n| n.name()), Some("A"));
        assert_eq!(backend.calls(), vec!["Summarize: topic"]);
    }

    #[tokio::test]
    async fn test_concurrent_keeps_child_order() {
        let backend = RecordingBackend::echo();
        let ctx = ThinkContext::new(&backend).with_mode(ExecutionMode::Concurrent);
        let meta = MetaAgent::new(
            "M",
            "Critique",
            (0..5).map(|i| Agent::new(format!("C{i}"), format!("R{i}"))).collect(),
        );

        let outputs = meta
            .run_children(&ctx, &NodePath::meta(0, "M"), "p")
            .await
            .unwrap();

        let expected: Vec<String> = (0..5).map(|i| format!("[R{i}: p]")).collect();
        assert_eq!(outputs.into_inner(), expected);
    }

    #[tokio::test]
    async fn test_concurrent_failure_reports_siblings() {
        let backend = RecordingBackend::failing_on("Summarize");
        let (tx, mut rx) = event_channel();
        let ctx = ThinkContext::new(&backend)
            .with_events(&tx)
            .with_mode(ExecutionMode::Concurrent);

        let err = critique()
            .run_children(&ctx, &NodePath::meta(0, "M"), "topic")
            .await
            .unwrap_err();

        assert_eq!(err.node().map(|n| n.name()), Some("A"));
        assert_eq!(backend.call_count(), 2);

        let outputs: Vec<Event> = rx
            .drain()
            .into_iter()
            .filter(|e| matches!(e, Event::AgentOutput { .. }))
            .collect();
        assert_eq!(outputs.len(), 1);
        assert!(matches!(&outputs[0], Event::AgentOutput { node, .. } if node.name() == "B"));
    }

    #[tokio::test]
    async fn test_meta_run_fans_out_then_in() {
        let backend = RecordingBackend::new(|prompt| Ok(prompt.len().to_string()));
        let ctx = ThinkContext::new(&backend);

        let output = critique()
            .run(&ctx, &NodePath::meta(0, "M"), "topic")
            .await
            .unwrap();

        // "Summarize: topic" is 16 bytes, "Expand: topic" is 13
        assert_eq!(backend.calls()[2], "Critique: 16 13");
        assert_eq!(output, "15");
    }

    #[test]
    fn test_add_child() {
        let mut meta = MetaAgent::new("M", "Critique", vec![]);
        meta.add_child(Agent::new("A", "Summarize"));
        assert_eq!(meta.children().len(), 1);
        assert_eq!(meta.children()[0].name(), "A");
    }
}
