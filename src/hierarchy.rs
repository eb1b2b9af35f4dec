//! Agent hierarchy: the forest an orchestrator runs over

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, MetaAgent, Thinker};

/// Which list of the hierarchy a node sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    MetaAgent,
    SubAgent,
    SpecialAgent,
}

impl NodeKind {
    fn list_name(self) -> &'static str {
        match self {
            NodeKind::MetaAgent => "meta_agents",
            NodeKind::SubAgent => "sub_agents",
            NodeKind::SpecialAgent => "special_agents",
        }
    }
}

/// One step from the root towards a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSegment {
    /// List the node sits in
    pub kind: NodeKind,
    /// Position within that list
    pub index: usize,
    /// Node name
    pub name: String,
}

/// Position of a node in the hierarchy, e.g. `meta_agents[0] "M" > sub_agents[1] "B"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePath {
    /// Steps from the root, outermost first
    segments: Vec<NodeSegment>,
}

impl NodePath {
    /// Path of the `index`th meta agent
    pub fn meta(index: usize, name: impl Into<String>) -> Self {
        Self::root(NodeKind::MetaAgent, index, name)
    }

    /// Path of the `index`th special agent
    pub fn special(index: usize, name: impl Into<String>) -> Self {
        Self::root(NodeKind::SpecialAgent, index, name)
    }

    fn root(kind: NodeKind, index: usize, name: impl Into<String>) -> Self {
        Self {
            segments: vec![NodeSegment { kind, index, name: name.into() }],
        }
    }

    /// Path of the `index`th child below this node
    pub fn child(&self, index: usize, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(NodeSegment {
            kind: NodeKind::SubAgent,
            index,
            name: name.into(),
        });
        Self { segments }
    }

    pub fn segments(&self) -> &[NodeSegment] {
        &self.segments
    }

    /// Name of the node this path points at
    pub fn name(&self) -> &str {
        self.segments.last().map(|s| s.name.as_str()).unwrap_or_default()
    }

    /// Nesting depth; top-level nodes are at depth 0
    pub fn depth(&self) -> usize {
        self.segments.len().saturating_sub(1)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(" > ")?;
            }
            write!(f, "{}[{}] {:?}", seg.kind.list_name(), seg.index, seg.name)?;
        }
        Ok(())
    }
}

/// The topology an orchestrator runs: meta agents with their sub agents,
/// plus the free-standing special agents run over their combined output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hierarchy {
    /// Branches run in phase 1, in order
    pub meta_agents: Vec<MetaAgent>,
    /// Agents run over the combined meta output
    pub special_agents: Vec<Agent>,
}

impl Hierarchy {
    /// Create a new empty hierarchy
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a meta agent
    pub fn with_meta_agent(mut self, meta: MetaAgent) -> Self {
        self.meta_agents.push(meta);
        self
    }

    /// Append a special agent
    pub fn with_special_agent(mut self, agent: Agent) -> Self {
        self.special_agents.push(agent);
        self
    }

    /// Total agent count, meta agents and their children included
    pub fn len(&self) -> usize {
        self.meta_agents
            .iter()
            .map(|m| 1 + m.children().len())
            .sum::<usize>()
            + self.special_agents.len()
    }

    /// Check if hierarchy is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every node with its path, meta agents before their children, special agents last
    pub fn nodes(&self) -> Vec<(NodePath, &dyn Thinker)> {
        let mut out: Vec<(NodePath, &dyn Thinker)> = Vec::with_capacity(self.len());
        for (i, meta) in self.meta_agents.iter().enumerate() {
            let path = NodePath::meta(i, meta.name());
            for (j, child) in meta.children().iter().enumerate() {
                out.push((path.child(j, child.name()), child as &dyn Thinker));
            }
            let first_child = out.len() - meta.children().len();
            out.insert(first_child, (path, meta as &dyn Thinker));
        }
        for (i, agent) in self.special_agents.iter().enumerate() {
            out.push((NodePath::special(i, agent.name()), agent as &dyn Thinker));
        }
        out
    }

    /// Human-readable tree, one node per line
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        for (path, node) in self.nodes() {
            let indent = "  ".repeat(path.depth());
            out.push_str(&format!("{indent}{} ({})\n", node.name(), node.role()));
        }
        out
    }
}
