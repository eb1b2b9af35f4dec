//! Topology persistence
//!
//! A topology record is a structural snapshot of a [`Hierarchy`]: names and
//! roles only, never outputs. On disk it is pretty-printed JSON:
//!
//! ```json
//! {
//!     "meta_agents": [
//!         {"name": "M", "role": "Critique", "sub_agents": [{"name": "A", "role": "Summarize"}]}
//!     ],
//!     "special_agents": [{"name": "S", "role": "Finalize"}]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::{Agent, MetaAgent, Thinker};
use crate::error::SynodError;
use crate::hierarchy::Hierarchy;

/// File used when no topology path is configured
pub const DEFAULT_TOPOLOGY_FILE: &str = "agent_config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaAgentRecord {
    pub name: String,
    pub role: String,
    pub sub_agents: Vec<AgentRecord>,
}

/// Persisted form of a [`Hierarchy`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyRecord {
    pub meta_agents: Vec<MetaAgentRecord>,
    pub special_agents: Vec<AgentRecord>,
}

impl AgentRecord {
    fn of(agent: &Agent) -> Self {
        Self {
            name: agent.name().to_string(),
            role: agent.role().to_string(),
        }
    }

    fn to_agent(&self) -> Agent {
        Agent::new(self.name.clone(), self.role.clone())
    }
}

fn require_name(name: &str, at: &str) -> Result<(), SynodError> {
    if name.trim().is_empty() {
        return Err(SynodError::MalformedTopology(format!("{at}: name is empty")));
    }
    Ok(())
}

/// Project `hierarchy` onto its persisted form
pub fn save(hierarchy: &Hierarchy) -> TopologyRecord {
    TopologyRecord {
        meta_agents: hierarchy
            .meta_agents
            .iter()
            .map(|meta| MetaAgentRecord {
                name: meta.name().to_string(),
                role: meta.role().to_string(),
                sub_agents: meta.children().iter().map(AgentRecord::of).collect(),
            })
            .collect(),
        special_agents: hierarchy.special_agents.iter().map(AgentRecord::of).collect(),
    }
}

/// Check that every node in `record` has a non-blank name
pub fn validate(record: &TopologyRecord) -> Result<(), SynodError> {
    for (i, meta) in record.meta_agents.iter().enumerate() {
        let at = format!("meta_agents[{i}]");
        require_name(&meta.name, &at)?;
        for (j, sub) in meta.sub_agents.iter().enumerate() {
            require_name(&sub.name, &format!("{at}.sub_agents[{j}]"))?;
        }
    }
    for (i, special) in record.special_agents.iter().enumerate() {
        require_name(&special.name, &format!("special_agents[{i}]"))?;
    }
    Ok(())
}

/// Rebuild a hierarchy from `record`
///
/// Nothing is returned unless every node is valid.
pub fn load(record: &TopologyRecord) -> Result<Hierarchy, SynodError> {
    validate(record)?;

    let mut hierarchy = Hierarchy::new();
    for meta in &record.meta_agents {
        let children = meta.sub_agents.iter().map(AgentRecord::to_agent).collect();
        hierarchy
            .meta_agents
            .push(MetaAgent::new(meta.name.clone(), meta.role.clone(), children));
    }
    hierarchy
        .special_agents
        .extend(record.special_agents.iter().map(AgentRecord::to_agent));

    Ok(hierarchy)
}

/// Parse a JSON topology document
pub fn from_json(json: &str) -> Result<Hierarchy, SynodError> {
    let record: TopologyRecord = serde_json::from_str(json)
        .map_err(|e| SynodError::MalformedTopology(e.to_string()))?;
    load(&record)
}

/// Render `hierarchy` as a JSON topology document, indented by four spaces
pub fn to_json(hierarchy: &Hierarchy) -> Result<String, SynodError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    save(hierarchy)
        .serialize(&mut ser)
        .map_err(|e| SynodError::Config(format!("Failed to encode topology: {e}")))?;
    String::from_utf8(buf).map_err(|e| SynodError::Config(e.to_string()))
}

/// Write `hierarchy` to `path`
///
/// A hierarchy that [`load`] would reject is refused before anything is
/// written. The document goes to a sibling temp file first and is renamed
/// into place, so a failed write never leaves a truncated topology behind.
pub fn save_to_file(path: impl AsRef<Path>, hierarchy: &Hierarchy) -> Result<(), SynodError> {
    let path = path.as_ref();
    validate(&save(hierarchy))?;
    let json = to_json(hierarchy)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, json)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    info!(path = %path.display(), agents = hierarchy.len(), "Topology saved");
    Ok(())
}

/// Read a hierarchy from `path`
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Hierarchy, SynodError> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading topology");
    let json = fs::read_to_string(path)?;
    let hierarchy = from_json(&json).map_err(|e| match e {
        SynodError::MalformedTopology(msg) => {
            SynodError::MalformedTopology(format!("{}: {msg}", path.display()))
        }
        other => other,
    })?;
    info!(path = %path.display(), agents = hierarchy.len(), "Topology loaded");
    Ok(hierarchy)
}
