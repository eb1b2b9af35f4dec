//! # Synod
//!
//! Hierarchical agent orchestration: a fixed tree of role-prompted agents
//! that fan a prompt out to sub-agents and fold their answers back up.
//!
//! ## Architecture
//!
//! ```text
//!                        initial prompt
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!   ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//!   │ Meta Agent  │     │ Meta Agent  │     │ Meta Agent  │   phase 1
//!   └──────┬──────┘     └──────┬──────┘     └──────┬──────┘
//!     ┌────┴────┐         ┌────┴────┐         ┌────┴────┐
//!     ▼    ▼    ▼         ▼    ▼    ▼         ▼    ▼    ▼
//!   ┌───┐┌───┐┌───┐     ┌───┐┌───┐┌───┐     ┌───┐┌───┐┌───┐
//!   │A1 ││A2 ││A3 │     │A4 ││A5 ││A6 │     │A7 ││A8 ││A9 │    fan-out
//!   └───┘└───┘└───┘     └───┘└───┘└───┘     └───┘└───┘└───┘
//!          │                   │                   │            fan-in
//!          └─────────── joined with " " ───────────┘           phase 2
//!                              │
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!           ┌──────────────┐        ┌──────────────┐
//!           │Special Agent │        │Special Agent │            phase 3
//!           └──────────────┘        └──────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Agent**: sends `role + ": " + input` to the backend, returns its answer
//! - **MetaAgent**: runs its children on one prompt, then thinks over their joined outputs
//! - **Special agent**: a free-standing agent run on the combined meta-agent output
//! - **Hierarchy**: the forest of meta agents and special agents
//! - **Topology**: the persisted, output-free form of a hierarchy

pub mod agent;
pub mod backend;
pub mod channel;
pub mod cli;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod interactive;
pub mod llama;
pub mod orchestrator;
pub mod topology;

pub use agent::{Agent, ChildOutputs, ExecutionMode, MetaAgent, ThinkContext, Thinker};
pub use backend::{InferenceBackend, InferenceError, RecordingBackend};
pub use channel::{event_channel, Event, EventReceiver, EventSender, RunId};
pub use config::SynodConfig;
pub use error::SynodError;
pub use hierarchy::{Hierarchy, NodePath};
pub use llama::{LlamaCliBackend, LlamaCliConfig};
pub use orchestrator::{Orchestrator, RunReport};
pub use topology::{TopologyRecord, DEFAULT_TOPOLOGY_FILE};
