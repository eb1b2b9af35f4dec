//! CLI interface for synod

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::agent::ExecutionMode;
use crate::backend::{InferenceBackend, RecordingBackend};
use crate::channel::{Event, EventReceiver};
use crate::config::SynodConfig;
use crate::hierarchy::{Hierarchy, NodeKind};
use crate::interactive;
use crate::llama::LlamaCliBackend;
use crate::orchestrator::Orchestrator;
use crate::topology;

#[derive(Parser)]
#[command(name = "synod")]
#[command(about = "Run a hierarchy of role-prompted agents over a local model", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model file handed to llama-cli
    #[arg(long, global = true, env = "SYNOD_MODEL")]
    model: Option<PathBuf>,

    /// llama-cli executable
    #[arg(long = "llama-cli", global = true, env = "SYNOD_LLAMA_CLI")]
    llama_cli: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hierarchy on a prompt (default when no command given)
    Run(RunArgs),
    /// Build a topology interactively and save it
    Build {
        /// Where to write the topology (default: configured topology path)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print a saved topology as a tree
    Show {
        /// Topology file (default: configured topology path)
        #[arg(short, long)]
        topology: Option<PathBuf>,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Load the topology from this file instead of asking
    #[arg(short, long)]
    topology: Option<PathBuf>,

    /// Initial prompt (asked for when omitted)
    #[arg(short, long)]
    prompt: Option<String>,

    /// Run sibling agents concurrently
    #[arg(long)]
    concurrent: bool,

    /// Echo prompts back instead of calling the model
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON instead of per-agent output
    #[arg(long)]
    json: bool,
}

/// Parse arguments and execute the requested command
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SynodConfig::load_or_default(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config.backend.model = model;
    }
    if let Some(binary) = cli.llama_cli {
        config.backend.binary = binary;
    }

    match cli.command {
        Some(Commands::Run(args)) => run_hierarchy(config, args).await,
        Some(Commands::Build { out }) => {
            let path = out.unwrap_or(config.topology_path);
            build_topology(&path)?;
            Ok(())
        }
        Some(Commands::Show { topology }) => {
            let path = topology.unwrap_or(config.topology_path);
            let hierarchy = topology::load_from_file(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            print!("{}", hierarchy.render_tree());
            Ok(())
        }
        None => run_hierarchy(config, RunArgs::default()).await,
    }
}

fn build_topology(path: &Path) -> Result<Hierarchy> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    let hierarchy = interactive::collect_hierarchy(&mut input, &mut output)?;
    topology::save_to_file(path, &hierarchy)?;
    println!("Configuration saved to {}.", path.display());
    Ok(hierarchy)
}

fn resolve_hierarchy(config: &SynodConfig, topology: Option<&Path>) -> Result<Hierarchy> {
    if let Some(path) = topology {
        return topology::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()));
    }

    let load = {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        interactive::confirm(
            &mut input,
            &mut io::stdout(),
            "Do you want to load agent configuration from file? (y/n): ",
        )?
    };

    if load {
        let hierarchy = topology::load_from_file(&config.topology_path)
            .with_context(|| format!("Failed to load {}", config.topology_path.display()))?;
        println!("Configuration loaded from {}.", config.topology_path.display());
        Ok(hierarchy)
    } else {
        build_topology(&config.topology_path)
    }
}

async fn run_hierarchy(config: SynodConfig, args: RunArgs) -> Result<()> {
    let hierarchy = resolve_hierarchy(&config, args.topology.as_deref())?;

    let prompt = match args.prompt {
        Some(prompt) => prompt,
        None => {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            interactive::ask_line(
                &mut input,
                &mut io::stdout(),
                "What is the initial problem or topic to deliberate? ",
            )?
        }
    };

    let backend: Arc<dyn InferenceBackend> = if args.dry_run {
        Arc::new(RecordingBackend::echo())
    } else {
        Arc::new(LlamaCliBackend::new(config.backend.clone()))
    };
    let mode = if args.concurrent {
        ExecutionMode::Concurrent
    } else {
        config.mode
    };

    info!(agents = hierarchy.len(), ?mode, dry_run = args.dry_run, "Running hierarchy");
    let (orchestrator, events) = Orchestrator::with_channel(hierarchy, backend);
    let orchestrator = orchestrator.with_mode(mode);

    let printer = (!args.json).then(|| tokio::spawn(print_events(events)));
    let result = orchestrator.run(&prompt).await;
    drop(orchestrator);
    if let Some(printer) = printer {
        printer.await?;
    }

    let report = result?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

/// Print agent outputs as they arrive, until the orchestrator goes away
async fn print_events(mut events: EventReceiver) {
    let mut stdout = io::stdout();
    while let Some(event) = events.recv().await {
        let _ = match event {
            Event::BranchStarted { node, .. } => {
                writeln!(stdout, "\nRunning Meta-Agent {}...", node.name())
            }
            Event::AgentOutput { node, output, .. } => {
                match node.segments().last().map(|s| s.kind) {
                    Some(NodeKind::MetaAgent) => {
                        writeln!(stdout, "\n{} Meta-Agent Output: {output}", node.name())
                    }
                    _ => writeln!(stdout, "{} Output: {output}", node.name()),
                }
            }
            Event::SpecialAgentsStarted { .. } => writeln!(
                stdout,
                "\nRunning Special Agents on the Combined Meta-Agent Outputs..."
            ),
            Event::RunFailed { error, .. } => writeln!(stdout, "\nRun failed: {error}"),
            _ => Ok(()),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "synod", "run", "--topology", "team.json", "--prompt", "topic", "--concurrent",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.topology, Some(PathBuf::from("team.json")));
                assert_eq!(args.prompt.as_deref(), Some("topic"));
                assert!(args.concurrent);
                assert!(!args.dry_run);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["synod", "show", "--model", "/m.gguf"]).unwrap();
        assert_eq!(cli.model, Some(PathBuf::from("/m.gguf")));
        assert!(matches!(cli.command, Some(Commands::Show { topology: None })));
    }

    #[test]
    fn test_no_command() {
        let cli = Cli::try_parse_from(["synod"]).unwrap();
        assert!(cli.command.is_none());
    }
}
