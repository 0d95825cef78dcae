use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use loopgraph_core::config::AppConfig;
use loopgraph_core::event::EventBus;
use loopgraph_core::graph::GraphDefinition;
use loopgraph_core::state::State;
use loopgraph_core::types::GraphId;
use loopgraph_engine::{GraphEngine, RunLogger, RunStatus};
use loopgraph_tools::NodeRegistry;

#[derive(Parser)]
#[command(name = "loopgraph", version, about = "Graph workflow engine with conditional loops")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "loopgraph.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a registered graph, or a graph definition file, and print the run record
    Run {
        /// Graph id or path to a `.toml` / `.json` definition
        graph: String,
        /// Initial state as a JSON object
        #[arg(long, conflicts_with = "state_file")]
        state: Option<String>,
        /// Read the initial state from a JSON file
        #[arg(long)]
        state_file: Option<PathBuf>,
        /// Step budget for this run
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Check a graph definition file and list every defect
    Validate {
        file: PathBuf,
    },
    /// Start the HTTP gateway
    Serve,
    /// List registered node tools
    Tools,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("loopgraph=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "loopgraph", &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Run {
            graph,
            state,
            state_file,
            max_steps,
        } => {
            let initial = read_initial_state(state.as_deref(), state_file.as_deref())?;
            run_once(&config, &graph, initial, max_steps).await
        }
        Commands::Validate { file } => validate(&file),
        Commands::Serve => serve(config).await,
        Commands::Tools => {
            for def in NodeRegistry::with_builtins().definitions() {
                println!("{:<22} {}", def.name, def.description);
            }
            Ok(())
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

fn read_initial_state(inline: Option<&str>, file: Option<&Path>) -> anyhow::Result<Option<State>> {
    let raw = match (inline, file) {
        (Some(json), _) => json.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading state file {}", path.display()))?,
        (None, None) => return Ok(None),
    };
    let state: State = serde_json::from_str(&raw).context("initial state must be a JSON object")?;
    Ok(Some(state))
}

/// Start the JSONL run logger when `[log]` is enabled.
fn start_run_logger(
    config: &AppConfig,
    bus: &EventBus,
    cancel: &CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    let log = config.log.as_ref().filter(|l| l.enabled)?;
    Some(RunLogger::from_config(log).spawn(bus, cancel.clone()))
}

async fn run_once(
    config: &AppConfig,
    graph: &str,
    initial: Option<State>,
    max_steps: Option<usize>,
) -> anyhow::Result<()> {
    let bus = Arc::new(EventBus::default());
    let engine = GraphEngine::from_config(NodeRegistry::with_builtins(), config)?
        .with_event_bus(bus.clone());

    let path = Path::new(graph);
    let graph_id = if path.is_file() {
        engine.create_graph(GraphDefinition::load(path)?)?
    } else {
        GraphId::from(graph)
    };

    let cancel = CancellationToken::new();
    let logger = start_run_logger(config, &bus, &cancel);

    let record = engine.run_graph(&graph_id, initial, max_steps)?;

    cancel.cancel();
    if let Some(handle) = logger {
        handle.await.ok();
    }

    println!("{}", serde_json::to_string_pretty(record.as_ref())?);
    if record.status() == RunStatus::Aborted {
        std::process::exit(1);
    }
    Ok(())
}

fn validate(file: &Path) -> anyhow::Result<()> {
    let definition = GraphDefinition::load(file)?;
    let defects = loopgraph_engine::defects(&definition, &NodeRegistry::with_builtins());
    if defects.is_empty() {
        println!("{}: ok", file.display());
        return Ok(());
    }
    for defect in &defects {
        println!("{}: {}", file.display(), defect);
    }
    anyhow::bail!("{} defect(s) found", defects.len())
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let bus = Arc::new(EventBus::default());
    let engine = GraphEngine::from_config(NodeRegistry::with_builtins(), &config)?
        .with_event_bus(bus.clone());

    let cancel = CancellationToken::new();
    let logger = start_run_logger(&config, &bus, &cancel);
    if logger.is_none() {
        debug!("Run logging disabled");
    }

    let cancel_clone = cancel.clone();
    // Graceful shutdown on Ctrl-C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down gateway...");
        cancel_clone.cancel();
    });

    info!(bind = %config.gateway.bind, graphs = engine.graph_ids().len(), "Starting gateway");
    let server = loopgraph_gateway::GatewayServer::new(config.gateway.clone(), Arc::new(engine));
    server.run(cancel).await?;

    if let Some(handle) = logger {
        handle.await.ok();
    }
    Ok(())
}
