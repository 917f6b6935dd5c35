//! The `courier` binary: decompose and run requests, list agents, and
//! inspect or drain the SQLite-backed offline queue.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use courier_core::{CourierResult, TaskCategory};
use courier_dispatch::{default_roster, Agent, Coordinator, StepOutcome};
use courier_sync::{
    BackendRegistry, ConnectivityMonitor, DispatchRequest, ExecutionBackend, SqliteOfflineStore,
    SyncEngine,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "courier", about = "Courier — task dispatcher with an offline-resilient queue")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "courier.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose a request into a queue and execute it
    Run {
        /// The free-text request
        request: String,
        /// Requesting user id
        #[arg(long, default_value = "cli-user")]
        user: String,
        /// Start with connectivity down (deferrable tasks go to the offline queue)
        #[arg(long)]
        offline: bool,
    },
    /// List registered agents
    Agents,
    /// Inspect or drain the offline queue
    Offline {
        #[command(subcommand)]
        action: OfflineAction,
    },
}

#[derive(Subcommand)]
enum OfflineAction {
    /// Show per-status entry counts
    Stats,
    /// Run one sync pass now
    Sync,
}

#[derive(Deserialize, Default)]
struct CourierConfig {
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    #[serde(default = "default_sync_interval_secs")]
    sync_interval_secs: u64,
    #[serde(default = "default_dispatch_timeout_secs")]
    dispatch_timeout_secs: u64,
    /// Extra agents registered on top of the built-in roster.
    #[serde(default)]
    agents: Vec<AgentConfig>,
}

#[derive(Deserialize)]
struct AgentConfig {
    id: String,
    name: String,
    category: TaskCategory,
    capabilities: Vec<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_sync_interval_secs() -> u64 {
    30
}
fn default_dispatch_timeout_secs() -> u64 {
    8
}

/// Stand-in execution backend: acknowledges every dispatch.
struct SimulatedBackend;

#[async_trait]
impl ExecutionBackend for SimulatedBackend {
    async fn execute(&self, request: &DispatchRequest) -> CourierResult<serde_json::Value> {
        info!(entry_type = %request.entry_type, "simulated dispatch");
        Ok(serde_json::json!({
            "simulated": true,
            "entry_type": request.entry_type,
        }))
    }
}

async fn build_coordinator(config: &CourierConfig, online: bool) -> anyhow::Result<Coordinator> {
    tokio::fs::create_dir_all(&config.data_dir).await?;
    let store = SqliteOfflineStore::open(config.data_dir.join("offline.db"))?;

    let mut backends = BackendRegistry::new();
    backends.set_fallback(Arc::new(SimulatedBackend));

    let engine = Arc::new(
        SyncEngine::new(
            Arc::new(store),
            Arc::new(backends),
            ConnectivityMonitor::new(online),
        )
        .with_sync_interval(Duration::from_secs(config.sync_interval_secs))
        .with_dispatch_timeout(Duration::from_secs(config.dispatch_timeout_secs)),
    );

    let mut roster = default_roster();
    for agent in &config.agents {
        roster.push(Agent::new(
            agent.id.clone(),
            agent.name.clone(),
            agent.category,
            agent.capabilities.clone(),
        ));
    }

    Ok(Coordinator::new(engine, roster).await?)
}

fn print_outcome(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Completed => "completed".to_string(),
        StepOutcome::Failed { reason } => format!("failed: {reason}"),
        StepOutcome::Deferred { entry } => format!("deferred to offline entry {entry}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // Missing config falls back to defaults; a present but invalid file is an error.
    let config: CourierConfig = match tokio::fs::read_to_string(&cli.config).await {
        Ok(text) => toml::from_str(&text)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CourierConfig::default(),
        Err(e) => {
            return Err(anyhow::anyhow!(
                "failed to read config file '{}': {}",
                cli.config.display(),
                e
            ))
        }
    };

    match cli.command {
        Commands::Run {
            request,
            user,
            offline,
        } => {
            let coordinator = build_coordinator(&config, !offline).await?;

            let queue = coordinator.create_queue(&user, &request).await?;
            println!("Queue {} ({} task(s)):", queue.id, queue.tasks.len());
            for task in &queue.tasks {
                println!("  [{}] {} ({})", task.category, task.description, task.priority);
            }

            let report = coordinator.execute_queue(queue.id).await?;
            println!("\nExecution: {}", report.summary());
            for step in &report.steps {
                let agent = step.agent.as_deref().unwrap_or("-");
                println!("  {} via {} — {}", step.description, agent, print_outcome(&step.outcome));
            }

            let stats = coordinator.offline_statistics().await?;
            if stats.pending > 0 {
                println!(
                    "\n{} entry(ies) parked offline; run `courier offline sync` once connectivity returns",
                    stats.pending
                );
            }
        }
        Commands::Agents => {
            let coordinator = build_coordinator(&config, true).await?;
            println!("Registered agents:");
            for agent in coordinator.list_agents().await {
                println!(
                    "  {} — {} [{}] capabilities: {}",
                    agent.id,
                    agent.name,
                    agent.category,
                    agent.capabilities.join(", ")
                );
            }
        }
        Commands::Offline { action } => {
            let coordinator = build_coordinator(&config, true).await?;
            match action {
                OfflineAction::Stats => {
                    let stats = coordinator.offline_statistics().await?;
                    println!("Offline queue:");
                    println!("  pending:   {}", stats.pending);
                    println!("  syncing:   {}", stats.syncing);
                    println!("  completed: {}", stats.completed);
                    println!("  failed:    {}", stats.failed);
                    println!("  total:     {}", stats.total);
                }
                OfflineAction::Sync => match coordinator.sync_now().await? {
                    Some(report) => {
                        println!("Sync pass: {} synced, {} failed", report.synced, report.failed);
                    }
                    None => println!("A sync pass is already in flight."),
                },
            }
        }
    }

    Ok(())
}
