use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

use mineagents_core::config::{self, MineAgentsConfig, ObservabilityConfig};
use mineagents_core::coordination::{
    CoordinationStore, LeaderCandidate, LeaderElection, LockOptions, ResourceLockManager,
};
use mineagents_core::telemetry::init_telemetry;

#[derive(Parser)]
#[command(name = "mineagents")]
#[command(about = "Inspect and operate the MineAgents coordination document")]
#[command(long_about = "MineAgents agents share one coordination document holding resource leases \
                       and the current team leader. This tool reads it and takes or drops leases \
                       on behalf of an operator, using the same advisory lock as the agents.")]
struct Cli {
    /// Coordination document path (overrides configuration)
    #[arg(long, global = true)]
    file: Option<String>,
    /// Advisory lock file path (overrides configuration)
    #[arg(long, global = true)]
    lock_file: Option<String>,
    /// Print logs to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the live (pruned) coordination document
    Show,
    /// Lease a resource, e.g. chest:10,64,-3
    Acquire {
        resource: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        ttl_ms: Option<u64>,
        #[arg(long)]
        wait_ms: Option<u64>,
    },
    /// Release a resource lease held by --owner
    Release {
        resource: String,
        #[arg(long)]
        owner: String,
    },
    /// Resolve the leader for a goal, standing as candidate
    Elect {
        #[arg(long)]
        goal: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "generalist")]
        role: String,
        #[arg(long)]
        agent_id: String,
        #[arg(long)]
        ttl_ms: Option<u64>,
    },
    /// Step down if the candidate currently leads
    Resign {
        #[arg(long)]
        name: String,
        #[arg(long)]
        agent_id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = config::config()?.clone();

    if let Some(file) = cli.file.clone() {
        config.coordination.file_path = file;
    }
    if let Some(lock_file) = cli.lock_file.clone() {
        config.coordination.lock_path = lock_file;
    }
    if cli.verbose {
        init_telemetry(&ObservabilityConfig {
            json: false,
            ..config.observability.clone()
        })?;
    }

    tokio::runtime::Runtime::new()?.block_on(async { run(cli.command, &config).await })
}

async fn run(command: Commands, config: &MineAgentsConfig) -> Result<()> {
    let store = Arc::new(CoordinationStore::from_config(&config.coordination));

    match command {
        Commands::Show => {
            let state = store.read().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::Acquire {
            resource,
            owner,
            ttl_ms,
            wait_ms,
        } => {
            let mut options = LockOptions::from_config(&config.coordination);
            if let Some(ttl_ms) = ttl_ms {
                options.ttl = Duration::from_millis(ttl_ms);
            }
            if let Some(wait_ms) = wait_ms {
                options.wait = Duration::from_millis(wait_ms);
            }

            let locks = ResourceLockManager::new(store, owner.clone());
            if !locks.acquire(&resource, options).await {
                bail!("{resource} is held by another owner");
            }
            println!("🔒 {resource} leased to {owner} for {}ms", options.ttl.as_millis());
        }
        Commands::Release { resource, owner } => {
            let locks = ResourceLockManager::new(store, owner.clone());
            if !locks.release(&resource).await {
                bail!("{resource} is not held by {owner}");
            }
            println!("🔓 {resource} released by {owner}");
        }
        Commands::Elect {
            goal,
            name,
            role,
            agent_id,
            ttl_ms,
        } => {
            let election = LeaderElection::new(store, config.coordination.leader_ttl());
            let candidate = LeaderCandidate::new(name, role, agent_id);
            let ttl = ttl_ms.map(Duration::from_millis).unwrap_or(election.default_ttl());
            let resolution = election.resolve_leader_for_goal(&goal, &candidate, ttl).await;

            match resolution.leader {
                Some(leader) => {
                    let marker = if resolution.elected { "👑 elected" } else { "👑 current" };
                    println!("{marker}: {} ({}) leads \"{}\"", leader.name, leader.agent_id, leader.goal);
                    println!("is_leader: {}", resolution.is_leader);
                }
                None => bail!("coordination store busy, no leader resolved for \"{goal}\""),
            }
        }
        Commands::Resign { name, agent_id } => {
            let election = LeaderElection::new(store, config.coordination.leader_ttl());
            let candidate = LeaderCandidate::new(name.clone(), "", agent_id);
            if !election.resign(&candidate).await {
                bail!("{name} is not the current leader");
            }
            println!("{name} stepped down");
        }
    }

    Ok(())
}
