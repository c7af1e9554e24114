//! Canopy demo driver: run the sampling engines against the built-in mock
//! stack.
//!
//! Provides one subcommand per driver:
//!
//! - `sample` -- independent linear trajectories across several environments
//! - `tree`   -- branching tree search with Monte-Carlo value backup
//! - `beam`   -- width-bounded beam search guided by total reward

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use canopy::agent::{CounterState, ScriptedAgent};
use canopy::config::CanopyConfig;
use canopy::env::CountingEnv;
use canopy::rollout::{
    BeamSearchRollout, Callback, LoggingCallback, MeanMetricsCallback, RolloutManager,
    TreeSearchRollout,
};
use canopy::trajectory::Trajectory;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Canopy: concurrent rollout and tree-search sampling.
#[derive(Parser)]
#[command(name = "canopy", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample independent linear trajectories, one per environment.
    Sample {
        /// Number of environments to run concurrently.
        #[arg(long, default_value_t = 4)]
        num_envs: usize,

        /// Step budget per trajectory.
        #[arg(long, default_value_t = 8)]
        max_steps: usize,

        /// Directory to dump each trajectory as JSONL.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Explore a branching tree from one environment and back up values.
    Tree {
        /// Levels below the root to expand.
        #[arg(long, default_value_t = 3)]
        max_depth: usize,

        /// Discount factor for the Monte-Carlo value backup.
        #[arg(long, default_value_t = 0.9)]
        discount: f64,

        /// Directory to dump each root-to-leaf trajectory as JSONL.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run width-bounded beam search scored by total reward.
    Beam {
        /// Number of environments to run concurrently.
        #[arg(long, default_value_t = 2)]
        num_envs: usize,

        /// Round budget per environment.
        #[arg(long, default_value_t = 5)]
        max_steps: usize,
    },
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str::<CanopyConfig>(&text)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?
        }
        None => CanopyConfig::default(),
    };

    match cli.command {
        Commands::Sample {
            num_envs,
            max_steps,
            output,
        } => cmd_sample(&config, num_envs, max_steps, output.as_deref()).await,
        Commands::Tree {
            max_depth,
            discount,
            output,
        } => cmd_tree(&config, max_depth, discount, output.as_deref()).await,
        Commands::Beam {
            num_envs,
            max_steps,
        } => cmd_beam(&config, num_envs, max_steps).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn observers() -> (
    Arc<MeanMetricsCallback>,
    Vec<Arc<dyn Callback<CounterState, String>>>,
) {
    let metrics = Arc::new(MeanMetricsCallback::new());
    let callbacks: Vec<Arc<dyn Callback<CounterState, String>>> =
        vec![Arc::new(LoggingCallback), metrics.clone()];
    (metrics, callbacks)
}

async fn cmd_sample(
    config: &CanopyConfig,
    num_envs: usize,
    max_steps: usize,
    output: Option<&Path>,
) -> Result<()> {
    let (metrics, callbacks) = observers();
    let manager = RolloutManager::new(ScriptedAgent::default(), config.sample.clone())
        .with_callbacks(callbacks);

    let environments: Vec<CountingEnv> = (0..num_envs)
        .map(|_| CountingEnv::new().with_limit(max_steps as f64).with_step_reward(1.0))
        .collect();
    let trajectories = manager
        .sample_trajectories(environments, Some(max_steps))
        .await?;

    println!("Sampled {} trajectories:", trajectories.len());
    for traj in &trajectories {
        let returns = traj.discounted_returns(0.99);
        println!(
            "  [{id}] steps={steps} reward={reward:.2} return={ret:.3}",
            id = &traj.traj_id[..8],
            steps = traj.len(),
            reward = traj.total_reward(),
            ret = returns.first().copied().unwrap_or(0.0),
        );
    }
    print_metrics(&metrics);

    if let Some(dir) = output {
        dump_trajectories(&trajectories, dir)?;
    }
    Ok(())
}

async fn cmd_tree(
    config: &CanopyConfig,
    max_depth: usize,
    discount: f64,
    output: Option<&Path>,
) -> Result<()> {
    let (metrics, callbacks) = observers();
    let rollout = TreeSearchRollout::new(
        ScriptedAgent::default(),
        CountingEnv::clone,
        config.tree.clone(),
    )
    .with_callbacks(callbacks);

    let env = CountingEnv::new()
        .with_limit(max_depth as f64 + 1.0)
        .with_step_reward(1.0)
        .with_noise(0.05);
    let mut tree = rollout.sample_tree(env, max_depth).await?;
    tree.assign_mc_value_estimates(discount)?;

    let trajectories = tree.get_trajectories();
    println!(
        "Explored {} transitions across {} root-to-leaf paths:",
        tree.len(),
        trajectories.len()
    );
    for traj in &trajectories {
        let first_value = traj.steps.first().and_then(|step| step.value);
        println!(
            "  [{id}] depth={depth} reward={reward:.2} value={value:.3}",
            id = traj.traj_id.split_once(':').map_or("", |(_, rest)| rest),
            depth = traj.len(),
            reward = traj.total_reward(),
            value = first_value.unwrap_or(0.0),
        );
    }
    print_metrics(&metrics);

    if let Some(dir) = output {
        dump_trajectories(&trajectories, dir)?;
    }
    Ok(())
}

async fn cmd_beam(config: &CanopyConfig, num_envs: usize, max_steps: usize) -> Result<()> {
    let (metrics, callbacks) = observers();
    let rollout = BeamSearchRollout::new(
        ScriptedAgent::default(),
        CountingEnv::clone,
        |state: &CounterState| *state,
        |traj: &Trajectory<CounterState, String>| traj.total_reward(),
        config.beam.clone(),
    )
    .with_callbacks(callbacks);

    let environments: Vec<CountingEnv> = (0..num_envs)
        .map(|_| {
            CountingEnv::new()
                .with_limit(max_steps as f64)
                .with_step_reward(1.0)
                .with_noise(0.05)
        })
        .collect();
    let trajectories = rollout.sample_trajectories(environments, max_steps).await?;

    println!("Beam search kept {} trajectories:", trajectories.len());
    for traj in &trajectories {
        println!(
            "  [{id}] steps={steps} reward={reward:.2}",
            id = &traj.traj_id,
            steps = traj.len(),
            reward = traj.total_reward(),
        );
    }
    print_metrics(&metrics);
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_metrics(metrics: &MeanMetricsCallback) {
    let snapshot = metrics.snapshot();
    println!(
        "Observed {} transitions ({} terminal), mean reward {:.3}",
        snapshot.transitions,
        snapshot.terminals,
        snapshot.mean_reward()
    );
}

fn dump_trajectories(
    trajectories: &[Trajectory<CounterState, String>],
    dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    for traj in trajectories {
        let file_name = format!("{}.jsonl", traj.traj_id.replace(':', "_"));
        traj.to_jsonl(dir.join(file_name))?;
    }
    tracing::info!(count = trajectories.len(), dir = %dir.display(), "wrote trajectories");
    Ok(())
}
