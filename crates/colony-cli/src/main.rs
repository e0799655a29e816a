mod agent_cmd;
mod config;
mod goal_cmd;
mod local;
mod run_cmd;
mod runtime;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "colony", about = "Parent-agent orchestrator for a colony of LLM worker agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a colony config file with default settings
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Goal management
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Agent fleet management
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
    /// Advance the orchestrator FSM by exactly one phase
    Tick,
    /// Audit the agent fleet and apply one healing action per unhealthy worker
    Heal,
    /// Repeatedly tick and heal until every active goal reaches a terminal phase
    Run {
        /// Stop after this many ticks even if goals remain active
        #[arg(long)]
        max_ticks: Option<u64>,
        /// Seconds to sleep between ticks
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Submit a new goal to the colony
    Create {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List all active goals with a progress summary
    List,
    /// Show detailed status for one goal
    Show { goal_id: String },
    /// Approve a plan stuck in plan_review
    Approve { goal_id: String },
}

#[derive(Subcommand)]
enum AgentCommands {
    /// Register a new worker agent
    Add {
        address: String,
        name: String,
        #[arg(long, default_value = "generalist")]
        role: String,
    },
    /// List every registered agent and its status
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => cmd_init(force)?,
        Commands::Goal { command } => match command {
            GoalCommands::Create { title, description } => goal_cmd::run_create(title, description).await?,
            GoalCommands::List => goal_cmd::run_list().await?,
            GoalCommands::Show { goal_id } => goal_cmd::run_show(&goal_id).await?,
            GoalCommands::Approve { goal_id } => goal_cmd::run_approve(&goal_id).await?,
        },
        Commands::Agent { command } => match command {
            AgentCommands::Add { address, name, role } => agent_cmd::run_add(address, name, role).await?,
            AgentCommands::List => agent_cmd::run_list().await?,
        },
        Commands::Tick => run_cmd::run_tick().await?,
        Commands::Heal => run_cmd::run_heal().await?,
        Commands::Run { max_ticks, interval } => run_cmd::run_loop(max_ticks, interval).await?,
    }

    Ok(())
}

/// Write a config file with default settings. Does not touch the store.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!("config file already exists at {}\nUse --force to overwrite.", path.display());
    }

    let cfg = config::ConfigFile::default();
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  orchestrator.max_replans = {}", cfg.orchestrator.max_replans);
    println!("  orchestrator.starting_balance_cents = {}", cfg.orchestrator.starting_balance_cents);
    println!();
    println!("Next: run `colony goal create \"<title>\"` to submit a goal.");
    Ok(())
}
