mod agents;
mod app;
mod plan;
mod serve;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use pinbot_config::PinbotConfig;
use pinbot_types::ControlAction;

#[derive(Parser)]
#[command(name = "pinbot", about = "Scheduled persona agents for the content platform")]
struct Cli {
    /// Config file (defaults to ~/.pinbot/config.json5)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule every agent and run cycles until Ctrl-C
    Run,
    /// Print a sample day of fire times for one interval
    Plan {
        /// Window start, HH:MM
        #[arg(long)]
        start: String,

        /// Window end, HH:MM
        #[arg(long)]
        end: String,

        /// Actions per hour
        #[arg(long)]
        rate: i32,
    },
    /// Manage agents
    Agents {
        #[command(subcommand)]
        command: AgentCommands,
    },
    /// Check configuration and platform connectivity
    Health,
}

#[derive(Subcommand)]
enum AgentCommands {
    /// Onboard an agent from a JSON5 profile file
    Add { file: PathBuf },
    /// List stored agents
    List,
    /// Delete an agent and its history
    Remove { id: String },
    /// Run one cycle for an agent now
    Start { id: String },
    /// Stop an agent and drop its pending fire times
    Stop { id: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Plan { start, end, rate } => plan::print_plan(&start, &end, rate)?,
        Commands::Run => {
            let config = load_config(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve::run(config))?;
        }
        Commands::Agents { command } => {
            let config = load_config(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                match command {
                    AgentCommands::Add { file } => agents::add(config, &file).await,
                    AgentCommands::List => agents::list(config).await,
                    AgentCommands::Remove { id } => {
                        agents::control(config, &id, ControlAction::Delete).await
                    }
                    AgentCommands::Start { id } => {
                        agents::control(config, &id, ControlAction::RunNow).await
                    }
                    AgentCommands::Stop { id } => {
                        agents::control(config, &id, ControlAction::Stop).await
                    }
                }
            })?;
        }
        Commands::Health => {
            let config = load_config(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(agents::health(config))?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<PinbotConfig> {
    match path {
        Some(path) => pinbot_config::load_config_from(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => pinbot_config::load_config().context("failed to load config"),
    }
}
