use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use agentgate::config::{CONFIG_FILE, GateConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "agentgate")]
#[command(
    version,
    about = "Run AI coding-agent CLIs against local repositories without manual keypresses"
)]
pub struct Cli {
    /// Path to the configuration file. Missing file means defaults.
    #[arg(long, global = true, env = "AGENTGATE_CONFIG", default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Directory holding the cloned repositories. Overrides config and env.
    #[arg(long, global = true)]
    pub repos_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run an agent once against a repository
    Run {
        /// Agent profile name
        #[arg(short, long, default_value = "claude")]
        agent: String,
        /// Repository directory name under the repositories root
        #[arg(short, long)]
        repo: String,
        /// Prompt text handed to the agent
        query: String,
        /// Defaults to `[timeouts] query_secs`
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the agent prompt built from a Jira issue JSON file
    Ticket {
        #[arg(short, long)]
        file: PathBuf,
        /// Issue key; defaults to the file's "key"
        #[arg(long)]
        key: Option<String>,
        /// Print the parsed ticket context as JSON instead of the prompt
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose {
        "agentgate=debug"
    } else {
        "agentgate=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// File, then environment, then the global CLI flags.
fn load_config(cli: &Cli) -> Result<GateConfig> {
    let mut config = GateConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.apply_env();
    Ok(config.with_cli_overrides(None, None, cli.repos_dir.clone()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match &cli.command {
        Commands::Serve { host, port } => {
            let config = load_config(&cli)?.with_cli_overrides(host.clone(), *port, None);
            cmd::cmd_serve(config).await?;
        }
        Commands::Run {
            agent,
            repo,
            query,
            timeout_secs,
            json,
        } => {
            let config = load_config(&cli)?;
            cmd::cmd_run(&config, agent, repo, query, *timeout_secs, *json).await?;
        }
        Commands::Ticket { file, key, json } => {
            let config = load_config(&cli)?;
            cmd::cmd_ticket(&config, file, key.as_deref(), *json)?;
        }
        Commands::Config { command } => {
            cmd::cmd_config(&cli.config, load_config(&cli), command.clone())?;
        }
    }

    Ok(())
}
