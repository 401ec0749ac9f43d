//! RustedCode CLI — the main entry point.
//!
//! Commands:
//! - `agent`   — Interactive chat or single-message mode
//! - `tools`   — List the built-in tools and their input schemas
//! - `config`  — Print the effective or default configuration
//! - `doctor`  — Diagnose configuration, workspace and provider

use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "rustedcode",
    about = "RustedCode — a coding-assistant agent for your project",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the coding agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,

        /// Override the iteration ceiling for each turn
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// List available tools
    Tools,

    /// Show configuration
    Config {
        /// Print the built-in defaults instead of the effective config
        #[arg(long)]
        default: bool,
    },

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries answers
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    match cli.command {
        Commands::Agent {
            message,
            conversation,
            max_iterations,
        } => commands::agent::run(message, conversation, max_iterations).await?,
        Commands::Tools => commands::tools::run()?,
        Commands::Config { default } => commands::config_cmd::run(default)?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
