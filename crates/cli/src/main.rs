//! codeloop CLI — the main entry point.
//!
//! Commands:
//! - `run`       — Drive one agent run against a project
//! - `providers` — List supported LLM providers
//! - `config`    — Print the default, current or path of the config

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use codeloop_core::tier::{ContextMode, LicenseTier};

mod commands;

#[derive(Parser)]
#[command(
    name = "codeloop",
    about = "codeloop — an autonomous coding agent in your terminal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent on a task
    Run {
        /// The task prompt
        #[arg(short, long)]
        message: String,

        /// Provider name (openai, anthropic, gemini, deepseek, ollama, ...)
        #[arg(long, env = "CODELOOP_PROVIDER")]
        provider: Option<String>,

        /// Model; defaults to the provider's configured model
        #[arg(long)]
        model: Option<String>,

        /// License tier: free, standard or pro
        #[arg(long)]
        tier: Option<LicenseTier>,

        /// Context mode: full, smart or minimal
        #[arg(long)]
        context: Option<ContextMode>,

        /// Project directory (defaults to the current directory)
        #[arg(long)]
        project: Option<PathBuf>,

        /// Attach a file to the prompt (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// Write accepted file changes to disk instead of rejecting them
        #[arg(long)]
        apply: bool,
    },

    /// List supported LLM providers
    Providers,

    /// Print configuration
    Config {
        /// Print the config file path
        #[arg(long, conflicts_with = "current")]
        path: bool,

        /// Print the loaded configuration instead of the defaults
        #[arg(long)]
        current: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the assistant's text
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Run {
            message,
            provider,
            model,
            tier,
            context,
            project,
            files,
            apply,
        } => {
            commands::run::run(commands::run::RunArgs {
                message,
                provider,
                model,
                tier,
                context,
                project,
                files,
                apply,
            })
            .await?
        }
        Commands::Providers => commands::providers::run().await?,
        Commands::Config { path, current } => {
            if path {
                commands::config_cmd::path().await?
            } else if current {
                commands::config_cmd::show().await?
            } else {
                commands::config_cmd::defaults().await?
            }
        }
    }

    Ok(())
}
