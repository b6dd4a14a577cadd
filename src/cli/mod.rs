//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod ask;
pub mod common;
pub mod config;
pub mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "psybot")]
#[command(version)]
#[command(about = "Telegram bot for psychological analysis backed by an LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Telegram bot
    Run {
        /// Config file (defaults to ~/.psybot/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run one question through the pipeline and print the reply
    Ask {
        /// The question to ask
        question: String,
        /// User id charged against the rate limit
        #[arg(long, default_value = "cli")]
        user: String,
        /// Config file (defaults to ~/.psybot/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Load, validate and report the configuration
    Check {
        /// Config file (defaults to ~/.psybot/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn cmd_version() {
    println!("psybot {}", env!("CARGO_PKG_VERSION"));
}

pub async fn run() -> Result<()> {
    // A missing .env file is fine; variables may come from the real environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Run { config }) => {
            run::cmd_run(config).await?;
        }
        Some(Commands::Ask {
            question,
            user,
            config,
        }) => {
            ask::cmd_ask(question, user, config).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action).await?;
        }
    }

    Ok(())
}
