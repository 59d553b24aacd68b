// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - conversation context for multi-tenant chatbots.
//!
//! This is the binary entry point: an interactive context inspector and a
//! dependency health check.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod doctor;
mod services;
mod shell;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use parley_config::model::ParleyConfig;
use tracing_subscriber::EnvFilter;

/// Parley - conversation context for multi-tenant chatbots.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run conversation turns interactively and inspect the built context.
    Shell {
        #[arg(long, default_value = "local")]
        tenant: String,
        #[arg(long, default_value = "shell")]
        bot: String,
        /// Visitor id used for profile linking.
        #[arg(long)]
        visitor: Option<String>,
        /// Keep profiles and history in memory only.
        #[arg(long)]
        ephemeral: bool,
    },
    /// Check configuration and connectivity to every backend.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> ParleyConfig {
    let loaded = match path {
        Some(path) => parley_config::load_and_validate_path(path),
        None => parley_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

/// Installs the global subscriber; `RUST_LOG` wins over the configured level.
fn init_tracing(config: &ParleyConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.agent.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());
    init_tracing(&config);

    let result = match cli.command {
        Some(Commands::Shell {
            tenant,
            bot,
            visitor,
            ephemeral,
        }) => {
            let options = shell::ShellOptions {
                tenant_id: tenant,
                bot_id: bot,
                visitor_id: visitor,
                ephemeral,
            };
            shell::run_shell(config, options).await
        }
        Some(Commands::Doctor { plain }) => doctor::run_doctor(&config, cli.config.as_ref(), plain).await,
        None => {
            println!("parley: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {e}", "error".red());
        std::process::exit(1);
    }
}
