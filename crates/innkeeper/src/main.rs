// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Innkeeper - outbound delivery pipeline for a hotel guest-messaging bot.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use innkeeper_config::model::InnkeeperConfig;
use innkeeper_core::Priority;

/// Innkeeper - outbound delivery pipeline for a hotel guest-messaging bot.
#[derive(Parser, Debug)]
#[command(name = "innkeeper", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run delivery workers, the lease reaper and the gateway.
    Serve,
    /// Print queue counts by status.
    Stats,
    /// Queue a text message for delivery.
    Enqueue {
        /// Guest phone number in international format.
        recipient: String,
        /// Message body.
        text: String,
        /// low, normal or high.
        #[arg(long, default_value = "normal")]
        priority: Priority,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validate configuration and exit.
    Check,
    /// Print the effective configuration with secrets redacted.
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            innkeeper_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Stats) => commands::run_stats(&config).await,
        Some(Commands::Enqueue {
            recipient,
            text,
            priority,
        }) => commands::run_enqueue(&config, &recipient, &text, priority)
            .await
            .map(|_| ()),
        Some(Commands::Config { action }) => match action {
            ConfigCommands::Check => {
                commands::run_config_check(&config);
                Ok(())
            }
            ConfigCommands::Show => commands::run_config_show(&config),
        },
        None => {
            println!("innkeeper: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn load_config(
    path: Option<&std::path::Path>,
) -> Result<InnkeeperConfig, Vec<innkeeper_config::ConfigError>> {
    match path {
        Some(path) => innkeeper_config::load_and_validate_path(path),
        None => innkeeper_config::load_and_validate(),
    }
}
