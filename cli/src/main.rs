// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # helm-cache
//!
//! Watches the Helm release records stored in a Kubernetes cluster, rebuilds
//! the chart of every deployed release and publishes each chart version to a
//! ChartMuseum registry exactly once.
//!
//! ## Commands
//!
//! - `helm-cache run` (default) - Sweep every scanning interval until stopped
//! - `helm-cache sweep` - Run one sweep and print its summary
//! - `helm-cache config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use helm_cache::commands::{self, ConfigCommand};
use helm_cache::daemon;
use helm_cache::observability::{init_logging, install_metrics_exporter, with_startup_logging};
use helm_cache::overrides::ConfigOverrides;

/// helm-cache - Keep a chart registry in sync with deployed Helm releases
#[derive(Parser)]
#[command(name = "helm-cache")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short = 'f',
        long,
        global = true,
        env = "HELM_CACHE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config_file: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "HELM_CACHE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format
    #[arg(long, global = true, env = "HELM_CACHE_LOG_FORMAT", value_parser = ["text", "json"])]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the collector daemon (default)
    #[command(name = "run")]
    Run,

    /// Run a single sweep and exit
    #[command(name = "sweep")]
    Sweep,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let command = match cli.command {
        Some(Commands::Config { command }) => {
            init_logging(
                cli.log_level.as_deref().unwrap_or("warn"),
                cli.log_format.as_deref().unwrap_or("text"),
            )?;
            return commands::config::handle_command(command, cli.config_file, &cli.overrides).await;
        }
        other => other.unwrap_or(Commands::Run),
    };

    let mut config = with_startup_logging(cli.log_level.as_deref(), cli.log_format.as_deref(), || {
        commands::config::load_effective(cli.config_file, &cli.overrides)
    })??;
    if let Some(level) = cli.log_level {
        config.spec.observability.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.spec.observability.logging.format = format;
    }

    let logging = &config.spec.observability.logging;
    init_logging(&logging.level, &logging.format)?;
    config.validate().context("Configuration validation failed")?;

    if config.spec.observability.metrics.enabled {
        install_metrics_exporter(config.spec.observability.metrics.port)?;
    }

    match command {
        Commands::Sweep => commands::sweep::execute(config).await,
        _ => {
            info!("Starting helm-cache {}", env!("CARGO_PKG_VERSION"));
            daemon::run(config).await
        }
    }
}
