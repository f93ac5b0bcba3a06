// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use helm_cache_core::domain::collector_config::{CollectorConfigManifest, CONFIG_PATH_ENV};

use crate::overrides::ConfigOverrides;

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./helm-cache.yaml)
        #[arg(short, long, default_value = "./helm-cache.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
    overrides: &ConfigOverrides,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, overrides, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override), overrides),
        ConfigCommand::Generate { output, examples } => generate(&output, examples),
    }
}

/// Load the configuration file (or defaults) and layer the flags on top
pub fn load_effective(
    config_path: Option<PathBuf>,
    overrides: &ConfigOverrides,
) -> Result<CollectorConfigManifest> {
    let mut config =
        CollectorConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    overrides.apply(&mut config);
    Ok(config)
}

fn show(config_override: Option<PathBuf>, overrides: &ConfigOverrides, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config-file flag: {}", path.display());
        } else {
            println!("  1. --config-file flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./helm-cache.yaml");
        println!("  4. ~/.helm-cache/config.yaml");
        println!("  5. /etc/helm-cache/config.yaml");
        println!();
    }

    let config = load_effective(config_override, overrides)?;
    let spec = &config.spec;

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Collector:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Home directory: {}", spec.home_directory.display());
    println!("  Scanning interval: {}", humantime::format_duration(spec.scanning_interval));
    println!();

    println!("{}", "Registry:".bold());
    if spec.registry.is_active() {
        println!("  URL: {}", spec.registry.url);
        match spec.registry.credentials() {
            Some((user, _)) => println!("  Credentials: {} / {}", user, "********".dimmed()),
            None => println!("  Credentials: {}", "(none)".dimmed()),
        }
        println!("  Timeout: {}", humantime::format_duration(spec.registry.timeout));
        println!(
            "  Retries: {} (base delay {}ms)",
            spec.registry.max_retries, spec.registry.retry_delay_ms
        );
    } else {
        println!("  {}", "(not configured, publishing disabled)".yellow());
    }
    println!();

    println!("{}", "Cluster:".bold());
    if spec.cluster.in_cluster {
        println!("  Mode: in-cluster service account");
    } else {
        println!(
            "  Kubeconfig: {}",
            spec.cluster
                .kubeconfig_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "$KUBECONFIG or ~/.kube/config".to_string())
        );
    }
    println!(
        "  Namespace: {}",
        if spec.cluster.namespace.is_empty() { "(all)" } else { &spec.cluster.namespace }
    );
    println!();

    println!("{}", "Helm:".bold());
    println!("  Binary: {}", spec.helm.binary);
    println!();

    println!("{}", "Observability:".bold());
    println!(
        "  Logging: {} ({})",
        spec.observability.logging.level, spec.observability.logging.format
    );
    if spec.observability.metrics.enabled {
        println!("  Metrics: enabled on port {}", spec.observability.metrics.port);
    } else {
        println!("  Metrics: {}", "disabled".dimmed());
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>, overrides: &ConfigOverrides) -> Result<()> {
    println!("Validating configuration...");

    let config = load_effective(config_path, overrides)?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: &Path, with_examples: bool) -> Result<()> {
    let sample = if with_examples { EXAMPLES_TEMPLATE } else { MINIMAL_TEMPLATE };

    std::fs::write(output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
