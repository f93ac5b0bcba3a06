// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! One-shot sweep

use anyhow::{Context, Result};
use colored::Colorize;

use helm_cache_core::domain::collector_config::CollectorConfigManifest;
use helm_cache_core::domain::events::SweepSummary;

use crate::daemon::build_orchestrator;

pub async fn execute(config: CollectorConfigManifest) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    let summary = orchestrator.run_sweep().await.context("Sweep failed")?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &SweepSummary) {
    println!("{} {}", "Sweep".bold(), summary.sweep_id.to_string().dimmed());
    println!("  Releases selected: {}", summary.selected);
    println!("  Published:         {}", summary.published.to_string().green());
    println!("  Already present:   {}", summary.already_present);
    if summary.packaged_only > 0 {
        println!("  Packaged only:     {}", summary.packaged_only.to_string().yellow());
    }
    if summary.anomalies > 0 {
        println!("  Skipped records:   {}", summary.anomalies.to_string().yellow());
    }
    if summary.failed > 0 {
        println!("  Failed:            {}", summary.failed.to_string().red());
    }
    println!("  Duration:          {:?}", summary.duration);
}
