// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sweep Orchestrator
//!
//! One sweep lists every stored release record, keeps the current revision of
//! each release and runs it through the [`ArtifactPipeline`]. Per-item
//! failures are counted and logged; only a failed listing or a failed
//! existence-cache construction fails the sweep as a whole.
//!
//! The pipeline, and with it the existence cache, is built on the first sweep
//! and reused for the lifetime of the orchestrator. When construction fails
//! the next sweep tries again.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Periodic reconciliation entry point

use crate::application::artifact_pipeline::{ArtifactPipeline, PipelineOutcome};
use crate::application::existence_cache::ExistenceCache;
use crate::domain::events::{CollectorEvent, SweepId, SweepSummary};
use crate::domain::packaging::Packager;
use crate::domain::registry::{RegistryClient, RegistryError};
use crate::domain::release::{ListError, ReleaseLister, RevisionSelector, SelectionAnomaly};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::workspace::ChartWorkspace;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn, Instrument};

/// Sweep-level failures
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("failed to list release records: {0}")]
    Listing(#[from] ListError),

    #[error("failed to build the existence cache: {0}")]
    CacheConstruction(#[source] RegistryError),
}

pub struct SweepOrchestrator {
    lister: Arc<dyn ReleaseLister>,
    registry: Arc<dyn RegistryClient>,
    packager: Arc<dyn Packager>,
    workspace: Arc<ChartWorkspace>,
    event_bus: Arc<EventBus>,
    selector: RevisionSelector,
    pipeline: OnceCell<ArtifactPipeline>,
}

impl SweepOrchestrator {
    pub fn new(
        lister: Arc<dyn ReleaseLister>,
        registry: Arc<dyn RegistryClient>,
        packager: Arc<dyn Packager>,
        workspace: Arc<ChartWorkspace>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            lister,
            registry,
            packager,
            workspace,
            event_bus,
            selector: RevisionSelector::new(),
            pipeline: OnceCell::new(),
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Number of artifacts known to the existence cache, once it exists
    pub fn cached_artifacts(&self) -> Option<usize> {
        self.pipeline.get().map(|pipeline| pipeline.cache().len())
    }

    pub async fn run_sweep(&self) -> Result<SweepSummary, SweepError> {
        let sweep_id = SweepId::new();
        let span = tracing::info_span!("sweep", sweep_id = %sweep_id);

        metrics::counter!("helm_cache_sweeps_total").increment(1);
        let result = self.sweep(sweep_id).instrument(span).await;
        if result.is_err() {
            metrics::counter!("helm_cache_sweep_failures_total").increment(1);
        }
        result
    }

    async fn sweep(&self, sweep_id: SweepId) -> Result<SweepSummary, SweepError> {
        let started = Instant::now();
        self.event_bus.publish(CollectorEvent::SweepStarted {
            sweep_id,
            started_at: Utc::now(),
        });

        let objects = self.lister.list().await?;
        let selection = self.selector.select(objects);

        let mut summary = SweepSummary::new(sweep_id);
        summary.selected = selection.current.len();
        summary.anomalies = selection.anomalies.len();
        for anomaly in &selection.anomalies {
            let object_name = match anomaly {
                SelectionAnomaly::MalformedRecord { object_name, .. } => Some(object_name.clone()),
                SelectionAnomaly::DuplicateRevision { discarded, .. } => Some(discarded.clone()),
            };
            self.event_bus.publish(CollectorEvent::RecordSkipped {
                sweep_id,
                object_name,
                reason: anomaly.to_string(),
                skipped_at: Utc::now(),
            });
        }

        let pipeline = self.pipeline().await?;

        for record in selection.into_ordered() {
            match pipeline.run(&record).await {
                Ok(PipelineOutcome::AlreadyPresent) => summary.already_present += 1,
                Ok(PipelineOutcome::Published) => summary.published += 1,
                Ok(PipelineOutcome::PackagedOnly) => summary.packaged_only += 1,
                // Logged and reported by the pipeline
                Err(_) => summary.failed += 1,
            }
        }

        summary.duration = started.elapsed();
        info!(
            selected = summary.selected,
            published = summary.published,
            already_present = summary.already_present,
            packaged_only = summary.packaged_only,
            failed = summary.failed,
            anomalies = summary.anomalies,
            duration_ms = summary.duration.as_millis() as u64,
            "Sweep completed"
        );
        self.event_bus.publish(CollectorEvent::SweepCompleted {
            summary: summary.clone(),
            completed_at: Utc::now(),
        });
        Ok(summary)
    }

    async fn pipeline(&self) -> Result<&ArtifactPipeline, SweepError> {
        self.pipeline
            .get_or_try_init(|| async {
                if let Err(e) = self.workspace.prepare().await {
                    warn!(error = %e, "Failed to prepare local workspace");
                }

                let cache = ExistenceCache::seed(self.registry.as_ref())
                    .await
                    .map_err(SweepError::CacheConstruction)?;

                Ok(ArtifactPipeline::new(
                    Arc::new(cache),
                    Arc::clone(&self.registry),
                    Arc::clone(&self.packager),
                    Arc::clone(&self.workspace),
                    Arc::clone(&self.event_bus),
                ))
            })
            .await
    }
}
