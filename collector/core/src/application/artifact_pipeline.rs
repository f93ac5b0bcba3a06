// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Artifact Pipeline
//!
//! Drives one selected release record from its encoded payload to a chart
//! published in the registry:
//!
//! ```text
//! Decoded ──► SourceMaterialized ──► Packaged ──► Published
//! ```
//!
//! Every stage first checks the state already on disk and skips work that an
//! earlier sweep completed, so an interrupted item resumes where it stopped.
//! A hit in the [`ExistenceCache`] short-circuits everything after decoding.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Per-artifact dedup state machine

use crate::application::existence_cache::ExistenceCache;
use crate::domain::artifact::{decode_release, ArtifactIdentity, DecodeError, DecodedRelease};
use crate::domain::events::{CollectorEvent, PipelineStage};
use crate::domain::packaging::{Packager, PackagingError};
use crate::domain::registry::{RegistryClient, RegistryError};
use crate::domain::release::{RawReleaseRecord, ReleaseIdentity};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::workspace::{ChartWorkspace, WorkspaceError};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How an item left the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The registry already had the artifact; nothing was built
    AlreadyPresent,
    Published,
    /// Packaged locally; no registry is configured
    PackagedOnly,
}

impl PipelineOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineOutcome::AlreadyPresent => "already_present",
            PipelineOutcome::Published => "published",
            PipelineOutcome::PackagedOnly => "packaged_only",
        }
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("packager wrote {}, expected {}", .actual.display(), .expected.display())]
    MisplacedArchive { expected: PathBuf, actual: PathBuf },
}

/// Per-item failure. Never aborts a sweep.
#[derive(Debug, Error)]
#[error(
    "{stage} stage failed for release {release}{}: {source}",
    .artifact.as_ref().map(|a| format!(" ({})", a)).unwrap_or_default()
)]
pub struct PipelineError {
    pub release: ReleaseIdentity,
    /// Unknown when decoding failed
    pub artifact: Option<ArtifactIdentity>,
    pub stage: PipelineStage,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    fn new(
        release: &ReleaseIdentity,
        artifact: Option<&ArtifactIdentity>,
        stage: PipelineStage,
        source: impl Into<StageError>,
    ) -> Self {
        Self {
            release: release.clone(),
            artifact: artifact.cloned(),
            stage,
            source: source.into(),
        }
    }
}

/// One async mutex per artifact identity
#[derive(Default)]
struct IdentityLocks {
    locks: Mutex<HashMap<ArtifactIdentity, Arc<tokio::sync::Mutex<()>>>>,
}

impl IdentityLocks {
    async fn acquire(&self, artifact: &ArtifactIdentity) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // Drop entries nobody holds or waits for
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(artifact.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

pub struct ArtifactPipeline {
    cache: Arc<ExistenceCache>,
    registry: Arc<dyn RegistryClient>,
    packager: Arc<dyn Packager>,
    workspace: Arc<ChartWorkspace>,
    event_bus: Arc<EventBus>,
    locks: IdentityLocks,
}

impl ArtifactPipeline {
    pub fn new(
        cache: Arc<ExistenceCache>,
        registry: Arc<dyn RegistryClient>,
        packager: Arc<dyn Packager>,
        workspace: Arc<ChartWorkspace>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            cache,
            registry,
            packager,
            workspace,
            event_bus,
            locks: IdentityLocks::default(),
        }
    }

    pub fn cache(&self) -> &ExistenceCache {
        &self.cache
    }

    /// Run `record` through every remaining stage.
    pub async fn run(&self, record: &RawReleaseRecord) -> Result<PipelineOutcome, PipelineError> {
        let result = self.advance(record).await;

        match &result {
            Ok(outcome) => {
                metrics::counter!("helm_cache_artifacts_total", "outcome" => outcome.as_str()).increment(1);
            }
            Err(error) => {
                metrics::counter!("helm_cache_item_failures_total", "stage" => error.stage.as_str()).increment(1);
                warn!(
                    release = %error.release,
                    artifact = ?error.artifact.as_ref().map(ToString::to_string),
                    stage = %error.stage,
                    error = %error.source,
                    "Release item failed"
                );
                self.event_bus.publish(CollectorEvent::ItemFailed {
                    release: error.release.clone(),
                    artifact: error.artifact.clone(),
                    stage: error.stage,
                    error: error.source.to_string(),
                    failed_at: Utc::now(),
                });
            }
        }

        result
    }

    async fn advance(&self, record: &RawReleaseRecord) -> Result<PipelineOutcome, PipelineError> {
        let release = &record.identity;
        let decoded = decode_release(&record.encoded_payload)
            .map_err(|e| PipelineError::new(release, None, PipelineStage::Decode, e))?;
        let artifact = decoded.artifact.clone();

        let _guard = self.locks.acquire(&artifact).await;

        if self.cache.contains(&artifact) {
            return Ok(self.already_present(release, &artifact).await);
        }

        let state = self.workspace.probe(&artifact);
        debug!(
            artifact = %artifact,
            source_tree = state.source_tree_materialized,
            package = state.package_built,
            "Local artifact state"
        );

        if !state.package_built {
            if !state.source_tree_materialized {
                self.materialize(release, &decoded).await?;
            }
            self.package(release, &decoded).await?;
        }

        if !self.cache.publishing_enabled() {
            return Ok(PipelineOutcome::PackagedOnly);
        }

        self.publish(release, &artifact).await
    }

    async fn already_present(&self, release: &ReleaseIdentity, artifact: &ArtifactIdentity) -> PipelineOutcome {
        debug!(artifact = %artifact, release = %release, "Artifact already in registry");

        let state = self.workspace.probe(artifact);
        if state.source_tree_materialized || state.package_built {
            info!(artifact = %artifact, "Reclaiming stale local files of published artifact");
            if let Err(e) = self.workspace.reclaim(artifact).await {
                warn!(artifact = %artifact, error = %e, "Failed to reclaim local files");
            }
        }

        self.event_bus.publish(CollectorEvent::ArtifactAlreadyPresent {
            artifact: artifact.clone(),
            release: release.clone(),
            observed_at: Utc::now(),
        });
        PipelineOutcome::AlreadyPresent
    }

    async fn materialize(&self, release: &ReleaseIdentity, decoded: &DecodedRelease) -> Result<(), PipelineError> {
        let artifact = &decoded.artifact;
        let path = self
            .workspace
            .materialize(decoded)
            .await
            .map_err(|e| PipelineError::new(release, Some(artifact), PipelineStage::Materialize, e))?;

        info!(artifact = %artifact, release = %release, path = %path.display(), "Chart source materialized");
        self.event_bus.publish(CollectorEvent::SourceMaterialized {
            artifact: artifact.clone(),
            release: release.clone(),
            materialized_at: Utc::now(),
        });
        Ok(())
    }

    async fn package(&self, release: &ReleaseIdentity, decoded: &DecodedRelease) -> Result<(), PipelineError> {
        let artifact = &decoded.artifact;
        let archive = self
            .packager
            .package(
                &self.workspace.source_path(artifact),
                artifact,
                decoded.dependencies(),
                self.workspace.packaged_directory(),
            )
            .await
            .map_err(|e| PipelineError::new(release, Some(artifact), PipelineStage::Package, e))?;

        // Resume and upload both look for the archive at its workspace path
        let expected = self.workspace.archive_path(artifact);
        if archive != expected {
            return Err(PipelineError::new(
                release,
                Some(artifact),
                PipelineStage::Package,
                StageError::MisplacedArchive {
                    expected,
                    actual: archive,
                },
            ));
        }

        info!(artifact = %artifact, archive = %archive.display(), "Chart packaged");
        self.event_bus.publish(CollectorEvent::ArtifactPackaged {
            artifact: artifact.clone(),
            archive: archive.display().to_string(),
            packaged_at: Utc::now(),
        });
        Ok(())
    }

    async fn publish(&self, release: &ReleaseIdentity, artifact: &ArtifactIdentity) -> Result<PipelineOutcome, PipelineError> {
        let archive = self.workspace.archive_path(artifact);
        match self.registry.upload(&archive, artifact).await {
            Ok(()) => info!(artifact = %artifact, "Chart published"),
            Err(RegistryError::AlreadyExists(_)) => {
                info!(artifact = %artifact, "Registry already holds chart, treating as published")
            }
            Err(e) => return Err(PipelineError::new(release, Some(artifact), PipelineStage::Publish, e)),
        }

        self.cache.mark_present(artifact.clone());
        if let Err(e) = self.workspace.reclaim(artifact).await {
            warn!(artifact = %artifact, error = %e, "Failed to reclaim local files after publish");
        }

        self.event_bus.publish(CollectorEvent::ArtifactPublished {
            artifact: artifact.clone(),
            published_at: Utc::now(),
        });
        Ok(PipelineOutcome::Published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::artifact::{encode_release_document, ChartDependency};
    use crate::domain::packaging::Packager;
    use crate::infrastructure::chart_archive::write_chart_archive;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingRegistry {
        uploads: AtomicUsize,
        fail: AtomicBool,
        conflict: AtomicBool,
    }

    #[async_trait]
    impl RegistryClient for RecordingRegistry {
        fn is_active(&self) -> bool {
            true
        }

        async fn list_all(&self) -> Result<HashSet<ArtifactIdentity>, RegistryError> {
            Ok(HashSet::new())
        }

        async fn upload(&self, archive: &Path, artifact: &ArtifactIdentity) -> Result<(), RegistryError> {
            assert!(archive.is_file(), "upload of missing archive {:?}", archive);
            self.uploads.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RegistryError::Transport("connection reset".into()));
            }
            if self.conflict.load(Ordering::SeqCst) {
                return Err(RegistryError::AlreadyExists(artifact.clone()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct ArchivingPackager {
        calls: AtomicUsize,
        fail: AtomicBool,
        misplace: AtomicBool,
    }

    #[async_trait]
    impl Packager for ArchivingPackager {
        async fn package(
            &self,
            source_tree: &Path,
            artifact: &ArtifactIdentity,
            _dependencies: &[ChartDependency],
            destination: &Path,
        ) -> Result<PathBuf, PackagingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(PackagingError::Dependency {
                    chart: artifact.to_string(),
                    message: "repository unreachable".into(),
                });
            }
            let file_name = if self.misplace.load(Ordering::SeqCst) {
                format!("{}-renamed.tgz", artifact.name)
            } else {
                artifact.archive_file_name()
            };
            write_chart_archive(source_tree, &artifact.name, destination, &file_name)
        }
    }

    struct Harness {
        _dir: TempDir,
        registry: Arc<RecordingRegistry>,
        packager: Arc<ArchivingPackager>,
        workspace: Arc<ChartWorkspace>,
        pipeline: ArtifactPipeline,
    }

    fn harness(cache: ExistenceCache) -> Harness {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(RecordingRegistry::default());
        let packager = Arc::new(ArchivingPackager::default());
        let workspace = Arc::new(ChartWorkspace::new(dir.path().join("raw"), dir.path().join("packaged")));
        let pipeline = ArtifactPipeline::new(
            Arc::new(cache),
            registry.clone(),
            packager.clone(),
            workspace.clone(),
            Arc::new(EventBus::new(64)),
        );
        Harness {
            _dir: dir,
            registry,
            packager,
            workspace,
            pipeline,
        }
    }

    fn record(chart: &str, version: &str) -> RawReleaseRecord {
        let document = serde_json::json!({
            "name": "web",
            "namespace": "prod",
            "version": 1,
            "chart": {
                "metadata": {"apiVersion": "v2", "name": chart, "version": version},
                "values": {},
                "templates": [{"name": "templates/cm.yaml", "data": "a2luZDogQ29uZmlnTWFw"}]
            }
        });
        RawReleaseRecord {
            identity: ReleaseIdentity::new("prod", "web"),
            revision: 1,
            encoded_payload: encode_release_document(&document).unwrap(),
            object_name: "sh.helm.release.v1.web.v1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fresh_artifact_is_published_and_reclaimed() {
        let h = harness(ExistenceCache::from_identities([]));
        let artifact = ArtifactIdentity::new("nginx", "1.0.0");

        let outcome = h.pipeline.run(&record("nginx", "1.0.0")).await.unwrap();

        assert_eq!(outcome, PipelineOutcome::Published);
        assert_eq!(h.registry.uploads.load(Ordering::SeqCst), 1);
        assert!(h.pipeline.cache().contains(&artifact));
        assert_eq!(h.workspace.probe(&artifact), Default::default());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_everything_and_reclaims_scratch() {
        let artifact = ArtifactIdentity::new("nginx", "1.0.0");
        let h = harness(ExistenceCache::from_identities([artifact.clone()]));
        std::fs::create_dir_all(h.workspace.source_path(&artifact)).unwrap();

        let outcome = h.pipeline.run(&record("nginx", "1.0.0")).await.unwrap();

        assert_eq!(outcome, PipelineOutcome::AlreadyPresent);
        assert_eq!(h.packager.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.registry.uploads.load(Ordering::SeqCst), 0);
        assert!(!h.workspace.probe(&artifact).source_tree_materialized);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_package_for_next_sweep() {
        let h = harness(ExistenceCache::from_identities([]));
        let artifact = ArtifactIdentity::new("nginx", "1.0.0");
        h.registry.fail.store(true, Ordering::SeqCst);

        let error = h.pipeline.run(&record("nginx", "1.0.0")).await.unwrap_err();
        assert_eq!(error.stage, PipelineStage::Publish);
        assert_eq!(error.artifact, Some(artifact.clone()));
        assert!(h.workspace.probe(&artifact).package_built);
        assert!(!h.pipeline.cache().contains(&artifact));

        // Next sweep: no re-packaging, just the upload
        h.registry.fail.store(false, Ordering::SeqCst);
        let outcome = h.pipeline.run(&record("nginx", "1.0.0")).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Published);
        assert_eq!(h.packager.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.registry.uploads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_package_failure_keeps_source_tree() {
        let h = harness(ExistenceCache::from_identities([]));
        let artifact = ArtifactIdentity::new("nginx", "1.0.0");
        h.packager.fail.store(true, Ordering::SeqCst);

        let error = h.pipeline.run(&record("nginx", "1.0.0")).await.unwrap_err();
        assert_eq!(error.stage, PipelineStage::Package);
        let state = h.workspace.probe(&artifact);
        assert!(state.source_tree_materialized);
        assert!(!state.package_built);
    }

    #[tokio::test]
    async fn test_archive_outside_workspace_path_fails_packaging() {
        let h = harness(ExistenceCache::from_identities([]));
        let artifact = ArtifactIdentity::new("nginx", "1.0.0");
        h.packager.misplace.store(true, Ordering::SeqCst);

        let error = h.pipeline.run(&record("nginx", "1.0.0")).await.unwrap_err();
        assert_eq!(error.stage, PipelineStage::Package);
        assert!(matches!(
            &error.source,
            StageError::MisplacedArchive { expected, .. } if expected == &h.workspace.archive_path(&artifact)
        ));
        assert_eq!(h.registry.uploads.load(Ordering::SeqCst), 0);
        assert!(!h.pipeline.cache().contains(&artifact));
    }

    #[tokio::test]
    async fn test_conflict_counts_as_published() {
        let h = harness(ExistenceCache::from_identities([]));
        h.registry.conflict.store(true, Ordering::SeqCst);

        let outcome = h.pipeline.run(&record("nginx", "1.0.0")).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Published);
        assert!(h.pipeline.cache().contains(&ArtifactIdentity::new("nginx", "1.0.0")));
    }

    #[tokio::test]
    async fn test_disabled_publishing_packages_only() {
        let h = harness(ExistenceCache::empty());
        let artifact = ArtifactIdentity::new("nginx", "1.0.0");

        let outcome = h.pipeline.run(&record("nginx", "1.0.0")).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::PackagedOnly);
        assert!(h.workspace.probe(&artifact).package_built);
        assert_eq!(h.registry.uploads.load(Ordering::SeqCst), 0);

        // Already packaged: nothing more to do
        h.pipeline.run(&record("nginx", "1.0.0")).await.unwrap();
        assert_eq!(h.packager.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_decode_failure_has_no_artifact() {
        let h = harness(ExistenceCache::from_identities([]));
        let mut bad = record("nginx", "1.0.0");
        bad.encoded_payload = b"!!not base64!!".to_vec();

        let error = h.pipeline.run(&bad).await.unwrap_err();
        assert_eq!(error.stage, PipelineStage::Decode);
        assert!(error.artifact.is_none());
        assert!(matches!(error.source, StageError::Decode(DecodeError::Base64(_))));
    }

    #[tokio::test]
    async fn test_same_identity_runs_are_serialized() {
        let h = Arc::new(harness(ExistenceCache::from_identities([])));
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let h = Arc::clone(&h);
                tokio::spawn(async move { h.pipeline.run(&record("nginx", "1.0.0")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(h.registry.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(h.packager.calls.load(Ordering::SeqCst), 1);
    }
}
