// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Chart Workspace
//!
//! Owns the collector's on-disk scratch area:
//!
//! ```text
//! <home>/data/raw/<name>-<version>/          materialized chart source tree
//! <home>/data/packaged/<name>-<version>.tgz  packaged archive
//! ```
//!
//! The presence of these two paths is the only local state marker. Source
//! trees are assembled in a hidden staging directory and renamed into place,
//! and archives are renamed into place by the packager, so a crash never
//! leaves something that looks complete but is not.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Filesystem layout, materialization and reclamation

use crate::domain::artifact::{ArtifactIdentity, ChartFile, DecodedRelease, LocalArtifactState};
use crate::domain::collector_config::CollectorConfigManifest;
use crate::domain::path_sanitizer::{PathSanitizer, PathSanitizerError};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

const STAGING_PREFIX: &str = ".staging-";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsafe chart file name: {0}")]
    UnsafePath(#[from] PathSanitizerError),

    #[error("failed to render {file}: {message}")]
    Render { file: &'static str, message: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> WorkspaceError + '_ {
    move |source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct ChartWorkspace {
    raw_directory: PathBuf,
    packaged_directory: PathBuf,
    sanitizer: PathSanitizer,
}

impl ChartWorkspace {
    pub fn new(raw_directory: impl Into<PathBuf>, packaged_directory: impl Into<PathBuf>) -> Self {
        Self {
            raw_directory: raw_directory.into(),
            packaged_directory: packaged_directory.into(),
            sanitizer: PathSanitizer::new(),
        }
    }

    pub fn from_config(config: &CollectorConfigManifest) -> Self {
        Self::new(config.raw_directory(), config.packaged_directory())
    }

    /// Create both directories and clear staging leftovers of an earlier crash.
    pub async fn prepare(&self) -> Result<(), WorkspaceError> {
        for dir in [&self.raw_directory, &self.packaged_directory] {
            tokio::fs::create_dir_all(dir).await.map_err(io_error(dir))?;
        }

        let mut entries = tokio::fs::read_dir(&self.raw_directory)
            .await
            .map_err(io_error(&self.raw_directory))?;
        while let Some(entry) = entries.next_entry().await.map_err(io_error(&self.raw_directory))? {
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                let path = entry.path();
                debug!(path = %path.display(), "Removing stale staging directory");
                remove_dir_if_exists(&path).await?;
            }
        }
        Ok(())
    }

    pub fn raw_directory(&self) -> &Path {
        &self.raw_directory
    }

    pub fn packaged_directory(&self) -> &Path {
        &self.packaged_directory
    }

    pub fn source_path(&self, artifact: &ArtifactIdentity) -> PathBuf {
        self.raw_directory.join(artifact.to_string())
    }

    pub fn archive_path(&self, artifact: &ArtifactIdentity) -> PathBuf {
        self.packaged_directory.join(artifact.archive_file_name())
    }

    /// Current local state of `artifact`, read from disk on every call
    pub fn probe(&self, artifact: &ArtifactIdentity) -> LocalArtifactState {
        LocalArtifactState {
            source_tree_materialized: self.source_path(artifact).is_dir(),
            package_built: self.archive_path(artifact).is_file(),
        }
    }

    /// Write the chart source tree of `decoded` and return its path.
    pub async fn materialize(&self, decoded: &DecodedRelease) -> Result<PathBuf, WorkspaceError> {
        let target = self.source_path(&decoded.artifact);
        let staging = self
            .raw_directory
            .join(format!("{}{}-{}", STAGING_PREFIX, decoded.artifact, Uuid::new_v4().simple()));

        if let Err(e) = self.write_tree(&staging, decoded).await {
            if let Err(cleanup) = remove_dir_if_exists(&staging).await {
                warn!(error = %cleanup, "Failed to remove staging directory");
            }
            return Err(e);
        }

        remove_dir_if_exists(&target).await?;
        tokio::fs::rename(&staging, &target).await.map_err(io_error(&target))?;
        Ok(target)
    }

    async fn write_tree(&self, root: &Path, decoded: &DecodedRelease) -> Result<(), WorkspaceError> {
        tokio::fs::create_dir_all(root).await.map_err(io_error(root))?;

        for file in &decoded.files {
            let relative = self.sanitizer.relative(&file.name)?;
            write_file(&root.join(relative), &file.data).await?;
        }

        for template in &decoded.templates {
            write_file(&root.join(self.template_path(template)?), &template.data).await?;
        }

        if let Some(schema) = &decoded.schema {
            write_file(&root.join("values.schema.json"), schema).await?;
        }

        let values = serde_yaml::to_string(&decoded.values).map_err(|e| WorkspaceError::Render {
            file: "values.yaml",
            message: e.to_string(),
        })?;
        write_file(&root.join("values.yaml"), values.as_bytes()).await?;

        let chart = serde_yaml::to_string(&decoded.metadata).map_err(|e| WorkspaceError::Render {
            file: "Chart.yaml",
            message: e.to_string(),
        })?;
        write_file(&root.join("Chart.yaml"), chart.as_bytes()).await?;

        Ok(())
    }

    /// Templates are stored as `templates/<file>`; bare names get the prefix.
    fn template_path(&self, template: &ChartFile) -> Result<PathBuf, WorkspaceError> {
        let relative = self.sanitizer.relative(&template.name)?;
        let under_templates = matches!(
            relative.components().next(),
            Some(Component::Normal(first)) if first == "templates"
        );
        Ok(if under_templates {
            relative
        } else {
            Path::new("templates").join(relative)
        })
    }

    /// Delete the source tree and archive of `artifact`. Missing paths are fine.
    pub async fn reclaim(&self, artifact: &ArtifactIdentity) -> Result<(), WorkspaceError> {
        remove_dir_if_exists(&self.source_path(artifact)).await?;

        let archive = self.archive_path(artifact);
        match tokio::fs::remove_file(&archive).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&archive)(e)),
        }
    }
}

async fn write_file(path: &Path, data: &[u8]) -> Result<(), WorkspaceError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }
    tokio::fs::write(path, data).await.map_err(io_error(path))
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), WorkspaceError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(path)(e)),
    }
}
