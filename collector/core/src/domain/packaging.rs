// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Packaging Delegate Trait
//!
//! Turns a materialized chart source tree into a distributable archive.
//! Dependency resolution happens behind this seam, so the pipeline never
//! shells out or touches the network itself.

use crate::domain::artifact::{ArtifactIdentity, ChartDependency};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[async_trait]
pub trait Packager: Send + Sync {
    /// Package `source_tree` into `destination` and return the archive path.
    ///
    /// Implementations must not leave a partial archive at the returned path
    /// when they fail.
    async fn package(
        &self,
        source_tree: &Path,
        artifact: &ArtifactIdentity,
        dependencies: &[ChartDependency],
        destination: &Path,
    ) -> Result<PathBuf, PackagingError>;
}

/// Packaging errors
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("chart source tree not found: {0}")]
    SourceMissing(PathBuf),

    #[error("dependency resolution failed for {chart}: {message}")]
    Dependency { chart: String, message: String },

    #[error("command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("failed to write chart archive: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
