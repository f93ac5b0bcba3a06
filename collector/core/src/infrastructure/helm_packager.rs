// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Helm Packager
//!
//! [`Packager`] implementation that leans on the `helm` CLI only for what it
//! is needed for, fetching sub-chart dependencies into `charts/`, and builds
//! the archive itself through [`write_chart_archive`]. Charts without
//! dependencies never spawn a process.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Dependency resolution and chart packaging

use crate::domain::artifact::{ArtifactIdentity, ChartDependency};
use crate::domain::collector_config::HelmConfig;
use crate::domain::packaging::{Packager, PackagingError};
use crate::infrastructure::chart_archive::write_chart_archive;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

pub struct HelmPackager {
    binary: String,
    command_timeout: Duration,
}

impl HelmPackager {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn from_config(config: &HelmConfig) -> Self {
        Self::new(config.binary.clone())
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    async fn helm(&self, args: &[&str]) -> Result<(), PackagingError> {
        let command_line = format!("{} {}", self.binary, args.join(" "));
        debug!(command = %command_line, "Running helm");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);

        match tokio::time::timeout(self.command_timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(PackagingError::Command {
                command: command_line,
                message: format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }),
            Ok(Err(e)) => Err(PackagingError::Command {
                command: command_line,
                message: e.to_string(),
            }),
            Err(_) => Err(PackagingError::Command {
                command: command_line,
                message: format!("timed out after {:?}", self.command_timeout),
            }),
        }
    }

    /// Register every http(s) repository and fetch dependencies into `charts/`.
    async fn resolve_dependencies(
        &self,
        source_tree: &Path,
        artifact: &ArtifactIdentity,
        dependencies: &[ChartDependency],
    ) -> Result<(), PackagingError> {
        let repositories = remote_repositories(dependencies);

        for (alias, url) in &repositories {
            info!(chart = %artifact, repository = %url, "Adding chart repository");
            self.helm(&["repo", "add", "--force-update", alias.as_str(), *url]).await?;
        }
        if !repositories.is_empty() {
            let mut args = vec!["repo", "update"];
            args.extend(repositories.iter().map(|(alias, _)| alias.as_str()));
            self.helm(&args).await?;
        }

        let chart_dir = source_tree.to_string_lossy().into_owned();
        if let Err(build_error) = self.helm(&["dependency", "build", chart_dir.as_str()]).await {
            warn!(chart = %artifact, error = %build_error, "helm dependency build failed, trying update");
            self.helm(&["dependency", "update", chart_dir.as_str()])
                .await
                .map_err(|e| PackagingError::Dependency {
                    chart: artifact.to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }
}

/// One `(alias, url)` pair per distinct http(s) repository. Aliases derived
/// from the same dependency name get a numeric suffix.
fn remote_repositories(dependencies: &[ChartDependency]) -> Vec<(String, &str)> {
    let mut repositories: Vec<(String, &str)> = Vec::new();
    for dependency in dependencies {
        let url = dependency.repository.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            continue;
        }
        if repositories.iter().any(|(_, known)| *known == url) {
            continue;
        }

        let base = repository_alias(&dependency.name);
        let mut alias = base.clone();
        let mut suffix = 2;
        while repositories.iter().any(|(taken, _)| *taken == alias) {
            alias = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        repositories.push((alias, url));
    }
    repositories
}

fn repository_alias(dependency_name: &str) -> String {
    let cleaned: String = dependency_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    format!("helm-cache-{}", cleaned)
}

#[async_trait]
impl Packager for HelmPackager {
    async fn package(
        &self,
        source_tree: &Path,
        artifact: &ArtifactIdentity,
        dependencies: &[ChartDependency],
        destination: &Path,
    ) -> Result<PathBuf, PackagingError> {
        if !source_tree.is_dir() {
            return Err(PackagingError::SourceMissing(source_tree.to_path_buf()));
        }

        if !dependencies.is_empty() {
            self.resolve_dependencies(source_tree, artifact, dependencies).await?;
        }

        let source = source_tree.to_path_buf();
        let chart_name = artifact.name.clone();
        let destination = destination.to_path_buf();
        let file_name = artifact.archive_file_name();
        tokio::task::spawn_blocking(move || write_chart_archive(&source, &chart_name, &destination, &file_name))
            .await
            .map_err(|e| PackagingError::Archive(format!("archive task failed: {}", e)))?
    }
}
