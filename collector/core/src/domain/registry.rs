// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Registry Client Trait - Anti-Corruption Layer for the chart registry
//!
//! Isolates the pipeline from the concrete registry API (ChartMuseum in
//! production, in-memory doubles in tests).

use crate::domain::artifact::ArtifactIdentity;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Remote chart registry
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Whether a registry is configured at all. An inactive registry is never
    /// listed and never receives uploads.
    fn is_active(&self) -> bool;

    /// Every artifact currently stored in the registry
    async fn list_all(&self) -> Result<HashSet<ArtifactIdentity>, RegistryError>;

    /// Upload one packaged archive
    async fn upload(&self, archive: &Path, artifact: &ArtifactIdentity) -> Result<(), RegistryError>;
}

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry already holds this name and version
    #[error("artifact {0} already exists in the registry")]
    AlreadyExists(ArtifactIdentity),

    #[error("registry returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("registry request failed: {0}")]
    Transport(String),

    #[error("failed to read archive: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid registry response: {0}")]
    InvalidResponse(String),
}

impl RegistryError {
    /// Transport failures and server-side errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistryError::Transport(_) => true,
            RegistryError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
