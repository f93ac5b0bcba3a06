// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Existence Cache
//!
//! Answers "is this chart already in the registry?" without a network call per
//! release. The cache is seeded from one full registry listing when it is
//! built and afterwards only grows, as the pipeline publishes artifacts. It
//! is never evicted and never re-synced, so charts deleted from the registry
//! behind the daemon's back stay marked present until the process restarts.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Monotonic set of artifacts known to exist remotely

use crate::domain::artifact::ArtifactIdentity;
use crate::domain::registry::{RegistryClient, RegistryError};
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::info;

#[derive(Debug)]
pub struct ExistenceCache {
    present: RwLock<HashSet<ArtifactIdentity>>,
    publishing_enabled: bool,
}

impl ExistenceCache {
    /// Build the cache from a single registry listing.
    ///
    /// An inactive registry is not contacted; the resulting cache reports
    /// everything absent and disables publishing.
    pub async fn seed(registry: &dyn RegistryClient) -> Result<Self, RegistryError> {
        if !registry.is_active() {
            info!("No chart registry configured, charts will only be packaged locally");
            return Ok(Self::empty());
        }

        let present = registry.list_all().await?;
        info!(artifacts = present.len(), "Seeded existence cache from registry listing");
        Ok(Self {
            present: RwLock::new(present),
            publishing_enabled: true,
        })
    }

    /// Always-absent cache with publishing disabled
    pub fn empty() -> Self {
        Self {
            present: RwLock::new(HashSet::new()),
            publishing_enabled: false,
        }
    }

    /// Publishing-enabled cache pre-filled with `identities`
    pub fn from_identities<I>(identities: I) -> Self
    where
        I: IntoIterator<Item = ArtifactIdentity>,
    {
        Self {
            present: RwLock::new(identities.into_iter().collect()),
            publishing_enabled: true,
        }
    }

    pub fn publishing_enabled(&self) -> bool {
        self.publishing_enabled
    }

    pub fn contains(&self, artifact: &ArtifactIdentity) -> bool {
        self.present.read().contains(artifact)
    }

    /// Record `artifact` as present. Returns false if it already was.
    pub fn mark_present(&self, artifact: ArtifactIdentity) -> bool {
        self.present.write().insert(artifact)
    }

    pub fn len(&self) -> usize {
        self.present.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.present.read().is_empty()
    }
}
