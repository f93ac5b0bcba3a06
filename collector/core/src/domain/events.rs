// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::artifact::ArtifactIdentity;
use crate::domain::release::ReleaseIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SweepId(pub Uuid);

impl SweepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SweepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SweepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline stage an item was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Decode,
    Materialize,
    Package,
    Publish,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Decode => "decode",
            PipelineStage::Materialize => "materialize",
            PipelineStage::Package => "package",
            PipelineStage::Publish => "publish",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts reported at the end of one sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub sweep_id: SweepId,
    /// Releases that survived revision selection
    pub selected: usize,
    pub anomalies: usize,
    pub already_present: usize,
    pub published: usize,
    /// Packaged locally while no registry is configured
    pub packaged_only: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl SweepSummary {
    pub fn new(sweep_id: SweepId) -> Self {
        Self {
            sweep_id,
            selected: 0,
            anomalies: 0,
            already_present: 0,
            published: 0,
            packaged_only: 0,
            failed: 0,
            duration: Duration::ZERO,
        }
    }
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "selected={} published={} already_present={} packaged_only={} failed={} anomalies={} duration={}ms",
            self.selected,
            self.published,
            self.already_present,
            self.packaged_only,
            self.failed,
            self.anomalies,
            self.duration.as_millis()
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CollectorEvent {
    SweepStarted {
        sweep_id: SweepId,
        started_at: DateTime<Utc>,
    },
    RecordSkipped {
        sweep_id: SweepId,
        object_name: Option<String>,
        reason: String,
        skipped_at: DateTime<Utc>,
    },
    ArtifactAlreadyPresent {
        artifact: ArtifactIdentity,
        release: ReleaseIdentity,
        observed_at: DateTime<Utc>,
    },
    SourceMaterialized {
        artifact: ArtifactIdentity,
        release: ReleaseIdentity,
        materialized_at: DateTime<Utc>,
    },
    ArtifactPackaged {
        artifact: ArtifactIdentity,
        archive: String,
        packaged_at: DateTime<Utc>,
    },
    ArtifactPublished {
        artifact: ArtifactIdentity,
        published_at: DateTime<Utc>,
    },
    ItemFailed {
        release: ReleaseIdentity,
        artifact: Option<ArtifactIdentity>,
        stage: PipelineStage,
        error: String,
        failed_at: DateTime<Utc>,
    },
    SweepCompleted {
        summary: SweepSummary,
        completed_at: DateTime<Utc>,
    },
}

impl CollectorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CollectorEvent::SweepStarted { .. } => "sweep_started",
            CollectorEvent::RecordSkipped { .. } => "record_skipped",
            CollectorEvent::ArtifactAlreadyPresent { .. } => "artifact_already_present",
            CollectorEvent::SourceMaterialized { .. } => "source_materialized",
            CollectorEvent::ArtifactPackaged { .. } => "artifact_packaged",
            CollectorEvent::ArtifactPublished { .. } => "artifact_published",
            CollectorEvent::ItemFailed { .. } => "item_failed",
            CollectorEvent::SweepCompleted { .. } => "sweep_completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = CollectorEvent::ItemFailed {
            release: ReleaseIdentity::new("prod", "web"),
            artifact: Some(ArtifactIdentity::new("nginx", "1.0.0")),
            stage: PipelineStage::Package,
            error: "boom".to_string(),
            failed_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "item_failed");
        assert_eq!(json["stage"], "package");
        assert_eq!(event.name(), "item_failed");
    }
}
