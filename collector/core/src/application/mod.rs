// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod existence_cache;
pub mod artifact_pipeline;
pub mod sweep;

pub use artifact_pipeline::{ArtifactPipeline, PipelineError, PipelineOutcome};
pub use existence_cache::ExistenceCache;
pub use sweep::{SweepError, SweepOrchestrator};
