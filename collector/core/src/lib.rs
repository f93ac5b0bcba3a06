// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Release reconciliation and chart publishing engine for the helm-cache daemon.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Select current Helm releases, rebuild their charts and publish
//!   each chart version to the registry exactly once

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
