// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! helm-cache CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers, daemon loop and process-wide setup

pub mod commands;
pub mod daemon;
pub mod observability;
pub mod overrides;
