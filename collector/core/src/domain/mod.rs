// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Domain types and collaborator contracts.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Release records, chart artifacts and collaborator contracts

pub mod release;
pub mod artifact;
pub mod registry;
pub mod packaging;
pub mod events;
pub mod collector_config;
pub mod path_sanitizer;
