// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the helm-cache CLI

pub mod config;
pub mod sweep;

pub use self::config::ConfigCommand;
