// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod workspace;
pub mod chart_archive;
pub mod helm_packager;
pub mod chartmuseum_client;
pub mod kube_config;
pub mod kubernetes_lister;

pub use chartmuseum_client::ChartMuseumClient;
pub use event_bus::EventBus;
pub use helm_packager::HelmPackager;
pub use kubernetes_lister::KubernetesSecretLister;
pub use workspace::ChartWorkspace;
