// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command-line overrides for the collector configuration
//!
//! Precedence, highest first: flags, environment variables, configuration
//! file, built-in defaults. Every flag carries an `env` fallback so the same
//! settings work from a container spec.

use clap::Args;
use helm_cache_core::domain::collector_config::CollectorConfigManifest;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Working directory for chart trees and archives
    #[arg(short = 'd', long, global = true, env = "HELM_CACHE_HOME", value_name = "DIR")]
    pub home_directory: Option<PathBuf>,

    /// ChartMuseum base URL (publishing is disabled without one)
    #[arg(short = 'c', long, global = true, env = "CHARTMUSEUM_URL", value_name = "URL")]
    pub chartmuseum_url: Option<String>,

    #[arg(short = 'u', long, global = true, env = "CHARTMUSEUM_USERNAME")]
    pub chartmuseum_username: Option<String>,

    #[arg(
        short = 'p',
        long,
        global = true,
        env = "CHARTMUSEUM_PASSWORD",
        hide_env_values = true
    )]
    pub chartmuseum_password: Option<String>,

    /// Pause between sweeps, e.g. "10s" or "5m"
    #[arg(
        short = 's',
        long,
        global = true,
        env = "HELM_CACHE_SCANNING_INTERVAL",
        value_parser = humantime::parse_duration,
        value_name = "DURATION"
    )]
    pub scanning_interval: Option<Duration>,

    /// Use the pod service account instead of a kubeconfig
    #[arg(short = 'i', long, global = true, env = "HELM_CACHE_IN_CLUSTER")]
    pub in_cluster: bool,

    #[arg(short = 'k', long, global = true, env = "HELM_CACHE_KUBECONFIG", value_name = "FILE")]
    pub kubeconfig_path: Option<PathBuf>,

    /// Restrict listing to one namespace (default: all namespaces)
    #[arg(short = 'n', long, global = true, env = "HELM_CACHE_NAMESPACE")]
    pub namespace: Option<String>,

    /// Path to the helm binary
    #[arg(long, global = true, env = "HELM_CACHE_HELM_BINARY", value_name = "PATH")]
    pub helm_binary: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut CollectorConfigManifest) {
        let spec = &mut config.spec;

        if let Some(home) = &self.home_directory {
            spec.home_directory = home.clone();
        }
        if let Some(url) = &self.chartmuseum_url {
            spec.registry.url = url.clone();
        }
        if let Some(username) = &self.chartmuseum_username {
            spec.registry.username = Some(username.clone());
        }
        if let Some(password) = &self.chartmuseum_password {
            spec.registry.password = Some(password.clone());
        }
        if let Some(interval) = self.scanning_interval {
            spec.scanning_interval = interval;
        }
        if self.in_cluster {
            spec.cluster.in_cluster = true;
        }
        if let Some(path) = &self.kubeconfig_path {
            spec.cluster.kubeconfig_path = Some(path.clone());
        }
        if let Some(namespace) = &self.namespace {
            spec.cluster.namespace = namespace.clone();
        }
        if let Some(binary) = &self.helm_binary {
            spec.helm.binary = binary.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_overrides_keep_file_values() {
        let mut config = CollectorConfigManifest::default();
        config.spec.registry.url = "http://museum:8080".to_string();
        config.spec.scanning_interval = Duration::from_secs(30);

        ConfigOverrides::default().apply(&mut config);

        assert_eq!(config.spec.registry.url, "http://museum:8080");
        assert_eq!(config.spec.scanning_interval, Duration::from_secs(30));
        assert!(!config.spec.cluster.in_cluster);
    }

    #[test]
    fn test_flags_win_over_file_values() {
        let mut config = CollectorConfigManifest::default();
        config.spec.registry.url = "http://file-museum".to_string();

        let overrides = ConfigOverrides {
            home_directory: Some(PathBuf::from("/var/lib/helm-cache")),
            chartmuseum_url: Some("http://flag-museum".to_string()),
            chartmuseum_username: Some("admin".to_string()),
            chartmuseum_password: Some("secret".to_string()),
            scanning_interval: Some(Duration::from_secs(120)),
            in_cluster: true,
            namespace: Some("apps".to_string()),
            ..ConfigOverrides::default()
        };
        overrides.apply(&mut config);

        assert_eq!(config.spec.home_directory, PathBuf::from("/var/lib/helm-cache"));
        assert_eq!(config.spec.registry.url, "http://flag-museum");
        assert_eq!(config.spec.registry.credentials(), Some(("admin", "secret")));
        assert_eq!(config.spec.scanning_interval, Duration::from_secs(120));
        assert!(config.spec.cluster.in_cluster);
        assert_eq!(config.spec.cluster.namespace, "apps");
        assert_eq!(config.raw_directory(), PathBuf::from("/var/lib/helm-cache/data/raw"));
    }
}
