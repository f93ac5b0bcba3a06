// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Collector Configuration Types
//
// Defines the configuration schema of the helm-cache collector:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Local working directory and scanning interval
// - Chart registry endpoint, credentials and retry policy
// - Cluster access and helm binary
// - Logging and metrics settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const API_VERSION: &str = "helm-cache/v1";
pub const KIND: &str = "CollectorConfig";

/// Environment variable that points at an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "HELM_CACHE_CONFIG_PATH";

/// Top-level Kubernetes-style collector configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfigManifest {
    /// API version (must be "helm-cache/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "CollectorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: CollectorConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Collector configuration specification (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfigSpec {
    /// Working directory; chart trees land in `data/raw`, archives in `data/packaged`
    #[serde(default = "default_home_directory")]
    pub home_directory: PathBuf,

    /// Pause between two sweeps (e.g. "10s", "2m")
    #[serde(default = "default_scanning_interval", with = "humantime_serde")]
    pub scanning_interval: Duration,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub helm: HelmConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// ChartMuseum base URL. Empty disables publishing.
    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_registry_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay of the exponential backoff between attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl RegistryConfig {
    pub fn is_active(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Credentials, only when both halves are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: None,
            password: None,
            timeout: default_registry_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Use the pod service account instead of a kubeconfig
    #[serde(default)]
    pub in_cluster: bool,

    /// Kubeconfig to read (defaults to $KUBECONFIG, then ~/.kube/config)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_path: Option<PathBuf>,

    /// Restrict listing to one namespace. Empty lists all namespaces.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelmConfig {
    /// helm executable used for dependency resolution
    #[serde(default = "default_helm_binary")]
    pub binary: String,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            binary: default_helm_binary(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("text" or "json")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Expose a Prometheus endpoint
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid apiVersion '{0}', must be '{API_VERSION}'")]
    ApiVersion(String),

    #[error("invalid kind '{0}', must be '{KIND}'")]
    Kind(String),

    #[error("metadata.name cannot be empty")]
    MissingName,

    #[error("spec.registry.url '{url}' is invalid: {reason}")]
    RegistryUrl { url: String, reason: String },

    #[error("spec.registry.username and spec.registry.password must be set together")]
    PartialCredentials,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("spec.helm.binary cannot be empty")]
    MissingHelmBinary,

    #[error("unsupported log format '{0}', expected 'text' or 'json'")]
    LogFormat(String),
}

// Default value functions
fn default_home_directory() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".helm-cache"))
        .unwrap_or_else(|| PathBuf::from(".helm-cache"))
}

fn default_scanning_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_registry_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    500
}

fn default_helm_binary() -> String {
    "helm".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for CollectorConfigSpec {
    fn default() -> Self {
        Self {
            home_directory: default_home_directory(),
            scanning_interval: default_scanning_interval(),
            registry: RegistryConfig::default(),
            cluster: ClusterConfig::default(),
            helm: HelmConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for CollectorConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "helm-cache".to_string(),
                labels: None,
            },
            spec: CollectorConfigSpec::default(),
        }
    }
}

impl CollectorConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Directory holding materialized chart source trees
    pub fn raw_directory(&self) -> PathBuf {
        self.spec.home_directory.join("data").join("raw")
    }

    /// Directory holding packaged chart archives
    pub fn packaged_directory(&self) -> PathBuf {
        self.spec.home_directory.join("data").join("packaged")
    }

    /// Discover a configuration file using precedence order
    /// 1. HELM_CACHE_CONFIG_PATH environment variable
    /// 2. ./helm-cache.yaml (working directory)
    /// 3. <home>/config.yaml ($HELM_CACHE_HOME or ~/.helm-cache)
    /// 4. /etc/helm-cache/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./helm-cache.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        let home = std::env::var("HELM_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home_directory());
        let user_config = home.join("config.yaml");
        if user_config.exists() {
            return Some(user_config);
        }

        let system_config = PathBuf::from("/etc/helm-cache/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(&config_path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", config_path, e))?
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CHARTMUSEUM_URL") {
            tracing::info!("Environment override: CHARTMUSEUM_URL={}", url);
            self.spec.registry.url = url;
        }
        if let Some(username) = lookup("CHARTMUSEUM_USERNAME") {
            tracing::info!("Environment override: CHARTMUSEUM_USERNAME");
            self.spec.registry.username = Some(username);
        }
        if let Some(password) = lookup("CHARTMUSEUM_PASSWORD") {
            tracing::info!("Environment override: CHARTMUSEUM_PASSWORD");
            self.spec.registry.password = Some(password);
        }
        if let Some(home) = lookup("HELM_CACHE_HOME") {
            tracing::info!("Environment override: HELM_CACHE_HOME={}", home);
            self.spec.home_directory = PathBuf::from(home);
        }
        if let Some(value) = lookup("HELM_CACHE_SCANNING_INTERVAL") {
            match humantime::parse_duration(&value) {
                Ok(interval) => {
                    tracing::info!("Environment override: HELM_CACHE_SCANNING_INTERVAL={}", value);
                    self.spec.scanning_interval = interval;
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid value for HELM_CACHE_SCANNING_INTERVAL: '{}' ({}). Ignoring.",
                        value,
                        e
                    );
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::ApiVersion(self.api_version.clone()));
        }
        if self.kind != KIND {
            return Err(ConfigError::Kind(self.kind.clone()));
        }
        if self.metadata.name.is_empty() {
            return Err(ConfigError::MissingName);
        }
        if self.spec.scanning_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("spec.scanning_interval"));
        }

        let registry = &self.spec.registry;
        if registry.is_active() {
            let parsed = url::Url::parse(registry.url.trim()).map_err(|e| ConfigError::RegistryUrl {
                url: registry.url.clone(),
                reason: e.to_string(),
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::RegistryUrl {
                    url: registry.url.clone(),
                    reason: format!("unsupported scheme '{}'", parsed.scheme()),
                });
            }
            if registry.timeout.is_zero() {
                return Err(ConfigError::ZeroDuration("spec.registry.timeout"));
            }
        }
        let has_user = registry.username.as_deref().is_some_and(|u| !u.is_empty());
        let has_pass = registry.password.as_deref().is_some_and(|p| !p.is_empty());
        if has_user != has_pass {
            return Err(ConfigError::PartialCredentials);
        }

        if self.spec.helm.binary.trim().is_empty() {
            return Err(ConfigError::MissingHelmBinary);
        }

        let format = self.spec.observability.logging.format.as_str();
        if format != "text" && format != "json" {
            return Err(ConfigError::LogFormat(format.to_string()));
        }

        Ok(())
    }
}
