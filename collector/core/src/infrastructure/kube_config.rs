// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Cluster connection settings
//
// Resolves how to reach the Kubernetes API server, either from the pod's
// service account or from the current context of a kubeconfig file.

use crate::domain::collector_config::ClusterConfig;
use crate::domain::release::ListError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Credentials presented to the API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterAuth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
    /// PEM client certificate followed by its private key
    ClientCertificate(Vec<u8>),
}

/// Everything needed to talk to one API server
#[derive(Debug, Clone)]
pub struct ClusterConnection {
    pub server: String,
    pub auth: ClusterAuth,
    /// PEM bundle of the cluster CA
    pub ca_pem: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
    /// Namespace of the context or service account
    pub default_namespace: Option<String>,
}

impl ClusterConnection {
    pub fn from_config(config: &ClusterConfig) -> Result<Self, ListError> {
        if config.in_cluster {
            let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
                ListError::Configuration("KUBERNETES_SERVICE_HOST is not set; not running in a pod?".to_string())
            })?;
            let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
            return Self::in_cluster(&host, &port, Path::new(SERVICE_ACCOUNT_DIR));
        }

        let path = resolve_kubeconfig_path(config.kubeconfig_path.as_deref())?;
        Self::from_kubeconfig(&path)
    }

    /// Service-account connection; `account_dir` holds `token`, `ca.crt` and `namespace`.
    pub fn in_cluster(host: &str, port: &str, account_dir: &Path) -> Result<Self, ListError> {
        let token = read_trimmed(&account_dir.join("token"))?;
        let ca_path = account_dir.join("ca.crt");
        let ca_pem = if ca_path.exists() {
            Some(read(&ca_path)?)
        } else {
            None
        };
        let default_namespace = read_trimmed(&account_dir.join("namespace")).ok();

        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };

        Ok(Self {
            server: format!("https://{}:{}", host, port),
            auth: ClusterAuth::Bearer(token),
            ca_pem,
            insecure_skip_tls_verify: false,
            default_namespace,
        })
    }

    /// Connection of the current context of a kubeconfig file
    pub fn from_kubeconfig(path: &Path) -> Result<Self, ListError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ListError::Configuration(format!("cannot read kubeconfig {:?}: {}", path, e)))?;
        let kubeconfig: Kubeconfig = serde_yaml::from_str(&content)
            .map_err(|e| ListError::Configuration(format!("invalid kubeconfig {:?}: {}", path, e)))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        kubeconfig.current_connection(base_dir)
    }
}

/// Explicit path, then the first entry of $KUBECONFIG, then ~/.kube/config
pub fn resolve_kubeconfig_path(explicit: Option<&Path>) -> Result<PathBuf, ListError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(value) = std::env::var("KUBECONFIG") {
        if let Some(first) = std::env::split_paths(&value).find(|p| !p.as_os_str().is_empty()) {
            return Ok(first);
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".kube").join("config"))
        .ok_or_else(|| ListError::Configuration("no kubeconfig path and no home directory".to_string()))
}

fn read(path: &Path) -> Result<Vec<u8>, ListError> {
    std::fs::read(path).map_err(|e| ListError::Configuration(format!("cannot read {:?}: {}", path, e)))
}

fn read_trimmed(path: &Path) -> Result<String, ListError> {
    let bytes = read(path)?;
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

fn decode_data(field: &str, value: &str) -> Result<Vec<u8>, ListError> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| ListError::Configuration(format!("kubeconfig {} is not valid base64: {}", field, e)))
}

// ============================================================================
// Kubeconfig schema (the subset we read)
// ============================================================================

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(rename = "current-context", default)]
    current_context: String,

    #[serde(default)]
    clusters: Vec<Named<KubeCluster>>,

    #[serde(default)]
    contexts: Vec<Named<KubeContext>>,

    #[serde(default)]
    users: Vec<Named<KubeUser>>,
}

#[derive(Debug, Deserialize)]
struct Named<T> {
    name: String,
    #[serde(alias = "cluster", alias = "context", alias = "user")]
    value: T,
}

#[derive(Debug, Deserialize)]
struct KubeCluster {
    server: String,

    #[serde(rename = "certificate-authority", default)]
    certificate_authority: Option<PathBuf>,

    #[serde(rename = "certificate-authority-data", default)]
    certificate_authority_data: Option<String>,

    #[serde(rename = "insecure-skip-tls-verify", default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct KubeContext {
    cluster: String,

    #[serde(default)]
    user: String,

    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KubeUser {
    #[serde(default)]
    token: Option<String>,

    #[serde(rename = "tokenFile", default)]
    token_file: Option<PathBuf>,

    #[serde(default)]
    username: Option<String>,

    #[serde(default)]
    password: Option<String>,

    #[serde(rename = "client-certificate", default)]
    client_certificate: Option<PathBuf>,

    #[serde(rename = "client-certificate-data", default)]
    client_certificate_data: Option<String>,

    #[serde(rename = "client-key", default)]
    client_key: Option<PathBuf>,

    #[serde(rename = "client-key-data", default)]
    client_key_data: Option<String>,
}

impl Kubeconfig {
    fn current_connection(&self, base_dir: &Path) -> Result<ClusterConnection, ListError> {
        let resolve = |path: &Path| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            }
        };

        let context = self
            .contexts
            .iter()
            .find(|c| c.name == self.current_context)
            .map(|c| &c.value)
            .ok_or_else(|| {
                ListError::Configuration(format!("current context '{}' not found in kubeconfig", self.current_context))
            })?;
        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.value)
            .ok_or_else(|| ListError::Configuration(format!("cluster '{}' not found in kubeconfig", context.cluster)))?;
        let default_user = KubeUser::default();
        let user = self
            .users
            .iter()
            .find(|u| u.name == context.user)
            .map(|u| &u.value)
            .unwrap_or(&default_user);

        let ca_pem = match (&cluster.certificate_authority_data, &cluster.certificate_authority) {
            (Some(data), _) => Some(decode_data("certificate-authority-data", data)?),
            (None, Some(path)) => Some(read(&resolve(path))?),
            (None, None) => None,
        };

        let auth = if let Some(token) = user.token.as_ref().filter(|t| !t.is_empty()) {
            ClusterAuth::Bearer(token.clone())
        } else if let Some(path) = &user.token_file {
            ClusterAuth::Bearer(read_trimmed(&resolve(path))?)
        } else if let (Some(username), Some(password)) = (&user.username, &user.password) {
            ClusterAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            }
        } else {
            let certificate = match (&user.client_certificate_data, &user.client_certificate) {
                (Some(data), _) => Some(decode_data("client-certificate-data", data)?),
                (None, Some(path)) => Some(read(&resolve(path))?),
                (None, None) => None,
            };
            let key = match (&user.client_key_data, &user.client_key) {
                (Some(data), _) => Some(decode_data("client-key-data", data)?),
                (None, Some(path)) => Some(read(&resolve(path))?),
                (None, None) => None,
            };
            match (certificate, key) {
                (Some(mut pem), Some(key)) => {
                    pem.push(b'\n');
                    pem.extend_from_slice(&key);
                    ClusterAuth::ClientCertificate(pem)
                }
                _ => ClusterAuth::None,
            }
        };

        Ok(ClusterConnection {
            server: cluster.server.trim_end_matches('/').to_string(),
            auth,
            ca_pem,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
            default_namespace: context.namespace.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: prod
clusters:
  - name: prod-cluster
    cluster:
      server: https://k8s.example.com:6443/
      certificate-authority: certs/ca.crt
  - name: dev-cluster
    cluster:
      server: https://dev.example.com
      insecure-skip-tls-verify: true
contexts:
  - name: prod
    context:
      cluster: prod-cluster
      user: deployer
      namespace: apps
  - name: dev
    context:
      cluster: dev-cluster
      user: dev-user
users:
  - name: deployer
    user:
      tokenFile: token
  - name: dev-user
    user:
      token: dev-token
"#;

    #[test]
    fn test_kubeconfig_current_context() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("certs")).unwrap();
        std::fs::write(dir.path().join("certs/ca.crt"), "-----BEGIN CERTIFICATE-----\n").unwrap();
        std::fs::write(dir.path().join("token"), "prod-token\n").unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, KUBECONFIG).unwrap();

        let connection = ClusterConnection::from_kubeconfig(&path).unwrap();
        assert_eq!(connection.server, "https://k8s.example.com:6443");
        assert_eq!(connection.auth, ClusterAuth::Bearer("prod-token".to_string()));
        assert!(connection.ca_pem.is_some());
        assert!(!connection.insecure_skip_tls_verify);
        assert_eq!(connection.default_namespace.as_deref(), Some("apps"));
    }

    #[test]
    fn test_kubeconfig_missing_context() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, KUBECONFIG.replace("current-context: prod", "current-context: nope")).unwrap();
        assert!(matches!(
            ClusterConnection::from_kubeconfig(&path),
            Err(ListError::Configuration(_))
        ));
    }

    #[test]
    fn test_kubeconfig_inline_token_and_insecure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, KUBECONFIG.replace("current-context: prod", "current-context: dev")).unwrap();

        let connection = ClusterConnection::from_kubeconfig(&path).unwrap();
        assert_eq!(connection.auth, ClusterAuth::Bearer("dev-token".to_string()));
        assert!(connection.insecure_skip_tls_verify);
        assert!(connection.default_namespace.is_none());
    }

    #[test]
    fn test_in_cluster_service_account() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("token"), "sa-token").unwrap();
        std::fs::write(dir.path().join("ca.crt"), "ca").unwrap();
        std::fs::write(dir.path().join("namespace"), "helm-cache\n").unwrap();

        let connection = ClusterConnection::in_cluster("10.0.0.1", "443", dir.path()).unwrap();
        assert_eq!(connection.server, "https://10.0.0.1:443");
        assert_eq!(connection.auth, ClusterAuth::Bearer("sa-token".to_string()));
        assert_eq!(connection.default_namespace.as_deref(), Some("helm-cache"));

        let connection = ClusterConnection::in_cluster("fd00::1", "443", dir.path()).unwrap();
        assert_eq!(connection.server, "https://[fd00::1]:443");
    }

    #[test]
    fn test_in_cluster_without_token_fails() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ClusterConnection::in_cluster("10.0.0.1", "443", dir.path()),
            Err(ListError::Configuration(_))
        ));
    }

    #[test]
    fn test_explicit_kubeconfig_path_wins() {
        let path = resolve_kubeconfig_path(Some(Path::new("/tmp/kc"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/kc"));
    }
}
