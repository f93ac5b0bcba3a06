// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! ChartMuseum Registry Client
//!
//! [`RegistryClient`] implementation for the ChartMuseum HTTP API.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** List and upload chart archives
//! - **Integration:** Artifact pipeline → ChartMuseum `/api/charts`
//!
//! # Usage
//!
//! ```ignore
//! let client = ChartMuseumClient::from_config(&manifest.spec.registry)?;
//! let present = client.list_all().await?;
//! client.upload(&archive, &artifact).await?;
//! ```

use crate::domain::artifact::ArtifactIdentity;
use crate::domain::collector_config::RegistryConfig;
use crate::domain::registry::{RegistryClient, RegistryError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const CHARTS_PATH: &str = "/api/charts";
const MAX_BACKOFF: Duration = Duration::from_secs(30);

// ============================================================================
// Wire Models
// ============================================================================

/// One entry of the `GET /api/charts` index
#[derive(Debug, Deserialize)]
struct ChartVersionEntry {
    #[serde(default)]
    name: Option<String>,
    version: String,
}

// ============================================================================
// Client Implementation
// ============================================================================

pub struct ChartMuseumClient {
    /// Base URL without trailing slash; empty when no registry is configured
    base_url: String,

    client: Client,

    credentials: Option<(String, String)>,

    max_retries: u32,

    retry_delay_ms: u64,
}

impl ChartMuseumClient {
    pub fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("helm-cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            client,
            credentials: config
                .credentials()
                .map(|(user, pass)| (user.to_string(), pass.to_string())),
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    fn charts_url(&self) -> String {
        format!("{}{}", self.base_url, CHARTS_PATH)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }

    /// Send the request built by `build`, retrying transport errors and
    /// retryable statuses with exponential backoff.
    async fn send_with_retry<F>(&self, operation: &str, build: F) -> Result<Response, RegistryError>
    where
        F: Fn() -> Result<RequestBuilder, RegistryError>,
    {
        let mut attempt: u32 = 0;
        loop {
            let error = match build()?.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => status_error(response).await,
                Err(e) => RegistryError::Transport(e.to_string()),
            };
            if !error.is_retryable() || attempt >= self.max_retries {
                return Err(error);
            }

            attempt += 1;
            let delay = self.backoff(attempt);
            warn!(
                "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                operation,
                attempt,
                self.max_retries + 1,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.retry_delay_ms.saturating_mul(factor)).min(MAX_BACKOFF)
    }
}

async fn status_error(response: Response) -> RegistryError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    RegistryError::Status {
        status,
        body: body.trim().to_string(),
    }
}

#[async_trait]
impl RegistryClient for ChartMuseumClient {
    fn is_active(&self) -> bool {
        !self.base_url.is_empty()
    }

    async fn list_all(&self) -> Result<HashSet<ArtifactIdentity>, RegistryError> {
        let url = self.charts_url();
        debug!(url = %url, "Listing registry charts");

        let response = self
            .send_with_retry("Chart listing", || Ok(self.authorize(self.client.get(&url))))
            .await?;
        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        let index: HashMap<String, Vec<ChartVersionEntry>> = serde_json::from_str(&body)
            .map_err(|e| RegistryError::InvalidResponse(format!("chart index: {}", e)))?;

        let artifacts: HashSet<ArtifactIdentity> = index
            .into_iter()
            .flat_map(|(chart, versions)| {
                versions.into_iter().map(move |entry| {
                    let name = entry.name.filter(|n| !n.is_empty()).unwrap_or_else(|| chart.clone());
                    ArtifactIdentity::new(name, entry.version)
                })
            })
            .collect();

        info!(charts = artifacts.len(), "Listed registry charts");
        Ok(artifacts)
    }

    async fn upload(&self, archive: &Path, artifact: &ArtifactIdentity) -> Result<(), RegistryError> {
        let content = tokio::fs::read(archive).await?;
        let url = self.charts_url();
        let file_name = artifact.archive_file_name();

        let result = self
            .send_with_retry("Chart upload", || {
                let part = Part::bytes(content.clone())
                    .file_name(file_name.clone())
                    .mime_str("application/gzip")
                    .map_err(|e| RegistryError::Transport(e.to_string()))?;
                let form = Form::new().part("chart", part);
                Ok(self.authorize(self.client.post(&url)).multipart(form))
            })
            .await;

        match result {
            Ok(_) => {
                info!(artifact = %artifact, "Chart uploaded");
                Ok(())
            }
            Err(RegistryError::Status { status, .. }) if status == StatusCode::CONFLICT.as_u16() => {
                Err(RegistryError::AlreadyExists(artifact.clone()))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use tempfile::TempDir;

    fn config(url: &str) -> RegistryConfig {
        RegistryConfig {
            url: url.to_string(),
            retry_delay_ms: 1,
            max_retries: 2,
            ..RegistryConfig::default()
        }
    }

    fn archive(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("nginx-1.0.0.tgz");
        std::fs::write(&path, b"\x1f\x8b\x08fake").unwrap();
        path
    }

    #[test]
    fn test_empty_url_is_inactive() {
        let client = ChartMuseumClient::from_config(&config("")).unwrap();
        assert!(!client.is_active());
        let client = ChartMuseumClient::from_config(&config("http://museum/")).unwrap();
        assert!(client.is_active());
        assert_eq!(client.charts_url(), "http://museum/api/charts");
    }

    #[tokio::test]
    async fn test_list_all_parses_index_with_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/charts")
            // admin:secret
            .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "nginx": [{"name": "nginx", "version": "1.0.0"}, {"name": "nginx", "version": "1.1.0"}],
                    "redis": [{"version": "7.2.0", "digest": "abc"}]
                }"#,
            )
            .create_async()
            .await;

        let mut cfg = config(&server.url());
        cfg.username = Some("admin".to_string());
        cfg.password = Some("secret".to_string());
        let client = ChartMuseumClient::from_config(&cfg).unwrap();

        let listed = client.list_all().await.unwrap();
        mock.assert_async().await;
        assert_eq!(listed.len(), 3);
        assert!(listed.contains(&ArtifactIdentity::new("nginx", "1.1.0")));
        assert!(listed.contains(&ArtifactIdentity::new("redis", "7.2.0")));
    }

    #[tokio::test]
    async fn test_list_all_rejects_garbage() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/charts")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = ChartMuseumClient::from_config(&config(&server.url())).unwrap();
        assert!(matches!(
            client.list_all().await,
            Err(RegistryError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_chart_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/charts")
            .match_header("content-type", Matcher::Regex("multipart/form-data".to_string()))
            .match_body(Matcher::Regex(r#"name="chart"; filename="nginx-1.0.0.tgz""#.to_string()))
            .with_status(201)
            .with_body(r#"{"saved": true}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let client = ChartMuseumClient::from_config(&config(&server.url())).unwrap();
        client
            .upload(&archive(&dir), &ArtifactIdentity::new("nginx", "1.0.0"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_conflict_is_already_exists() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/charts")
            .with_status(409)
            .with_body(r#"{"error": "file already exists"}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let client = ChartMuseumClient::from_config(&config(&server.url())).unwrap();
        let result = client
            .upload(&archive(&dir), &ArtifactIdentity::new("nginx", "1.0.0"))
            .await;
        assert!(matches!(result, Err(RegistryError::AlreadyExists(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/charts")
            .with_status(503)
            .with_body("unavailable")
            .expect(3)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let client = ChartMuseumClient::from_config(&config(&server.url())).unwrap();
        let result = client
            .upload(&archive(&dir), &ArtifactIdentity::new("nginx", "1.0.0"))
            .await;
        assert!(matches!(result, Err(RegistryError::Status { status: 503, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/charts")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let client = ChartMuseumClient::from_config(&config(&server.url())).unwrap();
        let result = client
            .upload(&archive(&dir), &ArtifactIdentity::new("nginx", "1.0.0"))
            .await;
        assert!(matches!(result, Err(RegistryError::Status { status: 401, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_archive_is_io_error() {
        let client = ChartMuseumClient::from_config(&config("http://127.0.0.1:9")).unwrap();
        let result = client
            .upload(Path::new("/nonexistent/x-1.tgz"), &ArtifactIdentity::new("x", "1"))
            .await;
        assert!(matches!(result, Err(RegistryError::Io(_))));
    }
}
