// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Kubernetes Secret Lister
//!
//! [`ReleaseLister`] over the Kubernetes REST API. Lists Secrets of type
//! `helm.sh/release.v1` cluster-wide or in one namespace, following the
//! `continue` token until the server reports no further pages.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Fetch stored Helm release records
//! - **Integration:** Kubernetes API → Revision Selector

use crate::domain::collector_config::ClusterConfig;
use crate::domain::release::{ListError, ReleaseLister, StoredReleaseObject, RELEASE_SECRET_TYPE};
use crate::infrastructure::kube_config::{ClusterAuth, ClusterConnection};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Certificate, Client, Identity};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const PAGE_SIZE: u32 = 250;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Wire Models
// ============================================================================

#[derive(Debug, Deserialize)]
struct SecretList {
    #[serde(default)]
    metadata: ListMeta,

    #[serde(default)]
    items: Vec<Secret>,
}

#[derive(Debug, Default, Deserialize)]
struct ListMeta {
    #[serde(rename = "continue", default)]
    continue_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Secret {
    metadata: ObjectMeta,

    #[serde(rename = "type", default)]
    secret_type: String,

    #[serde(default)]
    data: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,

    #[serde(default)]
    namespace: String,
}

// ============================================================================
// Lister Implementation
// ============================================================================

pub struct KubernetesSecretLister {
    client: Client,
    server: String,
    auth: ClusterAuth,
    /// None lists every namespace
    namespace: Option<String>,
    page_size: u32,
}

impl KubernetesSecretLister {
    pub fn from_config(config: &ClusterConfig) -> Result<Self, ListError> {
        let connection = ClusterConnection::from_config(config)?;
        let namespace = Some(config.namespace.trim().to_string()).filter(|ns| !ns.is_empty());
        Self::new(connection, namespace)
    }

    pub fn new(connection: ClusterConnection, namespace: Option<String>) -> Result<Self, ListError> {
        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);

        if let Some(pem) = &connection.ca_pem {
            for certificate in Certificate::from_pem_bundle(pem)
                .map_err(|e| ListError::Configuration(format!("invalid cluster CA: {}", e)))?
            {
                builder = builder.add_root_certificate(certificate);
            }
        }
        if connection.insecure_skip_tls_verify {
            warn!("TLS verification of the Kubernetes API server is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let ClusterAuth::ClientCertificate(pem) = &connection.auth {
            let identity = Identity::from_pem(pem)
                .map_err(|e| ListError::Configuration(format!("invalid client certificate: {}", e)))?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| ListError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            server: connection.server,
            auth: connection.auth,
            namespace,
            page_size: PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn secrets_url(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/api/v1/namespaces/{}/secrets", self.server, ns),
            None => format!("{}/api/v1/secrets", self.server),
        }
    }

    async fn fetch_page(&self, continue_token: Option<&str>) -> Result<SecretList, ListError> {
        let field_selector = format!("type={}", RELEASE_SECRET_TYPE);
        let limit = self.page_size.to_string();
        let mut request = self
            .client
            .get(self.secrets_url())
            .query(&[("fieldSelector", field_selector.as_str()), ("limit", limit.as_str())]);
        if let Some(token) = continue_token {
            request = request.query(&[("continue", token)]);
        }
        request = match &self.auth {
            ClusterAuth::Bearer(token) => request.bearer_auth(token),
            ClusterAuth::Basic { username, password } => request.basic_auth(username, Some(password)),
            ClusterAuth::ClientCertificate(_) | ClusterAuth::None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| ListError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ListError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ListError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        serde_json::from_str(&body).map_err(|e| ListError::InvalidResponse(format!("secret list: {}", e)))
    }
}

fn into_stored_object(secret: Secret) -> StoredReleaseObject {
    // data values are base64 of the Helm payload, which is base64 itself
    let encoded_payload = match secret.data.get("release") {
        Some(value) => STANDARD.decode(value.trim()).unwrap_or_else(|e| {
            warn!(secret = %secret.metadata.name, error = %e, "Release data is not valid base64");
            Vec::new()
        }),
        None => {
            warn!(secret = %secret.metadata.name, "Release secret has no 'release' key");
            Vec::new()
        }
    };

    StoredReleaseObject {
        name: secret.metadata.name,
        namespace: secret.metadata.namespace,
        kind_marker: secret.secret_type,
        encoded_payload,
    }
}

#[async_trait]
impl ReleaseLister for KubernetesSecretLister {
    async fn list(&self) -> Result<Vec<StoredReleaseObject>, ListError> {
        let mut objects = Vec::new();
        let mut continue_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.fetch_page(continue_token.as_deref()).await?;
            pages += 1;
            debug!(page = pages, items = page.items.len(), "Fetched release secret page");
            objects.extend(page.items.into_iter().map(into_stored_object));

            match page.metadata.continue_token.filter(|token| !token.is_empty()) {
                Some(token) => continue_token = Some(token),
                None => break,
            }
        }

        info!(
            objects = objects.len(),
            pages,
            namespace = self.namespace.as_deref().unwrap_or("*"),
            "Listed release secrets"
        );
        Ok(objects)
    }
}
