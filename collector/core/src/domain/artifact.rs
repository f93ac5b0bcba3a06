// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Artifact Domain Types
//!
//! A chart artifact is identified by chart name and version, independent of
//! which releases reference it. This module holds that identity, the typed
//! form of a decoded Helm release payload, and the decoder that produces it.
//!
//! # Payload Encoding
//!
//! Helm stores each release as `base64(gzip(json))`. Some Helm versions skip
//! compression, so the gzip step only runs when the gzip magic header is
//! present. Template and file contents inside the JSON are base64 again and
//! are decoded here, before anything touches the filesystem.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Artifact identity and fail-closed release payload decoding

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use thiserror::Error;

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Archive extension of packaged charts
pub const ARCHIVE_EXTENSION: &str = "tgz";

/// Dedup key of a packaged chart
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactIdentity {
    pub name: String,
    pub version: String,
}

impl ArtifactIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// File name of the packaged archive (`<name>-<version>.tgz`)
    pub fn archive_file_name(&self) -> String {
        format!("{}.{}", self, ARCHIVE_EXTENSION)
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// What already exists on local disk for one artifact.
///
/// Derived from the filesystem on every query, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalArtifactState {
    pub source_tree_materialized: bool,
    pub package_built: bool,
}

/// Chart.yaml contents
///
/// Known fields are typed; anything else is carried through untouched so the
/// rebuilt Chart.yaml matches the deployed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartMetadata {
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(rename = "kubeVersion", default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ChartDependency>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(rename = "appVersion", default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Sub-chart declared in Chart.yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDependency {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(rename = "import-values", default, skip_serializing_if = "Option::is_none")]
    pub import_values: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ChartDependency {
    /// Whether the dependency is fetched from a remote chart repository
    /// (as opposed to `file://` paths or an unset repository).
    pub fn is_remote(&self) -> bool {
        self.repository.starts_with("http://")
            || self.repository.starts_with("https://")
            || self.repository.starts_with("oci://")
    }
}

/// A named file carried inside the release payload, already decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// Typed release payload after decoding
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRelease {
    pub release_name: String,
    pub namespace: String,
    pub release_version: Option<u32>,
    pub artifact: ArtifactIdentity,
    pub metadata: ChartMetadata,
    /// Default values of the chart (values.yaml)
    pub values: serde_json::Value,
    /// values.schema.json, when the chart ships one
    pub schema: Option<Vec<u8>>,
    pub templates: Vec<ChartFile>,
    pub files: Vec<ChartFile>,
}

impl DecodedRelease {
    pub fn dependencies(&self) -> &[ChartDependency] {
        &self.metadata.dependencies
    }
}

/// Decoding errors (each one a per-item failure)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    Base64(String),

    #[error("payload gzip stream is corrupt: {0}")]
    Gzip(String),

    #[error("payload document is malformed: {0}")]
    Document(String),

    #[error("payload is missing required field {0}")]
    MissingField(&'static str),

    #[error("content of chart file {name} is not valid base64: {reason}")]
    FileContent { name: String, reason: String },

    #[error("chart {field} {value:?} cannot be used as a file name")]
    UnsafeIdentity { field: &'static str, value: String },
}

/// Chart name and version end up as single path segments under the
/// workspace, so separators, NUL and dot segments are refused.
fn check_identity_segment(field: &'static str, value: &str) -> Result<(), DecodeError> {
    let unsafe_segment = value == "."
        || value == ".."
        || value.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if unsafe_segment {
        return Err(DecodeError::UnsafeIdentity {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Wire schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct HelmReleasePayload {
    #[serde(default)]
    name: String,

    #[serde(default)]
    namespace: String,

    #[serde(default)]
    version: Option<u32>,

    chart: Option<ChartPayload>,
}

#[derive(Debug, Deserialize)]
struct ChartPayload {
    metadata: Option<ChartMetadata>,

    #[serde(default)]
    values: Option<serde_json::Value>,

    #[serde(default)]
    schema: Option<String>,

    #[serde(default)]
    templates: Option<Vec<EncodedChartFile>>,

    #[serde(default)]
    files: Option<Vec<EncodedChartFile>>,
}

#[derive(Debug, Deserialize)]
struct EncodedChartFile {
    name: String,

    #[serde(default)]
    data: String,
}

impl EncodedChartFile {
    fn decode(self) -> Result<ChartFile, DecodeError> {
        let data = STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| DecodeError::FileContent {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(ChartFile { name: self.name, data })
    }
}

fn decode_files(files: Option<Vec<EncodedChartFile>>) -> Result<Vec<ChartFile>, DecodeError> {
    files
        .unwrap_or_default()
        .into_iter()
        .map(EncodedChartFile::decode)
        .collect()
}

/// Decode a Helm release payload: base64, then gzip, then JSON.
pub fn decode_release(encoded: &[u8]) -> Result<DecodedRelease, DecodeError> {
    let raw = STANDARD
        .decode(encoded.trim_ascii())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;

    let document = if raw.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(raw.as_slice());
        let mut buffer = Vec::new();
        decoder
            .read_to_end(&mut buffer)
            .map_err(|e| DecodeError::Gzip(e.to_string()))?;
        buffer
    } else {
        raw
    };

    let payload: HelmReleasePayload =
        serde_json::from_slice(&document).map_err(|e| DecodeError::Document(e.to_string()))?;

    let chart = payload.chart.ok_or(DecodeError::MissingField("chart"))?;
    let metadata = chart.metadata.ok_or(DecodeError::MissingField("chart.metadata"))?;
    if metadata.name.trim().is_empty() {
        return Err(DecodeError::MissingField("chart.metadata.name"));
    }
    if metadata.version.trim().is_empty() {
        return Err(DecodeError::MissingField("chart.metadata.version"));
    }
    check_identity_segment("name", &metadata.name)?;
    check_identity_segment("version", &metadata.version)?;

    let schema = match chart.schema {
        Some(encoded) if !encoded.is_empty() => Some(
            STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| DecodeError::FileContent {
                    name: "values.schema.json".to_string(),
                    reason: e.to_string(),
                })?,
        ),
        _ => None,
    };

    let values = match chart.values {
        Some(serde_json::Value::Null) | None => serde_json::Value::Object(Default::default()),
        Some(values) => values,
    };

    Ok(DecodedRelease {
        release_name: payload.name,
        namespace: payload.namespace,
        release_version: payload.version,
        artifact: ArtifactIdentity::new(metadata.name.clone(), metadata.version.clone()),
        templates: decode_files(chart.templates)?,
        files: decode_files(chart.files)?,
        metadata,
        values,
        schema,
    })
}

/// Encode a release payload the way Helm stores it. Test helper for callers
/// that need well-formed records.
pub fn encode_release_document(document: &serde_json::Value) -> Result<Vec<u8>, DecodeError> {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let json = serde_json::to_vec(document).map_err(|e| DecodeError::Document(e.to_string()))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| DecodeError::Gzip(e.to_string()))?;
    let compressed = encoder.finish().map_err(|e| DecodeError::Gzip(e.to_string()))?;
    Ok(STANDARD.encode(compressed).into_bytes())
}
