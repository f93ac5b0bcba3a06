// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Release Records and Revision Selection
//!
//! Helm keeps one cluster object per release revision, so a single deployed
//! release is usually backed by several historical records. This module turns
//! the raw objects returned by a [`ReleaseLister`] into typed records and keeps
//! only the current (highest) revision of each logical release.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Parse release record names and select current revisions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Secret type Helm v3 assigns to release records
pub const RELEASE_SECRET_TYPE: &str = "helm.sh/release.v1";

/// Object name prefix of Helm v3 release records
pub const RELEASE_NAME_PREFIX: &str = "sh.helm.release.v1.";

/// Stable key of one logical deployed release, independent of revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReleaseIdentity {
    pub namespace: String,
    pub release_name: String,
}

impl ReleaseIdentity {
    pub fn new(namespace: impl Into<String>, release_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            release_name: release_name.into(),
        }
    }
}

impl fmt::Display for ReleaseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.release_name)
    }
}

/// One cluster object as returned by the lister, before any interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReleaseObject {
    /// Object name (e.g. `sh.helm.release.v1.myapp.v4`)
    pub name: String,

    /// Namespace the object lives in
    pub namespace: String,

    /// Encoding tag of the object (the Secret `type`); empty when unknown
    pub kind_marker: String,

    /// Helm-encoded release payload (base64 of gzipped JSON)
    pub encoded_payload: Vec<u8>,
}

impl StoredReleaseObject {
    /// Whether the object carries the Helm release-record marker.
    ///
    /// Listers that cannot report the object type leave `kind_marker` empty, in
    /// which case the name prefix decides.
    pub fn is_release_record(&self) -> bool {
        if self.kind_marker.is_empty() {
            return self.name.starts_with(RELEASE_NAME_PREFIX);
        }
        self.kind_marker == RELEASE_SECRET_TYPE
    }
}

/// Parsed form of a release record name
///
/// Accepted shape: `sh.helm.release.v1.[<namespace>.]<release>.v<revision>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRecordName {
    pub namespace: Option<String>,
    pub release_name: String,
    pub revision: u32,
}

impl ReleaseRecordName {
    pub fn parse(name: &str) -> Result<Self, ReleaseError> {
        let remainder = name
            .strip_prefix(RELEASE_NAME_PREFIX)
            .ok_or_else(|| ReleaseError::NotAReleaseRecord(name.to_string()))?;

        let segments: Vec<&str> = remainder.split('.').collect();
        if segments.len() < 2 {
            return Err(ReleaseError::MalformedName {
                name: name.to_string(),
                reason: "expected '<release>.v<revision>' after the record prefix".to_string(),
            });
        }
        if segments.len() > 3 {
            return Err(ReleaseError::MalformedName {
                name: name.to_string(),
                reason: format!("too many segments ({}) after the record prefix", segments.len()),
            });
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ReleaseError::MalformedName {
                name: name.to_string(),
                reason: "empty name segment".to_string(),
            });
        }

        let last = segments.len() - 1;
        let revision = parse_revision(segments[last]).ok_or_else(|| ReleaseError::InvalidRevision {
            name: name.to_string(),
            segment: segments[last].to_string(),
        })?;

        Ok(Self {
            namespace: (segments.len() == 3).then(|| segments[0].to_string()),
            release_name: segments[last - 1].to_string(),
            revision,
        })
    }
}

fn parse_revision(segment: &str) -> Option<u32> {
    let digits = segment.strip_prefix('v')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|revision| *revision >= 1)
}

/// One historical release entry after name parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReleaseRecord {
    pub identity: ReleaseIdentity,
    pub revision: u32,
    pub encoded_payload: Vec<u8>,
    /// Name of the cluster object the record was read from
    pub object_name: String,
}

impl RawReleaseRecord {
    /// Build a record from a listed object.
    ///
    /// A namespace qualifier inside the name wins over the object namespace.
    pub fn from_object(object: StoredReleaseObject) -> Result<Self, ReleaseError> {
        let parsed = ReleaseRecordName::parse(&object.name)?;

        let namespace = match parsed.namespace {
            Some(namespace) => namespace,
            None if !object.namespace.is_empty() => object.namespace,
            None => return Err(ReleaseError::MissingNamespace(object.name)),
        };

        Ok(Self {
            identity: ReleaseIdentity::new(namespace, parsed.release_name),
            revision: parsed.revision,
            encoded_payload: object.encoded_payload,
            object_name: object.name,
        })
    }
}

/// Release record errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReleaseError {
    #[error("object {0} is not a Helm release record")]
    NotAReleaseRecord(String),

    #[error("malformed release record name {name}: {reason}")]
    MalformedName { name: String, reason: String },

    #[error("release record {name} has invalid revision segment '{segment}'")]
    InvalidRevision { name: String, segment: String },

    #[error("release record {0} has no namespace")]
    MissingNamespace(String),
}

/// Records that were observed but excluded from the selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionAnomaly {
    /// The object name did not decompose into a release identity and revision
    MalformedRecord { object_name: String, error: ReleaseError },

    /// Two records for one identity reported the same maximum revision
    DuplicateRevision {
        identity: ReleaseIdentity,
        revision: u32,
        kept: String,
        discarded: String,
    },
}

impl fmt::Display for SelectionAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionAnomaly::MalformedRecord { error, .. } => write!(f, "{}", error),
            SelectionAnomaly::DuplicateRevision { identity, revision, kept, discarded } => write!(
                f,
                "release {} has two records at revision {} (kept {}, discarded {})",
                identity, revision, kept, discarded
            ),
        }
    }
}

/// Result of one selection pass
#[derive(Debug, Default)]
pub struct Selection {
    /// Current record per logical release
    pub current: HashMap<ReleaseIdentity, RawReleaseRecord>,

    /// Per-record problems, none of them fatal
    pub anomalies: Vec<SelectionAnomaly>,

    /// Objects dropped because they are not release records
    pub filtered: usize,
}

impl Selection {
    /// Current records ordered by identity
    pub fn into_ordered(self) -> Vec<RawReleaseRecord> {
        let mut records: Vec<RawReleaseRecord> = self.current.into_values().collect();
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        records
    }
}

/// Groups release records by identity and keeps the highest revision of each
#[derive(Debug, Default, Clone, Copy)]
pub struct RevisionSelector;

impl RevisionSelector {
    pub fn new() -> Self {
        Self
    }

    pub fn select<I>(&self, objects: I) -> Selection
    where
        I: IntoIterator<Item = StoredReleaseObject>,
    {
        let mut selection = Selection::default();

        for object in objects {
            if !object.is_release_record() {
                selection.filtered += 1;
                continue;
            }

            let object_name = object.name.clone();
            let record = match RawReleaseRecord::from_object(object) {
                Ok(record) => record,
                Err(error) => {
                    tracing::warn!(object = %object_name, error = %error, "Skipping malformed release record");
                    selection.anomalies.push(SelectionAnomaly::MalformedRecord { object_name, error });
                    continue;
                }
            };

            match selection.current.entry(record.identity.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(mut slot) => {
                    let kept = slot.get();
                    if record.revision > kept.revision {
                        slot.insert(record);
                    } else if record.revision == kept.revision {
                        // First record seen at the maximum revision stays.
                        let anomaly = SelectionAnomaly::DuplicateRevision {
                            identity: record.identity.clone(),
                            revision: record.revision,
                            kept: kept.object_name.clone(),
                            discarded: record.object_name,
                        };
                        tracing::warn!(anomaly = %anomaly, "Duplicate release revision");
                        selection.anomalies.push(anomaly);
                    }
                }
            }
        }

        selection
    }
}

/// Source of release records (the cluster API)
#[async_trait]
pub trait ReleaseLister: Send + Sync {
    /// Return every currently stored release object. No pagination is exposed.
    async fn list(&self) -> Result<Vec<StoredReleaseObject>, ListError>;
}

/// Release listing errors
#[derive(Debug, Error)]
pub enum ListError {
    #[error("cluster request failed: {0}")]
    Transport(String),

    #[error("cluster API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid cluster API response: {0}")]
    InvalidResponse(String),

    #[error("cluster access is not configured: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str, namespace: &str) -> StoredReleaseObject {
        StoredReleaseObject {
            name: name.to_string(),
            namespace: namespace.to_string(),
            kind_marker: RELEASE_SECRET_TYPE.to_string(),
            encoded_payload: name.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_parse_namespace_qualified_name() {
        let parsed = ReleaseRecordName::parse("sh.helm.release.v1.myns.myapp.v4").unwrap();
        assert_eq!(parsed.namespace.as_deref(), Some("myns"));
        assert_eq!(parsed.release_name, "myapp");
        assert_eq!(parsed.revision, 4);

        let record = RawReleaseRecord::from_object(object("sh.helm.release.v1.myns.myapp.v4", "")).unwrap();
        assert_eq!(record.identity, ReleaseIdentity::new("myns", "myapp"));
        assert_eq!(record.revision, 4);
    }

    #[test]
    fn test_parse_plain_helm_name_uses_object_namespace() {
        let record = RawReleaseRecord::from_object(object("sh.helm.release.v1.myapp.v12", "prod")).unwrap();
        assert_eq!(record.identity, ReleaseIdentity::new("prod", "myapp"));
        assert_eq!(record.revision, 12);
    }

    #[test]
    fn test_too_few_segments_is_error() {
        let result = ReleaseRecordName::parse("sh.helm.release.v1.bad");
        assert!(matches!(result, Err(ReleaseError::MalformedName { .. })));
    }

    #[test]
    fn test_invalid_revisions() {
        for name in [
            "sh.helm.release.v1.app.4",
            "sh.helm.release.v1.app.v",
            "sh.helm.release.v1.app.v0",
            "sh.helm.release.v1.app.vx1",
            "sh.helm.release.v1.app.v-1",
        ] {
            let result = ReleaseRecordName::parse(name);
            assert!(
                matches!(result, Err(ReleaseError::InvalidRevision { .. })),
                "{} should be rejected, got {:?}",
                name,
                result
            );
        }
    }

    #[test]
    fn test_missing_prefix_and_namespace() {
        assert!(matches!(
            ReleaseRecordName::parse("default-token-abc"),
            Err(ReleaseError::NotAReleaseRecord(_))
        ));
        assert!(matches!(
            RawReleaseRecord::from_object(object("sh.helm.release.v1.app.v1", "")),
            Err(ReleaseError::MissingNamespace(_))
        ));
    }

    #[test]
    fn test_select_keeps_highest_revision_in_any_order() {
        let orders = [[1, 3, 2], [3, 2, 1], [2, 1, 3], [1, 2, 3]];
        for order in orders {
            let objects = order
                .iter()
                .map(|rev| object(&format!("sh.helm.release.v1.app.v{}", rev), "ns"));
            let selection = RevisionSelector::new().select(objects);

            assert_eq!(selection.current.len(), 1);
            let record = &selection.current[&ReleaseIdentity::new("ns", "app")];
            assert_eq!(record.revision, 3, "order {:?}", order);
            assert!(selection.anomalies.is_empty());
        }
    }

    #[test]
    fn test_select_groups_by_namespace_and_name() {
        let selection = RevisionSelector::new().select(vec![
            object("sh.helm.release.v1.app.v1", "a"),
            object("sh.helm.release.v1.app.v5", "b"),
            object("sh.helm.release.v1.other.v2", "a"),
        ]);
        assert_eq!(selection.current.len(), 3);

        let ordered = selection.into_ordered();
        let ids: Vec<String> = ordered.iter().map(|r| r.identity.to_string()).collect();
        assert_eq!(ids, vec!["a/app", "a/other", "b/app"]);
    }

    #[test]
    fn test_select_tie_keeps_first_and_records_anomaly() {
        let mut first = object("sh.helm.release.v1.ns.app.v2", "ns");
        first.encoded_payload = b"first".to_vec();
        let mut second = object("sh.helm.release.v1.app.v2", "ns");
        second.encoded_payload = b"second".to_vec();

        let selection = RevisionSelector::new().select(vec![first, second]);
        let record = &selection.current[&ReleaseIdentity::new("ns", "app")];
        assert_eq!(record.encoded_payload, b"first".to_vec());
        assert_eq!(selection.anomalies.len(), 1);
        assert!(matches!(
            selection.anomalies[0],
            SelectionAnomaly::DuplicateRevision { revision: 2, .. }
        ));
    }

    #[test]
    fn test_select_filters_foreign_objects_and_reports_malformed() {
        let mut foreign = object("default-token-xyz", "ns");
        foreign.kind_marker = "kubernetes.io/service-account-token".to_string();
        let mut unmarked = object("sh.helm.release.v1.app.v1", "ns");
        unmarked.kind_marker = String::new();

        let selection = RevisionSelector::new().select(vec![
            foreign,
            unmarked,
            object("sh.helm.release.v1.bad", "ns"),
        ]);

        assert_eq!(selection.filtered, 1);
        assert_eq!(selection.current.len(), 1);
        assert_eq!(selection.anomalies.len(), 1);
        assert!(matches!(
            &selection.anomalies[0],
            SelectionAnomaly::MalformedRecord { object_name, .. } if object_name == "sh.helm.release.v1.bad"
        ));
    }
}
