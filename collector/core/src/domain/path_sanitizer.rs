// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Sanitizer Domain Service
//!
//! Chart file and template names come straight out of release records, which
//! anyone with write access to a namespace can craft. Before the workspace
//! writes such a name to disk it is resolved here into a relative path that
//! cannot leave the chart directory.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Reject unsafe record-supplied file names

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Default limit on the length of a record-supplied file name
pub const DEFAULT_MAX_NAME_LEN: usize = 1024;

/// Path sanitization errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathSanitizerError {
    #[error("path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("absolute path not allowed: {0}")]
    AbsolutePath(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path too long ({len} > {max})")]
    PathTooLong { len: usize, max: usize },
}

/// Resolves untrusted chart-relative file names
///
/// # Guarantees
/// - Rejects `..` components, absolute paths and drive prefixes
/// - Rejects NUL bytes and names that resolve to nothing
/// - Treats `\` as a separator and drops `.` components
#[derive(Debug, Clone, Copy)]
pub struct PathSanitizer {
    max_name_len: usize,
}

impl PathSanitizer {
    pub fn new() -> Self {
        Self {
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }

    pub fn with_max_length(max_name_len: usize) -> Self {
        Self { max_name_len }
    }

    /// Normalize `name` into a safe relative path.
    ///
    /// # Examples
    /// ```
    /// use helm_cache_core::domain::path_sanitizer::PathSanitizer;
    /// use std::path::PathBuf;
    ///
    /// let sanitizer = PathSanitizer::new();
    /// let safe = sanitizer.relative("templates/./deployment.yaml").unwrap();
    /// assert_eq!(safe, PathBuf::from("templates/deployment.yaml"));
    ///
    /// assert!(sanitizer.relative("../../etc/passwd").is_err());
    /// ```
    pub fn relative(&self, name: &str) -> Result<PathBuf, PathSanitizerError> {
        if name.len() > self.max_name_len {
            return Err(PathSanitizerError::PathTooLong {
                len: name.len(),
                max: self.max_name_len,
            });
        }
        if name.contains('\0') {
            tracing::warn!(name = %name.escape_debug(), "File name contains NUL byte");
            return Err(PathSanitizerError::InvalidPath(name.escape_debug().to_string()));
        }

        let unified = name.replace('\\', "/");
        let mut normalized = PathBuf::new();
        for component in Path::new(&unified).components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    tracing::warn!(name = %name, "Path traversal attempt detected in chart file name");
                    return Err(PathSanitizerError::PathTraversal(name.to_string()));
                }
                Component::RootDir | Component::Prefix(_) => {
                    tracing::warn!(name = %name, "Absolute chart file name rejected");
                    return Err(PathSanitizerError::AbsolutePath(name.to_string()));
                }
            }
        }

        // Windows drive letters are not a Prefix component on unix hosts
        if let Some(first) = unified.split('/').next() {
            if first.len() == 2 && first.ends_with(':') {
                return Err(PathSanitizerError::AbsolutePath(name.to_string()));
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(PathSanitizerError::InvalidPath(format!("'{}' resolves to an empty path", name)));
        }

        Ok(normalized)
    }

    /// Resolve `name` below `root`.
    pub fn resolve_within(&self, root: &Path, name: &str) -> Result<PathBuf, PathSanitizerError> {
        Ok(root.join(self.relative(name)?))
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_name() {
        let sanitizer = PathSanitizer::new();
        assert_eq!(
            sanitizer.relative("templates/service.yaml").unwrap(),
            PathBuf::from("templates/service.yaml")
        );
    }

    #[test]
    fn test_reject_parent_dir() {
        let sanitizer = PathSanitizer::new();
        for name in ["../x", "templates/../../x", "a/.."] {
            assert!(
                matches!(sanitizer.relative(name), Err(PathSanitizerError::PathTraversal(_))),
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_reject_absolute() {
        let sanitizer = PathSanitizer::new();
        assert!(matches!(
            sanitizer.relative("/etc/passwd"),
            Err(PathSanitizerError::AbsolutePath(_))
        ));
        assert!(matches!(
            sanitizer.relative("C:\\Windows\\system.ini"),
            Err(PathSanitizerError::AbsolutePath(_))
        ));
    }

    #[test]
    fn test_backslashes_and_current_dir_are_normalized() {
        let sanitizer = PathSanitizer::new();
        assert_eq!(
            sanitizer.relative(".\\templates\\.\\_helpers.tpl").unwrap(),
            PathBuf::from("templates/_helpers.tpl")
        );
        assert!(matches!(
            sanitizer.relative("..\\secret"),
            Err(PathSanitizerError::PathTraversal(_))
        ));
    }

    #[test]
    fn test_reject_empty_null_and_long() {
        let sanitizer = PathSanitizer::with_max_length(16);
        assert!(matches!(sanitizer.relative(""), Err(PathSanitizerError::InvalidPath(_))));
        assert!(matches!(sanitizer.relative("./."), Err(PathSanitizerError::InvalidPath(_))));
        assert!(matches!(sanitizer.relative("a\0b"), Err(PathSanitizerError::InvalidPath(_))));
        assert!(matches!(
            sanitizer.relative("templates/a-very-long-name.yaml"),
            Err(PathSanitizerError::PathTooLong { max: 16, .. })
        ));
    }

    #[test]
    fn test_resolve_within_root() {
        let sanitizer = PathSanitizer::new();
        let root = Path::new("/data/raw/nginx-1.0.0");
        assert_eq!(
            sanitizer.resolve_within(root, "files/config.json").unwrap(),
            root.join("files/config.json")
        );
    }
}
