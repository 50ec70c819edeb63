// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Image records and repository identity as reported by the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of the repository name in a notification subject.
pub const MAX_SUBJECT_REPOSITORY_LEN: usize = 80;

/// Opaque content hash identifying one image build.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageDigest(pub String);

impl ImageDigest {
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bare repository name (final segment of the event's `repository-name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Build from a slash-delimited identifier, keeping only the last segment.
    ///
    /// Returns `None` when the final segment is empty.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        let name = identifier.trim().rsplit('/').next().unwrap_or_default();
        if name.is_empty() {
            None
        } else {
            Some(Self(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name cut to [`MAX_SUBJECT_REPOSITORY_LEN`] characters for subject lines.
    pub fn truncated(&self) -> &str {
        match self.0.char_indices().nth(MAX_SUBJECT_REPOSITORY_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One pushed image. Immutable once produced by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub digest: ImageDigest,
    #[serde(default)]
    pub tags: Vec<String>,
    pub pushed_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn new(digest: impl Into<String>, tags: Vec<String>, pushed_at: DateTime<Utc>) -> Self {
        Self {
            digest: ImageDigest::new(digest),
            tags,
            pushed_at,
        }
    }

    /// Tags joined with `,`, or `untagged` when the image carries none.
    pub fn tag_label(&self) -> String {
        if self.tags.is_empty() {
            "untagged".to_string()
        } else {
            self.tags.join(",")
        }
    }
}

/// The two most recent images of a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHistory {
    pub latest: ImageRecord,
    pub previous: Option<ImageRecord>,
}
