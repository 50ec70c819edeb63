// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Finding Aggregates
//!
//! `FindingSet` accumulates one severity's findings for one image across
//! pages. Titles are the finding identity, so duplicates collapse; the set is
//! ordered so the result does not depend on where page boundaries fall.
//!
//! `ImageFindings` is the per-image snapshot the delta engine consumes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::error::GateError;
use crate::domain::image::ImageDigest;
use crate::domain::severity::Severity;

/// A single reported vulnerability as returned by the finding source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl Finding {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            severity: None,
        }
    }
}

/// Count and distinct titles for one image and one severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingSet {
    pub image_digest: ImageDigest,
    pub severity: Severity,
    /// Number of findings reported, duplicates included.
    pub count: u64,
    pub titles: BTreeSet<String>,
}

impl FindingSet {
    pub fn empty(image_digest: ImageDigest, severity: Severity) -> Self {
        Self {
            image_digest,
            severity,
            count: 0,
            titles: BTreeSet::new(),
        }
    }

    /// Fold one page of findings into the set.
    pub fn absorb<'a, I>(&mut self, page: I)
    where
        I: IntoIterator<Item = &'a Finding>,
    {
        for finding in page {
            self.count += 1;
            self.titles.insert(finding.title.clone());
        }
    }
}

/// Findings snapshot for one image: per queryable severity plus the
/// unfiltered total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFindings {
    pub image_digest: ImageDigest,
    pub by_severity: BTreeMap<Severity, FindingSet>,
    pub total: u64,
}

impl ImageFindings {
    pub fn new(image_digest: ImageDigest, total: u64) -> Self {
        Self {
            image_digest,
            by_severity: BTreeMap::new(),
            total,
        }
    }

    pub fn with_set(mut self, set: FindingSet) -> Self {
        self.by_severity.insert(set.severity, set);
        self
    }

    /// Count for a queryable severity (zero when never aggregated).
    pub fn count(&self, severity: Severity) -> u64 {
        self.by_severity.get(&severity).map(|s| s.count).unwrap_or(0)
    }

    pub fn titles(&self, severity: Severity) -> BTreeSet<String> {
        self.by_severity
            .get(&severity)
            .map(|s| s.titles.clone())
            .unwrap_or_default()
    }

    /// `total − Σ known severities`.
    ///
    /// A negative result means the source paginated inconsistently or the
    /// aggregator miscounted; it is reported as an error rather than clamped.
    pub fn other_count(&self) -> Result<u64, GateError> {
        let known: u64 = Severity::QUERYABLE.iter().map(|s| self.count(*s)).sum();
        self.total
            .checked_sub(known)
            .ok_or_else(|| GateError::InconsistentCounts {
                image_digest: self.image_digest.clone(),
                total: self.total,
                known,
            })
    }

    /// Count for any class, deriving `OTHER` from the total.
    pub fn class_count(&self, severity: Severity) -> Result<u64, GateError> {
        match severity {
            Severity::Other => self.other_count(),
            known => Ok(self.count(known)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(digest: &str, severity: Severity, titles: &[&str]) -> FindingSet {
        let mut s = FindingSet::empty(ImageDigest::new(digest), severity);
        let findings: Vec<Finding> = titles.iter().map(|t| Finding::titled(*t)).collect();
        s.absorb(&findings);
        s
    }

    #[test]
    fn test_absorb_collapses_duplicate_titles() {
        let s = set("sha256:a", Severity::Critical, &["CVE-1", "CVE-1", "CVE-2"]);
        assert_eq!(s.count, 3);
        assert_eq!(s.titles.len(), 2);
    }

    #[test]
    fn test_absorb_is_page_boundary_independent() {
        let titles: Vec<Finding> = (0..250).map(|i| Finding::titled(format!("CVE-{i}"))).collect();

        let mut single = FindingSet::empty(ImageDigest::new("d"), Severity::High);
        single.absorb(&titles);

        let mut paged = FindingSet::empty(ImageDigest::new("d"), Severity::High);
        for chunk in titles.chunks(100) {
            paged.absorb(chunk);
        }

        assert_eq!(single, paged);
    }

    #[test]
    fn test_other_count_is_total_minus_known() {
        let findings = ImageFindings::new(ImageDigest::new("d"), 10)
            .with_set(set("d", Severity::Critical, &["a", "b"]))
            .with_set(set("d", Severity::High, &["c"]))
            .with_set(set("d", Severity::Medium, &["e", "f", "g"]))
            .with_set(set("d", Severity::Low, &["h"]));
        assert_eq!(findings.other_count().unwrap(), 3);
        assert_eq!(findings.class_count(Severity::Other).unwrap(), 3);
        assert_eq!(findings.class_count(Severity::Medium).unwrap(), 3);
    }

    #[test]
    fn test_negative_other_is_flagged() {
        let findings = ImageFindings::new(ImageDigest::new("d"), 1)
            .with_set(set("d", Severity::Critical, &["a", "b"]));
        let err = findings.other_count().unwrap_err();
        assert!(matches!(err, GateError::InconsistentCounts { total: 1, known: 2, .. }));
    }
}
