// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Finding Aggregator
//!
//! Drains the paginated finding source for one image. Every query carries the
//! image digest and the ACTIVE status filter; the severity filter is optional.
//! Pages are requested at the maximum size until no continuation token comes
//! back. Upstream failures propagate without retry, and a continuation token
//! seen earlier in the same drain is treated as an upstream failure.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::domain::error::GateError;
use crate::domain::finding::{Finding, FindingSet, ImageFindings};
use crate::domain::image::ImageDigest;
use crate::domain::ports::{FindingQuery, FindingSource, UpstreamError};
use crate::domain::severity::Severity;

pub struct FindingAggregator {
    source: Arc<dyn FindingSource>,
}

impl FindingAggregator {
    pub fn new(source: Arc<dyn FindingSource>) -> Self {
        Self { source }
    }

    /// Count and distinct titles of ACTIVE findings of one severity.
    pub async fn count_by_severity(
        &self,
        digest: &ImageDigest,
        severity: Severity,
    ) -> Result<FindingSet, GateError> {
        if !severity.is_queryable() {
            return Err(GateError::Configuration(format!(
                "{severity} findings cannot be queried; the class is derived from totals"
            )));
        }

        let mut set = FindingSet::empty(digest.clone(), severity);
        self.drain(FindingQuery::active(digest.clone(), Some(severity)), |page| {
            set.absorb(page)
        })
        .await?;

        debug!(image_digest = %digest, severity = %severity, count = set.count, "Aggregated findings");
        Ok(set)
    }

    /// Count of all ACTIVE findings regardless of severity.
    pub async fn count_all(&self, digest: &ImageDigest) -> Result<u64, GateError> {
        let mut total = 0u64;
        self.drain(FindingQuery::active(digest.clone(), None), |page| {
            total += page.len() as u64
        })
        .await?;

        debug!(image_digest = %digest, total, "Counted all findings");
        Ok(total)
    }

    /// Per-severity sets plus the unfiltered total for one image.
    pub async fn snapshot(&self, digest: &ImageDigest) -> Result<ImageFindings, GateError> {
        let mut findings = ImageFindings::new(digest.clone(), self.count_all(digest).await?);
        for severity in Severity::QUERYABLE {
            findings = findings.with_set(self.count_by_severity(digest, severity).await?);
        }
        Ok(findings)
    }

    async fn drain<F>(&self, first: FindingQuery, mut visit: F) -> Result<(), GateError>
    where
        F: FnMut(&[Finding]),
    {
        let mut query = first;
        let mut seen = HashSet::new();
        let mut pages = 0u32;
        loop {
            let page = self.source.list_findings(&query).await?;
            pages += 1;
            visit(&page.findings);

            match page.next_token {
                Some(token) if !token.is_empty() => {
                    if !seen.insert(token.clone()) {
                        return Err(UpstreamError::new(
                            "finding-source",
                            format!("continuation token '{token}' repeated after {pages} pages"),
                        )
                        .into());
                    }
                    query = query.continued(token);
                }
                _ => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::FindingPage;
    use crate::infrastructure::in_memory::InMemoryFindingSource;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Hands out its scripted continuation tokens in order, one finding per page.
    struct CyclingSource {
        tokens: Vec<&'static str>,
        served: Mutex<usize>,
    }

    #[async_trait]
    impl FindingSource for CyclingSource {
        async fn list_findings(&self, _query: &FindingQuery) -> Result<FindingPage, UpstreamError> {
            let mut served = self.served.lock().unwrap();
            let token = self.tokens.get(*served).map(|t| t.to_string());
            *served += 1;
            Ok(FindingPage {
                findings: vec![critical("CVE-1")],
                next_token: token,
            })
        }
    }

    fn critical(title: &str) -> Finding {
        Finding {
            title: title.to_string(),
            severity: Some(Severity::Critical),
        }
    }

    #[tokio::test]
    async fn test_pages_until_token_exhausted() {
        let source = Arc::new(InMemoryFindingSource::with_page_size(100));
        let findings: Vec<Finding> = (0..250).map(|i| critical(&format!("CVE-{i}"))).collect();
        source.insert("sha256:l", findings);

        let aggregator = FindingAggregator::new(source.clone());
        let set = aggregator
            .count_by_severity(&ImageDigest::new("sha256:l"), Severity::Critical)
            .await
            .unwrap();

        assert_eq!(set.count, 250);
        assert_eq!(set.titles.len(), 250);
        let queries = source.queries();
        assert_eq!(queries.len(), 3);
        assert!(queries.iter().all(|q| q.status == "ACTIVE" && q.page_size == 100));
        assert_eq!(queries[0].next_token, None);
        assert!(queries[2].next_token.is_some());
    }

    #[tokio::test]
    async fn test_snapshot_counts_every_severity() {
        let source = Arc::new(InMemoryFindingSource::new());
        source.insert(
            "d",
            vec![
                critical("CVE-1"),
                Finding { title: "CVE-2".into(), severity: Some(Severity::High) },
                Finding { title: "CVE-3".into(), severity: Some(Severity::Low) },
                Finding { title: "CVE-4".into(), severity: None },
            ],
        );

        let snapshot = FindingAggregator::new(source)
            .snapshot(&ImageDigest::new("d"))
            .await
            .unwrap();
        assert_eq!(snapshot.total, 4);
        assert_eq!(snapshot.count(Severity::Critical), 1);
        assert_eq!(snapshot.count(Severity::High), 1);
        assert_eq!(snapshot.count(Severity::Medium), 0);
        assert_eq!(snapshot.other_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_not_retried() {
        let source = Arc::new(InMemoryFindingSource::new());
        source.fail_with("throttled");

        let err = FindingAggregator::new(source.clone())
            .count_all(&ImageDigest::new("d"))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::UpstreamQuery { .. }));
        assert_eq!(source.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_token_cycle_is_an_upstream_failure() {
        let source = Arc::new(CyclingSource {
            tokens: vec!["A", "B", "A", "B"],
            served: Mutex::new(0),
        });

        let err = FindingAggregator::new(source.clone())
            .count_all(&ImageDigest::new("d"))
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::UpstreamQuery { .. }));
        assert!(err.to_string().contains("'A' repeated after 3 pages"));
        assert_eq!(*source.served.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_other_is_not_queryable() {
        let aggregator = FindingAggregator::new(Arc::new(InMemoryFindingSource::new()));
        let err = aggregator
            .count_by_severity(&ImageDigest::new("d"), Severity::Other)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Configuration(_)));
    }
}
