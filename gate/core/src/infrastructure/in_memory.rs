// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory collaborators
//!
//! Process-local implementations of every collaborator port. They back the
//! test suites and `imagegate run --offline`, where a fixture file stands in
//! for the real services.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Deterministic stand-ins with call logs for assertions

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::approval::{
    ActionExecution, ActionState, ApprovalSubmission, PipelineState, StageState, APPROVAL_ACTION_NAME,
    APPROVAL_STAGE_NAME,
};
use crate::domain::finding::Finding;
use crate::domain::image::{ImageRecord, RepositoryName};
use crate::domain::ports::{
    FindingPage, FindingQuery, FindingSource, ImageRegistry, Notification, Notifier, NotifyError,
    PipelineOrchestrator, UpstreamError, ACTIVE_FINDING_STATUS, MAX_FINDINGS_PAGE_SIZE,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry keyed by bare repository name.
#[derive(Clone, Default)]
pub struct InMemoryImageRegistry {
    images: Arc<DashMap<String, Vec<ImageRecord>>>,
}

impl InMemoryImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, repository: impl Into<String>, images: Vec<ImageRecord>) {
        self.images.insert(repository.into(), images);
    }

    pub fn push(&self, repository: impl Into<String>, image: ImageRecord) {
        self.images.entry(repository.into()).or_default().push(image);
    }
}

#[async_trait]
impl ImageRegistry for InMemoryImageRegistry {
    async fn list_images(&self, repository: &RepositoryName) -> Result<Vec<ImageRecord>, UpstreamError> {
        Ok(self
            .images
            .get(repository.as_str())
            .map(|images| images.value().clone())
            .unwrap_or_default())
    }
}

/// Finding source that pages stored findings with offset tokens and logs
/// every query it receives. All stored findings are ACTIVE.
pub struct InMemoryFindingSource {
    findings: DashMap<String, Vec<Finding>>,
    page_size: u32,
    queries: Mutex<Vec<FindingQuery>>,
    failure: Mutex<Option<String>>,
}

impl Default for InMemoryFindingSource {
    fn default() -> Self {
        Self::with_page_size(MAX_FINDINGS_PAGE_SIZE)
    }
}

impl InMemoryFindingSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve at most `page_size` findings per page, even when the query
    /// asks for more.
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            findings: DashMap::new(),
            page_size: page_size.max(1),
            queries: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    pub fn insert(&self, digest: impl Into<String>, findings: Vec<Finding>) {
        self.findings.insert(digest.into(), findings);
    }

    /// Every subsequent query fails with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    pub fn queries(&self) -> Vec<FindingQuery> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl FindingSource for InMemoryFindingSource {
    async fn list_findings(&self, query: &FindingQuery) -> Result<FindingPage, UpstreamError> {
        lock(&self.queries).push(query.clone());

        if let Some(message) = lock(&self.failure).clone() {
            return Err(UpstreamError::new("finding-source", message));
        }
        if query.status != ACTIVE_FINDING_STATUS {
            return Ok(FindingPage::default());
        }

        let matching: Vec<Finding> = self
            .findings
            .get(query.image_digest.as_str())
            .map(|all| {
                all.iter()
                    .filter(|f| query.severity.is_none() || f.severity == query.severity)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let offset = match query.next_token.as_deref() {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| {
                UpstreamError::new("finding-source", format!("unknown continuation token '{token}'"))
            })?,
        };
        let size = query.page_size.min(self.page_size).max(1) as usize;
        let end = (offset + size).min(matching.len());

        Ok(FindingPage {
            findings: matching.get(offset..end).map(<[Finding]>::to_vec).unwrap_or_default(),
            next_token: (end < matching.len()).then(|| end.to_string()),
        })
    }
}

/// Pipeline orchestrator driven by scripted state responses.
///
/// Each state read returns the next scripted state; the last one repeats.
/// Reads of an unscripted pipeline fail.
#[derive(Default)]
pub struct InMemoryPipelineOrchestrator {
    scripts: DashMap<String, Vec<PipelineState>>,
    reads: DashMap<String, usize>,
    failing_reads: DashMap<String, usize>,
    submissions: Mutex<Vec<ApprovalSubmission>>,
    submission_failure: Mutex<Option<String>>,
}

impl InMemoryPipelineOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, pipeline: impl Into<String>, states: Vec<PipelineState>) {
        self.scripts.insert(pipeline.into(), states);
    }

    /// The first `reads` state reads of `pipeline` fail.
    pub fn fail_state_reads(&self, pipeline: impl Into<String>, reads: usize) {
        self.failing_reads.insert(pipeline.into(), reads);
    }

    /// Every approval submission fails with `message`.
    pub fn reject_submissions(&self, message: impl Into<String>) {
        *lock(&self.submission_failure) = Some(message.into());
    }

    pub fn state_reads(&self, pipeline: &str) -> usize {
        self.reads.get(pipeline).map(|r| *r).unwrap_or(0)
    }

    pub fn submissions(&self) -> Vec<ApprovalSubmission> {
        lock(&self.submissions).clone()
    }

    /// Pipeline paused at its approval action, with or without a token.
    pub fn awaiting(token: Option<&str>) -> PipelineState {
        PipelineState {
            stage_states: vec![StageState {
                stage_name: APPROVAL_STAGE_NAME.to_string(),
                action_states: vec![ActionState {
                    action_name: APPROVAL_ACTION_NAME.to_string(),
                    latest_execution: token.map(|t| ActionExecution {
                        token: Some(t.to_string()),
                        status: Some("InProgress".to_string()),
                    }),
                }],
            }],
        }
    }

    pub fn without_approval_stage() -> PipelineState {
        PipelineState {
            stage_states: vec![StageState {
                stage_name: "Deploy".to_string(),
                action_states: Vec::new(),
            }],
        }
    }
}

#[async_trait]
impl PipelineOrchestrator for InMemoryPipelineOrchestrator {
    async fn pipeline_state(&self, pipeline_name: &str) -> Result<PipelineState, UpstreamError> {
        let read = {
            let mut reads = self.reads.entry(pipeline_name.to_string()).or_insert(0);
            *reads += 1;
            *reads
        };

        let failing = self.failing_reads.get(pipeline_name).map(|f| *f).unwrap_or(0);
        if read <= failing {
            return Err(UpstreamError::new(
                "pipeline-orchestrator",
                format!("state read failed: {pipeline_name}"),
            ));
        }

        let script = self.scripts.get(pipeline_name).ok_or_else(|| {
            UpstreamError::new("pipeline-orchestrator", format!("pipeline not found: {pipeline_name}"))
        })?;
        script
            .get(read - 1)
            .or_else(|| script.last())
            .cloned()
            .ok_or_else(|| UpstreamError::new("pipeline-orchestrator", "empty state script"))
    }

    async fn submit_approval(&self, submission: &ApprovalSubmission) -> Result<(), UpstreamError> {
        if let Some(message) = lock(&self.submission_failure).clone() {
            return Err(UpstreamError::new("pipeline-orchestrator", message));
        }
        lock(&self.submissions).push(submission.clone());
        Ok(())
    }
}

/// Messaging sink that keeps every notification it accepts.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that refuses every notification.
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.set_failing(true);
        notifier
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError("sink unavailable".to_string()));
        }
        tracing::info!(subject = %notification.subject, "Recorded notification");
        lock(&self.sent).push(notification.clone());
        Ok(())
    }
}

/// Fixture file for offline runs: the registry listing, the findings per
/// digest and the pipeline states to replay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfflineFixture {
    #[serde(default)]
    pub images: HashMap<String, Vec<ImageRecord>>,
    #[serde(default)]
    pub findings: HashMap<String, Vec<Finding>>,
    #[serde(default)]
    pub pipelines: HashMap<String, Vec<PipelineState>>,
}

impl OfflineFixture {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn into_collaborators(
        self,
    ) -> (
        InMemoryImageRegistry,
        InMemoryFindingSource,
        InMemoryPipelineOrchestrator,
    ) {
        let registry = InMemoryImageRegistry::new();
        for (repository, images) in self.images {
            registry.insert(repository, images);
        }
        let findings = InMemoryFindingSource::new();
        for (digest, list) in self.findings {
            findings.insert(digest, list);
        }
        let orchestrator = InMemoryPipelineOrchestrator::new();
        for (pipeline, states) in self.pipelines {
            orchestrator.script(pipeline, states);
        }
        (registry, findings, orchestrator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::approval::TokenLookup;
    use crate::domain::image::ImageDigest;
    use crate::domain::severity::Severity;

    #[tokio::test]
    async fn test_finding_pages_use_offset_tokens() {
        let source = InMemoryFindingSource::with_page_size(2);
        source.insert(
            "d",
            (0..5).map(|i| Finding::titled(format!("CVE-{i}"))).collect(),
        );

        let first = FindingQuery::active(ImageDigest::new("d"), None);
        let page = source.list_findings(&first).await.unwrap();
        assert_eq!(page.findings.len(), 2);
        assert_eq!(page.next_token.as_deref(), Some("2"));

        let last = source
            .list_findings(&first.continued("4".to_string()))
            .await
            .unwrap();
        assert_eq!(last.findings.len(), 1);
        assert!(last.next_token.is_none());
    }

    #[tokio::test]
    async fn test_severity_filter() {
        let source = InMemoryFindingSource::new();
        source.insert(
            "d",
            vec![
                Finding { title: "a".into(), severity: Some(Severity::High) },
                Finding { title: "b".into(), severity: Some(Severity::Low) },
            ],
        );
        let page = source
            .list_findings(&FindingQuery::active(ImageDigest::new("d"), Some(Severity::High)))
            .await
            .unwrap();
        assert_eq!(page.findings.len(), 1);
        assert_eq!(page.findings[0].title, "a");
    }

    #[tokio::test]
    async fn test_script_repeats_last_state() {
        let orchestrator = InMemoryPipelineOrchestrator::new();
        orchestrator.script(
            "p",
            vec![
                InMemoryPipelineOrchestrator::awaiting(None),
                InMemoryPipelineOrchestrator::awaiting(Some("t")),
            ],
        );
        assert_eq!(orchestrator.pipeline_state("p").await.unwrap().approval_token(), TokenLookup::NotReady);
        for _ in 0..3 {
            assert_eq!(
                orchestrator.pipeline_state("p").await.unwrap().approval_token(),
                TokenLookup::Ready("t".into())
            );
        }
        assert_eq!(orchestrator.state_reads("p"), 4);
        assert!(orchestrator.pipeline_state("unknown").await.is_err());
    }

    #[test]
    fn test_offline_fixture_parsing() {
        let fixture = OfflineFixture::from_json_str(
            r#"{
                "images": {"web": [{"digest": "sha256:a", "tags": ["v1"], "pushed_at": "2026-03-01T10:00:00Z"}]},
                "findings": {"sha256:a": [{"title": "CVE-1", "severity": "CRITICAL"}]}
            }"#,
        )
        .unwrap();
        assert_eq!(fixture.images["web"].len(), 1);
        assert_eq!(fixture.findings["sha256:a"][0].severity, Some(Severity::Critical));
        assert!(fixture.pipelines.is_empty());
    }
}
