// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Collaborator Ports
//!
//! Interfaces the gate consumes. Each is defined here in the domain layer
//! and implemented in `crate::infrastructure`.
//!
//! | Trait | Collaborator | Implementations |
//! |-------|--------------|-----------------|
//! | `ImageRegistry` | image history source | `HttpImageRegistry`, `InMemoryImageRegistry` |
//! | `FindingSource` | paginated finding query API | `HttpFindingSource`, `InMemoryFindingSource` |
//! | `PipelineOrchestrator` | pipeline state query / approval mutation | `HttpPipelineOrchestrator`, `InMemoryPipelineOrchestrator` |
//! | `Notifier` | messaging sink | `WebhookNotifier`, `RecordingNotifier` |
//! | `EventSignal` | event bus signal | `HttpEventSink`, `EventBus` |
//! | `PipelineDirectory` | repository → pipeline lookup | `StaticPipelineDirectory` |
//! | `IdempotencyStore` | redelivery guard | `InMemoryIdempotencyStore` |
//!
//! Handles are shared across invocations and must not hold gating state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::approval::{ApprovalSubmission, PipelineState};
use crate::domain::comparison::GateDecision;
use crate::domain::error::GateError;
use crate::domain::events::GateEvent;
use crate::domain::finding::Finding;
use crate::domain::image::{ImageDigest, ImageRecord, RepositoryName};
use crate::domain::severity::Severity;

/// Largest page the finding source accepts.
pub const MAX_FINDINGS_PAGE_SIZE: u32 = 100;

/// Only findings in this status are counted.
pub const ACTIVE_FINDING_STATUS: &str = "ACTIVE";

/// Image history source (registry listing)
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    /// Every known image of the repository, in no particular order
    async fn list_images(&self, repository: &RepositoryName) -> Result<Vec<ImageRecord>, UpstreamError>;
}

/// One page request against the finding source. Filters are AND-combined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingQuery {
    pub image_digest: ImageDigest,
    pub severity: Option<Severity>,
    pub status: String,
    pub page_size: u32,
    pub next_token: Option<String>,
}

impl FindingQuery {
    pub fn active(image_digest: ImageDigest, severity: Option<Severity>) -> Self {
        Self {
            image_digest,
            severity,
            status: ACTIVE_FINDING_STATUS.to_string(),
            page_size: MAX_FINDINGS_PAGE_SIZE,
            next_token: None,
        }
    }

    pub fn continued(&self, next_token: String) -> Self {
        Self {
            next_token: Some(next_token),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingPage {
    pub findings: Vec<Finding>,
    pub next_token: Option<String>,
}

/// Paginated vulnerability finding source
#[async_trait]
pub trait FindingSource: Send + Sync {
    async fn list_findings(&self, query: &FindingQuery) -> Result<FindingPage, UpstreamError>;
}

/// Delivery pipeline orchestrator (stage state + approval mutation)
#[async_trait]
pub trait PipelineOrchestrator: Send + Sync {
    async fn pipeline_state(&self, pipeline_name: &str) -> Result<PipelineState, UpstreamError>;

    async fn submit_approval(&self, submission: &ApprovalSubmission) -> Result<(), UpstreamError>;
}

/// A rendered message for the messaging sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Outbound gate events for downstream automation
#[async_trait]
pub trait EventSignal: Send + Sync {
    async fn emit(&self, event: &GateEvent) -> Result<(), UpstreamError>;
}

/// Static repository → pipeline lookup
pub trait PipelineDirectory: Send + Sync {
    fn pipeline_for(&self, repository: &RepositoryName) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticPipelineDirectory {
    mapping: HashMap<String, String>,
}

impl StaticPipelineDirectory {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Self { mapping }
    }
}

impl PipelineDirectory for StaticPipelineDirectory {
    fn pipeline_for(&self, repository: &RepositoryName) -> Option<String> {
        self.mapping.get(repository.as_str()).cloned()
    }
}

/// Redelivery guard key: the same image reaching the same decision twice is
/// the same gate outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub image_digest: ImageDigest,
    pub decision: GateDecision,
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.image_digest, self.decision)
    }
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn contains(&self, key: &IdempotencyKey) -> bool;

    /// Record a completed outcome
    async fn record(&self, key: IdempotencyKey);
}

/// Collaborator transport or decoding failure
#[derive(Debug, Clone, thiserror::Error)]
#[error("{collaborator}: {message}")]
pub struct UpstreamError {
    pub collaborator: String,
    pub message: String,
}

impl UpstreamError {
    pub fn new(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}

impl From<UpstreamError> for GateError {
    fn from(err: UpstreamError) -> Self {
        GateError::UpstreamQuery {
            collaborator: err.collaborator,
            message: err.message,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

impl From<NotifyError> for GateError {
    fn from(err: NotifyError) -> Self {
        GateError::Notification(err.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continued_query_keeps_filters() {
        let first = FindingQuery::active(ImageDigest::new("sha256:x"), Some(Severity::High));
        assert_eq!(first.page_size, MAX_FINDINGS_PAGE_SIZE);
        assert_eq!(first.status, "ACTIVE");

        let next = first.continued("t-2".into());
        assert_eq!(next.next_token.as_deref(), Some("t-2"));
        assert_eq!(next.severity, Some(Severity::High));
        assert_eq!(next.image_digest, first.image_digest);
    }

    #[test]
    fn test_static_directory_lookup() {
        let directory = StaticPipelineDirectory::new(HashMap::from([(
            "web".to_string(),
            "deploy-web".to_string(),
        )]));
        let web = RepositoryName::from_identifier("team/web").unwrap();
        let api = RepositoryName::from_identifier("team/api").unwrap();
        assert_eq!(directory.pipeline_for(&web).as_deref(), Some("deploy-web"));
        assert_eq!(directory.pipeline_for(&api), None);
    }

    #[test]
    fn test_upstream_error_maps_to_query_error() {
        let err: GateError = UpstreamError::new("finding-source", "503").into();
        assert_eq!(err.kind(), "upstream_query_error");
    }
}
