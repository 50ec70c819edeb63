// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Manual Review
//!
//! In manual review mode the gate does not submit a verdict itself. It sends
//! approve/reject links carrying the approval token; following a link lands
//! on the HTTP surface, which calls [`SubmitReviewUseCase`].

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::approval::{ApprovalSubmission, ApprovalVerdict};
use crate::domain::error::GateError;
use crate::domain::events::GateEvent;
use crate::domain::ports::{EventSignal, PipelineOrchestrator};
use crate::domain::report::ReviewLinks;

/// `{base}/approve?token=…&decision=approve&pipelineName=…` and the reject twin.
pub fn review_links(base_url: &str, pipeline: &str, token: &str) -> Result<ReviewLinks, GateError> {
    Ok(ReviewLinks {
        approve: review_link(base_url, "approve", pipeline, token)?,
        reject: review_link(base_url, "reject", pipeline, token)?,
    })
}

fn review_link(base_url: &str, decision: &str, pipeline: &str, token: &str) -> Result<String, GateError> {
    let invalid = |reason: String| {
        GateError::Configuration(format!("invalid approval.link_base_url '{base_url}': {reason}"))
    };

    let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| invalid("cannot carry a path".to_string()))?;
        segments.pop_if_empty().push(decision);
    }
    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("decision", decision)
        .append_pair("pipelineName", pipeline);
    Ok(url.to_string())
}

/// Query string of a followed review link.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDecision {
    pub token: String,
    pub pipeline_name: String,
    #[serde(default)]
    pub decision: Option<String>,
}

#[async_trait]
pub trait SubmitReviewUseCase: Send + Sync {
    /// Submit the reviewer's verdict against the approval token.
    ///
    /// # Errors
    ///
    /// - InvalidEvent: empty token or pipeline name, or a decision that
    ///   contradicts the link followed
    /// - PipelineMutation: the orchestrator refused the result
    async fn submit(&self, review: ReviewDecision, verdict: ApprovalVerdict) -> Result<(), GateError>;
}

pub struct StandardSubmitReviewUseCase {
    orchestrator: Arc<dyn PipelineOrchestrator>,
    events: Option<Arc<dyn EventSignal>>,
}

impl StandardSubmitReviewUseCase {
    pub fn new(orchestrator: Arc<dyn PipelineOrchestrator>, events: Option<Arc<dyn EventSignal>>) -> Self {
        Self { orchestrator, events }
    }
}

#[async_trait]
impl SubmitReviewUseCase for StandardSubmitReviewUseCase {
    async fn submit(&self, review: ReviewDecision, verdict: ApprovalVerdict) -> Result<(), GateError> {
        if review.token.is_empty() || review.pipeline_name.is_empty() {
            return Err(GateError::InvalidEvent(
                "review link requires token and pipelineName".to_string(),
            ));
        }

        let expected = match verdict {
            ApprovalVerdict::Approved => "approve",
            ApprovalVerdict::Rejected => "reject",
        };
        if let Some(decision) = review.decision.as_deref() {
            if !decision.eq_ignore_ascii_case(expected) {
                return Err(GateError::InvalidEvent(format!(
                    "decision '{decision}' does not match the {expected} link"
                )));
            }
        }

        let summary = match verdict {
            ApprovalVerdict::Approved => "Deployment approved by reviewer.",
            ApprovalVerdict::Rejected => "Deployment rejected by reviewer.",
        };
        let submission = ApprovalSubmission::new(&review.pipeline_name, &review.token, verdict, summary);

        self.orchestrator
            .submit_approval(&submission)
            .await
            .map_err(|e| GateError::PipelineMutation {
                pipeline: review.pipeline_name.clone(),
                message: e.to_string(),
            })?;

        info!(pipeline = %review.pipeline_name, verdict = verdict.as_str(), "Manual review submitted");

        if let Some(events) = &self.events {
            let event = GateEvent::DecisionApplied {
                invocation_id: Uuid::new_v4(),
                pipeline: review.pipeline_name,
                verdict,
                applied_at: Utc::now(),
            };
            if let Err(e) = events.emit(&event).await {
                warn!(error = %e, "Failed to emit gate event");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryPipelineOrchestrator;

    #[test]
    fn test_links_carry_token_and_pipeline() {
        let links = review_links("https://gate.example.com/review/", "deploy web", "tok+1").unwrap();
        assert_eq!(
            links.approve,
            "https://gate.example.com/review/approve?token=tok%2B1&decision=approve&pipelineName=deploy+web"
        );
        assert!(links.reject.starts_with("https://gate.example.com/review/reject?token="));
        assert!(links.reject.contains("decision=reject"));
    }

    #[test]
    fn test_invalid_base_url_is_configuration_error() {
        assert!(matches!(
            review_links("not a url", "p", "t"),
            Err(GateError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_sends_verdict() {
        let orchestrator = Arc::new(InMemoryPipelineOrchestrator::new());
        let use_case = StandardSubmitReviewUseCase::new(orchestrator.clone(), None);

        use_case
            .submit(
                ReviewDecision {
                    token: "tok".into(),
                    pipeline_name: "deploy-web".into(),
                    decision: Some("reject".into()),
                },
                ApprovalVerdict::Rejected,
            )
            .await
            .unwrap();

        let submissions = orchestrator.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].token, "tok");
        assert_eq!(submissions[0].result.status, ApprovalVerdict::Rejected);
        assert_eq!(submissions[0].stage_name, "Approval");
    }

    #[tokio::test]
    async fn test_mismatched_decision_is_refused() {
        let orchestrator = Arc::new(InMemoryPipelineOrchestrator::new());
        let use_case = StandardSubmitReviewUseCase::new(orchestrator.clone(), None);

        let err = use_case
            .submit(
                ReviewDecision {
                    token: "tok".into(),
                    pipeline_name: "deploy-web".into(),
                    decision: Some("reject".into()),
                },
                ApprovalVerdict::Approved,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::InvalidEvent(_)));
        assert!(orchestrator.submissions().is_empty());
    }
}
