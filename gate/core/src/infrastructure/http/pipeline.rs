// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{build_client, check_status, endpoint, transport};
use crate::domain::approval::{ApprovalSubmission, PipelineState};
use crate::domain::ports::{PipelineOrchestrator, UpstreamError};

const COLLABORATOR: &str = "pipeline-orchestrator";

/// Delivery pipeline over HTTP.
///
/// - `GET {base}/pipelines/{name}/state`
/// - `POST {base}/pipelines/{name}/approval-result`
pub struct HttpPipelineOrchestrator {
    base_url: String,
    client: Client,
}

impl HttpPipelineOrchestrator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client: build_client(timeout),
        }
    }
}

#[async_trait]
impl PipelineOrchestrator for HttpPipelineOrchestrator {
    async fn pipeline_state(&self, pipeline_name: &str) -> Result<PipelineState, UpstreamError> {
        let url = endpoint(COLLABORATOR, &self.base_url, &["pipelines", pipeline_name, "state"])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport(COLLABORATOR, e))?;

        let state: PipelineState = check_status(COLLABORATOR, response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::new(COLLABORATOR, format!("invalid pipeline state: {e}")))?;

        debug!(pipeline = pipeline_name, stages = state.stage_states.len(), "Read pipeline state");
        Ok(state)
    }

    async fn submit_approval(&self, submission: &ApprovalSubmission) -> Result<(), UpstreamError> {
        let url = endpoint(
            COLLABORATOR,
            &self.base_url,
            &["pipelines", submission.pipeline_name.as_str(), "approval-result"],
        )?;
        let response = self
            .client
            .post(url)
            .json(submission)
            .send()
            .await
            .map_err(|e| transport(COLLABORATOR, e))?;

        check_status(COLLABORATOR, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::approval::{ApprovalVerdict, TokenLookup};
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_reads_state() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pipelines/deploy-web/state")
            .with_status(200)
            .with_body(
                json!({
                    "pipelineName": "deploy-web",
                    "stageStates": [
                        {"stageName": "Source", "actionStates": []},
                        {"stageName": "Approval", "actionStates": [
                            {"actionName": "Approval", "latestExecution": {"token": "tok-9", "status": "InProgress"}}
                        ]}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let orchestrator = HttpPipelineOrchestrator::new(server.url(), Duration::from_secs(5));
        let state = orchestrator.pipeline_state("deploy-web").await.unwrap();

        mock.assert_async().await;
        assert_eq!(state.approval_token(), TokenLookup::Ready("tok-9".into()));
    }

    #[tokio::test]
    async fn test_submits_approval_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/pipelines/deploy-web/approval-result")
            .match_body(Matcher::Json(json!({
                "pipelineName": "deploy-web",
                "stageName": "Approval",
                "actionName": "Approval",
                "token": "tok-9",
                "result": {"summary": "Deployment is approved.", "status": "Approved"}
            })))
            .with_status(200)
            .create_async()
            .await;

        let orchestrator = HttpPipelineOrchestrator::new(server.url(), Duration::from_secs(5));
        let submission = ApprovalSubmission::new(
            "deploy-web",
            "tok-9",
            ApprovalVerdict::Approved,
            "Deployment is approved.",
        );
        orchestrator.submit_approval(&submission).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_submission_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/pipelines/deploy-web/approval-result")
            .with_status(409)
            .with_body("token already used")
            .create_async()
            .await;

        let orchestrator = HttpPipelineOrchestrator::new(server.url(), Duration::from_secs(5));
        let submission = ApprovalSubmission::new("deploy-web", "old", ApprovalVerdict::Rejected, "no");
        let err = orchestrator.submit_approval(&submission).await.unwrap_err();
        assert!(err.message.contains("409"));
    }
}
