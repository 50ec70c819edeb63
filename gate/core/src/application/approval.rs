// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Approval token acquisition.
//!
//! Reads the pipeline state until the approval action exposes an unconsumed
//! token, within the configured retry budget. A pipeline without an approval
//! stage fails at once; a token that is not ready yet, or a failed state
//! read, costs one attempt.

use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::application::retry::{RetryPolicy, Sleeper};
use crate::domain::approval::{ApprovalRequest, TokenLookup};
use crate::domain::error::GateError;
use crate::domain::ports::PipelineOrchestrator;

pub struct ApprovalAcquirer {
    orchestrator: Arc<dyn PipelineOrchestrator>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ApprovalAcquirer {
    pub fn new(
        orchestrator: Arc<dyn PipelineOrchestrator>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            orchestrator,
            policy,
            sleeper,
        }
    }

    /// Drive `request` to ACQUIRED or EXHAUSTED and return the token.
    ///
    /// # Errors
    ///
    /// - `ApprovalStageMissing`: the pipeline has no approval stage (not retried)
    /// - `ApprovalPending`: no token after every attempt, carrying the last
    ///   failed state read when there was one
    /// - `Cancelled`: a retry wait was interrupted
    pub async fn acquire(&self, request: &mut ApprovalRequest) -> Result<String, GateError> {
        let pipeline = request.pipeline_name().to_string();
        let last_error = Mutex::new(None);

        let retried = self
            .policy
            .run(self.sleeper.as_ref(), |attempt| {
                let orchestrator = self.orchestrator.clone();
                let pipeline = pipeline.clone();
                let last_error = &last_error;
                async move { read_token(orchestrator.as_ref(), &pipeline, attempt, last_error).await }
            })
            .await;

        for _ in 0..retried.attempts {
            request.record_attempt();
        }

        match retried.result {
            Ok(token) => {
                info!(pipeline = %pipeline, attempts = retried.attempts, "Approval token acquired");
                request.acquire(token.clone());
                Ok(token)
            }
            Err(e) => {
                warn!(pipeline = %pipeline, attempts = retried.attempts, error = %e, "Approval token not acquired");
                request.exhaust();
                Err(e)
            }
        }
    }
}

async fn read_token(
    orchestrator: &dyn PipelineOrchestrator,
    pipeline: &str,
    attempt: u32,
    last_error: &Mutex<Option<String>>,
) -> Result<String, GateError> {
    let pending = || GateError::ApprovalPending {
        pipeline: pipeline.to_string(),
        attempts: attempt,
        last_error: last_error.lock().ok().and_then(|last| last.clone()),
    };

    let state = match orchestrator.pipeline_state(pipeline).await {
        Ok(state) => state,
        Err(e) => {
            warn!(pipeline = %pipeline, attempt, error = %e, "Pipeline state query failed");
            if let Ok(mut last) = last_error.lock() {
                *last = Some(e.to_string());
            }
            return Err(pending());
        }
    };

    match state.approval_token() {
        TokenLookup::Ready(token) => Ok(token),
        TokenLookup::NotReady => Err(pending()),
        TokenLookup::StageMissing => Err(GateError::ApprovalStageMissing {
            pipeline: pipeline.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::RecordingSleeper;
    use crate::domain::approval::ApprovalStatus;
    use crate::infrastructure::in_memory::InMemoryPipelineOrchestrator;
    use std::time::Duration;

    fn acquirer(
        orchestrator: Arc<InMemoryPipelineOrchestrator>,
        sleeper: Arc<RecordingSleeper>,
    ) -> ApprovalAcquirer {
        ApprovalAcquirer::new(orchestrator, RetryPolicy::new(3, Duration::from_secs(60)), sleeper)
    }

    #[tokio::test]
    async fn test_token_on_third_attempt() {
        let orchestrator = Arc::new(InMemoryPipelineOrchestrator::new());
        orchestrator.script(
            "deploy-web",
            vec![
                InMemoryPipelineOrchestrator::awaiting(None),
                InMemoryPipelineOrchestrator::awaiting(None),
                InMemoryPipelineOrchestrator::awaiting(Some("tok-3")),
            ],
        );
        let sleeper = Arc::new(RecordingSleeper::new());

        let mut request = ApprovalRequest::new("deploy-web");
        let token = acquirer(orchestrator, sleeper.clone())
            .acquire(&mut request)
            .await
            .unwrap();

        assert_eq!(token, "tok-3");
        assert_eq!(request.status(), ApprovalStatus::Acquired);
        assert_eq!(request.attempts_made(), 3);
        assert_eq!(sleeper.waits().len(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_after_three_attempts() {
        let orchestrator = Arc::new(InMemoryPipelineOrchestrator::new());
        orchestrator.script("deploy-web", vec![InMemoryPipelineOrchestrator::awaiting(None)]);
        let sleeper = Arc::new(RecordingSleeper::new());

        let mut request = ApprovalRequest::new("deploy-web");
        let err = acquirer(orchestrator.clone(), sleeper.clone())
            .acquire(&mut request)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "deploy-web : Failed to obtain approval token after 3 attempts"
        );
        assert_eq!(request.status(), ApprovalStatus::Exhausted);
        assert_eq!(orchestrator.state_reads("deploy-web"), 3);
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(60); 2]);
    }

    #[tokio::test]
    async fn test_missing_stage_is_not_retried() {
        let orchestrator = Arc::new(InMemoryPipelineOrchestrator::new());
        orchestrator.script("deploy-web", vec![InMemoryPipelineOrchestrator::without_approval_stage()]);
        let sleeper = Arc::new(RecordingSleeper::new());

        let mut request = ApprovalRequest::new("deploy-web");
        let err = acquirer(orchestrator.clone(), sleeper.clone())
            .acquire(&mut request)
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::ApprovalStageMissing { .. }));
        assert_eq!(request.status(), ApprovalStatus::Exhausted);
        assert_eq!(orchestrator.state_reads("deploy-web"), 1);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_state_read_failure_counts_as_attempt() {
        // unknown pipeline: every state read fails
        let orchestrator = Arc::new(InMemoryPipelineOrchestrator::new());
        let sleeper = Arc::new(RecordingSleeper::new());

        let mut request = ApprovalRequest::new("ghost");
        let err = acquirer(orchestrator, sleeper.clone())
            .acquire(&mut request)
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::ApprovalPending { attempts: 3, .. }));
        assert_eq!(sleeper.waits().len(), 2);
        assert_eq!(
            err.to_string(),
            "ghost : Failed to obtain approval token after 3 attempts \
             (last error: pipeline-orchestrator: pipeline not found: ghost)"
        );
    }

    #[tokio::test]
    async fn test_last_failed_read_survives_a_later_not_ready_read() {
        let orchestrator = Arc::new(InMemoryPipelineOrchestrator::new());
        orchestrator.script("deploy-web", vec![InMemoryPipelineOrchestrator::awaiting(None)]);
        orchestrator.fail_state_reads("deploy-web", 1);
        let sleeper = Arc::new(RecordingSleeper::new());

        let mut request = ApprovalRequest::new("deploy-web");
        let err = acquirer(orchestrator, sleeper)
            .acquire(&mut request)
            .await
            .unwrap_err();

        match err {
            GateError::ApprovalPending { attempts, last_error, .. } => {
                assert_eq!(attempts, 3);
                assert!(last_error.unwrap().contains("state read failed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
