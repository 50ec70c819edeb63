// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::application::evaluate_scan_event::EvaluateScanEventUseCase;
use crate::application::manual_review::{ReviewDecision, SubmitReviewUseCase};
use crate::domain::approval::ApprovalVerdict;
use crate::domain::error::GateError;

pub struct AppState {
    pub evaluate: Arc<dyn EvaluateScanEventUseCase>,
    pub review: Arc<dyn SubmitReviewUseCase>,
}

pub fn app(evaluate: Arc<dyn EvaluateScanEventUseCase>, review: Arc<dyn SubmitReviewUseCase>) -> Router {
    let state = Arc::new(AppState { evaluate, review });

    Router::new()
        .route("/events", post(receive_event))
        .route("/approve", get(approve))
        .route("/reject", get(reject))
        .route("/health", get(health))
        .with_state(state)
}

fn status_for(error: &GateError) -> StatusCode {
    match error {
        GateError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
        GateError::NotFound { .. } => StatusCode::NOT_FOUND,
        GateError::ApprovalStageMissing { .. } => StatusCode::CONFLICT,
        GateError::ApprovalPending { .. } | GateError::Cancelled(_) => StatusCode::GATEWAY_TIMEOUT,
        GateError::UpstreamQuery { .. }
        | GateError::PipelineMutation { .. }
        | GateError::InconsistentCounts { .. }
        | GateError::Notification(_) => StatusCode::BAD_GATEWAY,
        GateError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: GateError) -> Response {
    let status = status_for(&error);
    (
        status,
        Json(json!({
            "statusCode": status.as_u16(),
            "error": error.kind(),
            "message": error.to_string(),
        })),
    )
        .into_response()
}

async fn receive_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<serde_json::Value>,
) -> Response {
    match state.evaluate.evaluate(event).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            warn!(error = %e, kind = e.kind(), "Gate invocation failed");
            error_response(e)
        }
    }
}

async fn submit_review(state: &AppState, review: ReviewDecision, verdict: ApprovalVerdict) -> Response {
    let pipeline = review.pipeline_name.clone();
    match state.review.submit(review, verdict).await {
        Ok(()) => Json(json!({
            "pipelineName": pipeline,
            "status": verdict.as_str(),
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, pipeline = %pipeline, "Review submission failed");
            error_response(e)
        }
    }
}

async fn approve(State(state): State<Arc<AppState>>, Query(review): Query<ReviewDecision>) -> Response {
    submit_review(&state, review, ApprovalVerdict::Approved).await
}

async fn reject(State(state): State<Arc<AppState>>, Query(review): Query<ReviewDecision>) -> Response {
    submit_review(&state, review, ApprovalVerdict::Rejected).await
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::evaluate_scan_event::InvocationResult;
    use crate::domain::comparison::GateDecision;
    use crate::domain::gate::GateOutcome;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Mutex;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct FixedEvaluate(fn() -> Result<InvocationResult, GateError>);

    #[async_trait]
    impl EvaluateScanEventUseCase for FixedEvaluate {
        async fn evaluate(&self, _event: serde_json::Value) -> Result<InvocationResult, GateError> {
            (self.0)()
        }
    }

    #[derive(Default)]
    struct CapturingReview {
        seen: Mutex<Vec<(ReviewDecision, ApprovalVerdict)>>,
    }

    #[async_trait]
    impl SubmitReviewUseCase for CapturingReview {
        async fn submit(&self, review: ReviewDecision, verdict: ApprovalVerdict) -> Result<(), GateError> {
            self.seen.lock().unwrap().push((review, verdict));
            Ok(())
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_event() -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/events")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"detail": {"repository-name": "arn:aws:ecr:r:1:repository/web"}}"#))
            .unwrap()
    }

    #[tokio::test]
    async fn test_event_success_returns_invocation_result() {
        let router = app(
            Arc::new(FixedEvaluate(|| {
                Ok(InvocationResult::ok(
                    Uuid::nil(),
                    GateOutcome::Compared {
                        decision: GateDecision::Approve,
                    },
                ))
            })),
            Arc::new(CapturingReview::default()),
        );

        let response = router.oneshot(post_event()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["statusCode"], 200);
    }

    #[tokio::test]
    async fn test_event_failure_maps_error_kind() {
        let router = app(
            Arc::new(FixedEvaluate(|| {
                Err(GateError::ApprovalStageMissing {
                    pipeline: "deploy-web".into(),
                })
            })),
            Arc::new(CapturingReview::default()),
        );

        let response = router.oneshot(post_event()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"], "approval_stage_missing_error");
        assert!(body["message"].as_str().unwrap().contains("deploy-web"));
    }

    #[tokio::test]
    async fn test_reject_link_submits_rejection() {
        let review = Arc::new(CapturingReview::default());
        let router = app(
            Arc::new(FixedEvaluate(|| Err(GateError::InvalidEvent("unused".into())))),
            review.clone(),
        );

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/reject?token=tok-1&pipelineName=deploy-web&decision=reject")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let seen = review.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.token, "tok-1");
        assert_eq!(seen[0].1, ApprovalVerdict::Rejected);
    }

    #[tokio::test]
    async fn test_health() {
        let router = app(
            Arc::new(FixedEvaluate(|| Err(GateError::InvalidEvent("unused".into())))),
            Arc::new(CapturingReview::default()),
        );
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
