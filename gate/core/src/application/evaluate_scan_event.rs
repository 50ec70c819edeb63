// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Evaluate Scan Event Use Case
//!
//! Application service that handles one image scan event end to end.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Run one gate invocation inside its own tracing span
//!   and wall-clock budget, suppress redelivered events, and make sure every
//!   failure is notified before it is returned
//! - **Collaborators:**
//!   - Application: GateController
//!   - Domain: ScanEvent, GateOutcome, IdempotencyStore

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::application::gate_controller::{GateController, InvocationContext, UNKNOWN_IMAGE_TAG};
use crate::domain::error::GateError;
use crate::domain::gate::{GateOutcome, GateStage};
use crate::domain::ports::IdempotencyStore;
use crate::domain::scan_event::ScanEvent;

/// Reply to the invoking runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub status_code: u16,
    pub body: String,
    pub invocation_id: Uuid,
    pub outcome: GateOutcome,
}

impl InvocationResult {
    pub fn ok(invocation_id: Uuid, outcome: GateOutcome) -> Self {
        Self {
            status_code: 200,
            body: outcome.status_body().to_string(),
            invocation_id,
            outcome,
        }
    }
}

#[async_trait]
pub trait EvaluateScanEventUseCase: Send + Sync {
    /// Gate one scan event
    ///
    /// # Errors
    ///
    /// Any `GateError`; a failure notification has already been attempted
    /// when it is returned.
    async fn evaluate(&self, event: serde_json::Value) -> Result<InvocationResult, GateError>;
}

pub struct StandardEvaluateScanEventUseCase {
    controller: GateController,
    idempotency: Arc<dyn IdempotencyStore>,
    invocation_timeout: Option<Duration>,
}

impl StandardEvaluateScanEventUseCase {
    pub fn new(
        controller: GateController,
        idempotency: Arc<dyn IdempotencyStore>,
        invocation_timeout: Option<Duration>,
    ) -> Self {
        Self {
            controller,
            idempotency,
            invocation_timeout,
        }
    }

    async fn run(&self, ctx: &mut InvocationContext) -> Result<GateOutcome, GateError> {
        let work = async {
            let decision = self.controller.evaluate(ctx).await?;

            let key = ctx.idempotency_key();
            if let Some(key) = &key {
                if self.idempotency.contains(key).await {
                    info!(key = %key, "Event already handled, skipping enforcement");
                    return Ok(GateOutcome::Duplicate { decision });
                }
            }

            let outcome = self.controller.enforce(ctx).await?;

            if let Some(key) = key {
                self.idempotency.record(key).await;
            }
            Ok(outcome)
        };

        match self.invocation_timeout {
            Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
                GateError::Cancelled(format!(
                    "the invocation exceeded its {}s budget",
                    limit.as_secs_f64()
                ))
            })?,
            None => work.await,
        }
    }
}

#[async_trait]
impl EvaluateScanEventUseCase for StandardEvaluateScanEventUseCase {
    async fn evaluate(&self, event: serde_json::Value) -> Result<InvocationResult, GateError> {
        let invocation_id = Uuid::new_v4();

        let event = match ScanEvent::parse(event) {
            Ok(event) => event,
            Err(e) => {
                let span = info_span!("gate_invocation", invocation_id = %invocation_id);
                self.controller
                    .notify_failure(GateStage::ScanComparison, None, UNKNOWN_IMAGE_TAG, &e)
                    .instrument(span)
                    .await;
                return Err(e);
            }
        };

        let span = info_span!(
            "gate_invocation",
            invocation_id = %invocation_id,
            repository = %event.repository()
        );
        let mut ctx = InvocationContext::new(invocation_id, event);

        async {
            info!(repository_id = ctx.event().repository_id(), "Scan event received");
            match self.run(&mut ctx).await {
                Ok(outcome) => {
                    info!(
                        decision = %outcome.decision(),
                        body = outcome.status_body(),
                        "Gate invocation complete"
                    );
                    Ok(InvocationResult::ok(invocation_id, outcome))
                }
                Err(e) => {
                    self.controller.fail(&mut ctx, &e).await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}
