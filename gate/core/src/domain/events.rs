// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::ApprovalVerdict;
use crate::domain::comparison::GateDecision;
use crate::domain::image::ImageDigest;

/// Signals emitted while a scan event moves through the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateEvent {
    BaselineRecorded {
        invocation_id: Uuid,
        repository: String,
        image_digest: ImageDigest,
        recorded_at: DateTime<Utc>,
    },
    ComparisonCompleted {
        invocation_id: Uuid,
        repository: String,
        image_digest: ImageDigest,
        previous_digest: ImageDigest,
        decision: GateDecision,
        new_findings: Vec<String>,
        resolved_findings: Vec<String>,
        completed_at: DateTime<Utc>,
    },
    ApprovalAcquired {
        invocation_id: Uuid,
        pipeline: String,
        attempts: u32,
        acquired_at: DateTime<Utc>,
    },
    DecisionApplied {
        invocation_id: Uuid,
        pipeline: String,
        verdict: ApprovalVerdict,
        applied_at: DateTime<Utc>,
    },
    ManualReviewRequested {
        invocation_id: Uuid,
        pipeline: String,
        recommended: GateDecision,
        requested_at: DateTime<Utc>,
    },
    GateFailed {
        invocation_id: Uuid,
        repository: String,
        stage: String,
        error_kind: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl GateEvent {
    pub fn invocation_id(&self) -> Uuid {
        match self {
            GateEvent::BaselineRecorded { invocation_id, .. }
            | GateEvent::ComparisonCompleted { invocation_id, .. }
            | GateEvent::ApprovalAcquired { invocation_id, .. }
            | GateEvent::DecisionApplied { invocation_id, .. }
            | GateEvent::ManualReviewRequested { invocation_id, .. }
            | GateEvent::GateFailed { invocation_id, .. } => *invocation_id,
        }
    }
}
