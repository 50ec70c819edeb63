// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Approval Handles
//!
//! Pipeline stage/action state as reported by the orchestrator, and the
//! per-invocation [`ApprovalRequest`] that tracks acquiring a token from it.
//!
//! ```text
//! PENDING ──token issued──▶ ACQUIRED
//!    │
//!    ├─stage absent──────▶ EXHAUSTED   (no retry)
//!    └─budget spent──────▶ EXHAUSTED
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::comparison::GateDecision;

pub const APPROVAL_STAGE_NAME: &str = "Approval";
pub const APPROVAL_ACTION_NAME: &str = "Approval";

/// Execution status the orchestrator reports while a manual approval waits.
const AWAITING_APPROVAL_STATUS: &str = "InProgress";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    #[serde(default)]
    pub stage_states: Vec<StageState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageState {
    pub stage_name: String,
    #[serde(default)]
    pub action_states: Vec<ActionState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    pub action_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_execution: Option<ActionExecution>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionExecution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// What a single pipeline-state read says about the approval token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    /// Stage exists and carries a token that has not been consumed.
    Ready(String),
    /// Stage exists but no usable token yet.
    NotReady,
    /// The pipeline has no approval stage at all.
    StageMissing,
}

impl PipelineState {
    pub fn approval_token(&self) -> TokenLookup {
        let Some(stage) = self
            .stage_states
            .iter()
            .find(|s| s.stage_name == APPROVAL_STAGE_NAME)
        else {
            return TokenLookup::StageMissing;
        };

        stage
            .action_states
            .iter()
            .find(|a| a.action_name == APPROVAL_ACTION_NAME)
            .and_then(|a| a.latest_execution.as_ref())
            .filter(|e| {
                e.status
                    .as_deref()
                    .map_or(true, |s| s == AWAITING_APPROVAL_STATUS)
            })
            .and_then(|e| e.token.clone())
            .filter(|t| !t.is_empty())
            .map_or(TokenLookup::NotReady, TokenLookup::Ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Acquired,
    Exhausted,
}

/// Tracks one attempt to obtain an approval token. Lives for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalRequest {
    pipeline_name: String,
    token: Option<String>,
    attempts_made: u32,
    status: ApprovalStatus,
}

impl ApprovalRequest {
    pub fn new(pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            token: None,
            attempts_made: 0,
            status: ApprovalStatus::Pending,
        }
    }

    pub fn record_attempt(&mut self) {
        self.attempts_made += 1;
    }

    pub fn acquire(&mut self, token: String) {
        if self.status == ApprovalStatus::Pending {
            self.token = Some(token);
            self.status = ApprovalStatus::Acquired;
        }
    }

    pub fn exhaust(&mut self) {
        if self.status == ApprovalStatus::Pending {
            self.status = ApprovalStatus::Exhausted;
        }
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn status(&self) -> ApprovalStatus {
        self.status
    }
}

/// Verdict submitted to the pipeline's approval action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalVerdict {
    Approved,
    Rejected,
}

impl ApprovalVerdict {
    /// `None` for a baseline: there is nothing to approve or reject.
    pub fn for_decision(decision: GateDecision) -> Option<Self> {
        match decision {
            GateDecision::Approve => Some(ApprovalVerdict::Approved),
            GateDecision::Reject => Some(ApprovalVerdict::Rejected),
            GateDecision::BaselineOnly => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalVerdict::Approved => "Approved",
            ApprovalVerdict::Rejected => "Rejected",
        }
    }
}

/// Body of the approval-result mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalSubmission {
    pub pipeline_name: String,
    pub stage_name: String,
    pub action_name: String,
    pub token: String,
    pub result: ApprovalResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResult {
    pub summary: String,
    pub status: ApprovalVerdict,
}

impl ApprovalSubmission {
    pub fn new(
        pipeline_name: impl Into<String>,
        token: impl Into<String>,
        verdict: ApprovalVerdict,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            stage_name: APPROVAL_STAGE_NAME.to_string(),
            action_name: APPROVAL_ACTION_NAME.to_string(),
            token: token.into(),
            result: ApprovalResult {
                summary: summary.into(),
                status: verdict,
            },
        }
    }
}
