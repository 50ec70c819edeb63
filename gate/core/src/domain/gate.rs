// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Gate State Machine: one run per invocation
//!
//! ```text
//! Start ──previous absent──▶ BaselineRecorded                      (terminal)
//!   │
//!   └──▶ Compared ──no manual gate──────────────────────▶ Done     (terminal)
//!           │
//!           └──▶ AcquireApproval ──token──▶ Apply ──────▶ Done
//!
//! any non-terminal state ──error──▶ Failed                         (terminal)
//! ```
//!
//! The profile selects which severities are title-tracked, which of those can
//! reject, whether the repository has a manual approval gate, and whether gate
//! events are signalled downstream.

use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalVerdict;
use crate::domain::comparison::GateDecision;
use crate::domain::severity::Severity;

/// Gating behaviour selected by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateProfile {
    /// Track HIGH titles separately alongside CRITICAL
    #[serde(default = "default_true")]
    pub track_high: bool,

    /// Severities whose new titles turn the decision into REJECT
    #[serde(default = "default_gate_on")]
    pub gate_on: Vec<Severity>,

    /// Repository has a manual approval stage to drive
    #[serde(default)]
    pub gate_on_approval: bool,

    /// Emit gate events to the event signal port
    #[serde(default)]
    pub emit_event_signal: bool,
}

fn default_true() -> bool {
    true
}

fn default_gate_on() -> Vec<Severity> {
    vec![Severity::Critical]
}

impl Default for GateProfile {
    fn default() -> Self {
        Self {
            track_high: true,
            gate_on: default_gate_on(),
            gate_on_approval: false,
            emit_event_signal: false,
        }
    }
}

impl GateProfile {
    /// CRITICAL always, HIGH when `track_high` is set.
    pub fn tracked_severities(&self) -> Vec<Severity> {
        let mut tracked = vec![Severity::Critical];
        if self.track_high {
            tracked.push(Severity::High);
        }
        tracked
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.gate_on.is_empty() {
            return Err("profile.gate_on must name at least one severity".to_string());
        }
        let tracked = self.tracked_severities();
        for severity in &self.gate_on {
            if !tracked.contains(severity) {
                return Err(format!(
                    "profile.gate_on includes {} which is not title-tracked (tracked: {:?})",
                    severity, tracked
                ));
            }
        }
        Ok(())
    }
}

/// How an acquired approval token is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Submit Approved/Rejected directly
    #[default]
    AutoApply,
    /// Send approve/reject links to a human instead
    ManualReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateState {
    Start,
    BaselineRecorded,
    Compared(GateDecision),
    AcquireApproval,
    Apply,
    Done,
    Failed,
}

impl GateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GateState::BaselineRecorded | GateState::Done | GateState::Failed)
    }

    pub fn can_transition_to(&self, next: &GateState) -> bool {
        use GateState::*;
        match (self, next) {
            (_, Failed) => !self.is_terminal(),
            (Start, BaselineRecorded) => true,
            (Start, Compared(d)) => *d != GateDecision::BaselineOnly,
            (Compared(_), AcquireApproval) => true,
            (Compared(_), Done) => true,
            (AcquireApproval, Apply) => true,
            (Apply, Done) => true,
            _ => false,
        }
    }
}

/// Where a failure happened, used in failure notification subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateStage {
    ScanComparison,
    DeploymentApproval,
}

impl GateStage {
    pub fn label(&self) -> &'static str {
        match self {
            GateStage::ScanComparison => "Scan Comparison",
            GateStage::DeploymentApproval => "Approving Deployment",
        }
    }
}

/// Terminal result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    BaselineRecorded,
    Compared {
        decision: GateDecision,
    },
    Applied {
        decision: GateDecision,
        pipeline: String,
        verdict: ApprovalVerdict,
    },
    AwaitingManualReview {
        decision: GateDecision,
        pipeline: String,
    },
    Duplicate {
        decision: GateDecision,
    },
}

impl GateOutcome {
    pub fn decision(&self) -> GateDecision {
        match self {
            GateOutcome::BaselineRecorded => GateDecision::BaselineOnly,
            GateOutcome::Compared { decision }
            | GateOutcome::Applied { decision, .. }
            | GateOutcome::AwaitingManualReview { decision, .. }
            | GateOutcome::Duplicate { decision } => *decision,
        }
    }

    /// Short status body returned to the invoking runtime
    pub fn status_body(&self) -> &'static str {
        match self {
            GateOutcome::BaselineRecorded => "Baseline scan recorded.",
            GateOutcome::Compared { .. } | GateOutcome::Applied { .. } => {
                "Vulnerability comparison complete."
            }
            GateOutcome::AwaitingManualReview { .. } => "Approval requested for manual review.",
            GateOutcome::Duplicate { .. } => "Duplicate event ignored.",
        }
    }
}
