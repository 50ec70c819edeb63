// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Gate Error Taxonomy
//!
//! | Variant | Retried | Raised by |
//! |---------|---------|-----------|
//! | `Configuration` | no | pipeline lookup, config validation |
//! | `NotFound` | no | image history resolver |
//! | `UpstreamQuery` | no | finding aggregator, image history resolver |
//! | `ApprovalPending` | within the retry budget | approval acquisition |
//! | `ApprovalStageMissing` | no | approval acquisition |
//! | `PipelineMutation` | no | decision apply |
//! | `InvalidEvent` | no | trigger event parsing |
//! | `InconsistentCounts` | no | delta engine (negative `OTHER`) |
//! | `Notification` | no | report / failure delivery |
//! | `Cancelled` | no | retry wait interrupted by deadline or shutdown |
//!
//! Every variant that reaches the top-level handler is notified before it is
//! returned to the caller.

use crate::domain::image::ImageDigest;

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No images found in repository: {repository}")]
    NotFound { repository: String },

    #[error("Upstream query to {collaborator} failed: {message}")]
    UpstreamQuery { collaborator: String, message: String },

    #[error(
        "{pipeline} : Failed to obtain approval token after {attempts} attempts{}",
        last_error_suffix(.last_error)
    )]
    ApprovalPending {
        pipeline: String,
        attempts: u32,
        /// Most recent failed state read, if any attempt hit one
        last_error: Option<String>,
    },

    #[error("Approval stage not found in the pipeline: {pipeline}")]
    ApprovalStageMissing { pipeline: String },

    #[error("Pipeline {pipeline} refused the approval result: {message}")]
    PipelineMutation { pipeline: String, message: String },

    #[error("Invalid scan event: {0}")]
    InvalidEvent(String),

    #[error("Inconsistent finding counts for {image_digest}: total {total} is below the known-severity sum {known}")]
    InconsistentCounts {
        image_digest: ImageDigest,
        total: u64,
        known: u64,
    },

    #[error("Notification delivery failed: {0}")]
    Notification(String),

    #[error("Invocation cancelled while {0}")]
    Cancelled(String),
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(message) => format!(" (last error: {message})"),
        None => String::new(),
    }
}

impl GateError {
    /// Stable identifier used in logs, events and HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::Configuration(_) => "configuration_error",
            GateError::NotFound { .. } => "not_found_error",
            GateError::UpstreamQuery { .. } => "upstream_query_error",
            GateError::ApprovalPending { .. } => "approval_pending_error",
            GateError::ApprovalStageMissing { .. } => "approval_stage_missing_error",
            GateError::PipelineMutation { .. } => "pipeline_mutation_error",
            GateError::InvalidEvent(_) => "invalid_event_error",
            GateError::InconsistentCounts { .. } => "inconsistent_counts_error",
            GateError::Notification(_) => "notification_error",
            GateError::Cancelled(_) => "cancelled",
        }
    }

    /// Only a not-yet-issued approval token is worth waiting for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GateError::ApprovalPending { .. })
    }
}
