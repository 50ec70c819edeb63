// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod approval;
pub mod evaluate_scan_event;
pub mod finding_aggregator;
pub mod gate_controller;
pub mod image_history;
pub mod manual_review;
pub mod retry;

// Re-export use cases for convenience
pub use evaluate_scan_event::{EvaluateScanEventUseCase, InvocationResult, StandardEvaluateScanEventUseCase};
pub use manual_review::{ReviewDecision, StandardSubmitReviewUseCase, SubmitReviewUseCase};
