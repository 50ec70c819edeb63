// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Gate Controller
//!
//! Drives one [`InvocationContext`] through the gate state machine:
//!
//! 1. `evaluate`: pipeline lookup (approval gate only), image history,
//!    finding snapshots, comparison. Ends in `BaselineRecorded` or `Compared`.
//! 2. `enforce`: publishes the report and, behind an approval gate, acquires
//!    the token and applies (or hands off for review) the decision. The
//!    report always goes out before the pipeline is read or mutated.
//! 3. `fail`: failure notification and event. Never masks the original error.
//!
//! All per-run state lives in the context; the controller itself only holds
//! collaborator handles and settings.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::approval::ApprovalAcquirer;
use crate::application::finding_aggregator::FindingAggregator;
use crate::application::image_history::ImageHistoryResolver;
use crate::application::manual_review::review_links;
use crate::application::retry::{RetryPolicy, Sleeper};
use crate::domain::approval::{ApprovalRequest, ApprovalSubmission, ApprovalVerdict};
use crate::domain::comparison::{ComparisonReport, GateDecision};
use crate::domain::config::{ApprovalConfig, GateConfigSpec};
use crate::domain::error::GateError;
use crate::domain::events::GateEvent;
use crate::domain::gate::{ApprovalMode, GateOutcome, GateProfile, GateStage, GateState};
use crate::domain::image::{ImageHistory, RepositoryName};
use crate::domain::ports::{
    EventSignal, FindingSource, IdempotencyKey, ImageRegistry, Notification, Notifier,
    PipelineDirectory, PipelineOrchestrator,
};
use crate::domain::report::{
    failure_notification, manual_review_notification, report_notification, ApprovalSection,
    GateReport,
};
use crate::domain::scan_event::ScanEvent;

/// Image tag used in subjects before the history is known.
pub const UNKNOWN_IMAGE_TAG: &str = "unknown";

const AWAITING_REVIEW_STATUS: &str = "AwaitingManualReview";

/// Everything one invocation accumulates. Created per scan event, dropped
/// when the invocation returns.
#[derive(Debug)]
pub struct InvocationContext {
    invocation_id: Uuid,
    event: ScanEvent,
    state: GateState,
    transitions: Vec<GateState>,
    pipeline: Option<String>,
    history: Option<ImageHistory>,
    report: Option<ComparisonReport>,
    approval: Option<ApprovalRequest>,
}

impl InvocationContext {
    pub fn new(invocation_id: Uuid, event: ScanEvent) -> Self {
        Self {
            invocation_id,
            event,
            state: GateState::Start,
            transitions: vec![GateState::Start],
            pipeline: None,
            history: None,
            report: None,
            approval: None,
        }
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    pub fn event(&self) -> &ScanEvent {
        &self.event
    }

    pub fn repository(&self) -> &RepositoryName {
        self.event.repository()
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Every state visited, in order, starting with `Start`.
    pub fn transitions(&self) -> &[GateState] {
        &self.transitions
    }

    pub fn pipeline(&self) -> Option<&str> {
        self.pipeline.as_deref()
    }

    pub fn history(&self) -> Option<&ImageHistory> {
        self.history.as_ref()
    }

    pub fn report(&self) -> Option<&ComparisonReport> {
        self.report.as_ref()
    }

    pub fn approval(&self) -> Option<&ApprovalRequest> {
        self.approval.as_ref()
    }

    pub fn image_tag(&self) -> String {
        self.history
            .as_ref()
            .map(|h| h.latest.tag_label())
            .unwrap_or_else(|| UNKNOWN_IMAGE_TAG.to_string())
    }

    /// Available once the comparison stage has produced a decision.
    pub fn idempotency_key(&self) -> Option<IdempotencyKey> {
        self.report.as_ref().map(|r| IdempotencyKey {
            image_digest: r.latest_image().digest.clone(),
            decision: r.decision(),
        })
    }

    /// Stage named in failure notifications for the current state.
    pub fn stage(&self) -> GateStage {
        match self.state {
            GateState::AcquireApproval | GateState::Apply => GateStage::DeploymentApproval,
            _ => GateStage::ScanComparison,
        }
    }

    fn advance(&mut self, next: GateState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal gate transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "Gate transition");
        self.state = next;
        self.transitions.push(next);
    }
}

/// Settings the controller reads on every invocation.
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub profile: GateProfile,
    pub system_tag: String,
    pub approval: ApprovalConfig,
}

impl From<&GateConfigSpec> for GateSettings {
    fn from(spec: &GateConfigSpec) -> Self {
        Self {
            profile: spec.profile.clone(),
            system_tag: spec.system_tag.clone(),
            approval: spec.approval.clone(),
        }
    }
}

/// Stateless collaborator handles shared by every invocation.
#[derive(Clone)]
pub struct GateCollaborators {
    pub registry: Arc<dyn ImageRegistry>,
    pub findings: Arc<dyn FindingSource>,
    pub orchestrator: Arc<dyn PipelineOrchestrator>,
    pub notifier: Arc<dyn Notifier>,
    pub directory: Arc<dyn PipelineDirectory>,
    pub events: Option<Arc<dyn EventSignal>>,
    pub sleeper: Arc<dyn Sleeper>,
}

pub struct GateController {
    resolver: ImageHistoryResolver,
    aggregator: FindingAggregator,
    acquirer: ApprovalAcquirer,
    orchestrator: Arc<dyn PipelineOrchestrator>,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn PipelineDirectory>,
    events: Option<Arc<dyn EventSignal>>,
    settings: GateSettings,
}

impl GateController {
    pub fn new(collaborators: GateCollaborators, settings: GateSettings, retry: RetryPolicy) -> Self {
        Self {
            resolver: ImageHistoryResolver::new(collaborators.registry),
            aggregator: FindingAggregator::new(collaborators.findings),
            acquirer: ApprovalAcquirer::new(
                collaborators.orchestrator.clone(),
                retry,
                collaborators.sleeper,
            ),
            orchestrator: collaborators.orchestrator,
            notifier: collaborators.notifier,
            directory: collaborators.directory,
            events: collaborators.events,
            settings,
        }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    /// Comparison stage. Leaves the context in `BaselineRecorded` or
    /// `Compared`.
    pub async fn evaluate(&self, ctx: &mut InvocationContext) -> Result<GateDecision, GateError> {
        let repository = ctx.repository().clone();

        // resolved before any query so an unmapped repository fails fast
        if self.settings.profile.gate_on_approval {
            let pipeline = self.directory.pipeline_for(&repository).ok_or_else(|| {
                GateError::Configuration(format!(
                    "No pipeline configured for repository: {repository}"
                ))
            })?;
            debug!(pipeline = %pipeline, "Resolved approval pipeline");
            ctx.pipeline = Some(pipeline);
        }

        let history = self.resolver.resolve(&repository).await?;
        ctx.history = Some(history.clone());
        info!(
            latest = %history.latest.digest,
            previous = history.previous.as_ref().map(|p| p.digest.to_string()).unwrap_or_default(),
            "Resolved image history"
        );

        let latest = self.aggregator.snapshot(&history.latest.digest).await?;

        let report = match history.previous {
            None => {
                let report = ComparisonReport::baseline(history.latest, &latest)?;
                ctx.advance(GateState::BaselineRecorded);
                report
            }
            Some(previous_image) => {
                let previous = self.aggregator.snapshot(&previous_image.digest).await?;
                let report = ComparisonReport::compared(
                    history.latest,
                    previous_image,
                    &latest,
                    &previous,
                    &self.settings.profile.tracked_severities(),
                    &self.settings.profile.gate_on,
                )?;
                ctx.advance(GateState::Compared(report.decision()));
                report
            }
        };

        let decision = report.decision();
        info!(
            decision = %decision,
            new_findings = report.new_findings().len(),
            resolved_findings = report.resolved_findings().len(),
            "Comparison complete"
        );
        ctx.report = Some(report);
        Ok(decision)
    }

    /// Enforcement stage. Requires a prior successful [`Self::evaluate`].
    pub async fn enforce(&self, ctx: &mut InvocationContext) -> Result<GateOutcome, GateError> {
        let report = ctx
            .report
            .clone()
            .ok_or_else(|| GateError::InvalidEvent("enforce called before evaluate".to_string()))?;

        match ctx.state() {
            GateState::BaselineRecorded => {
                self.publish(report_notification(
                    &GateReport::for_comparison(&report),
                    ctx.event.raw(),
                    ctx.repository(),
                    &self.settings.system_tag,
                    &ctx.image_tag(),
                ))
                .await?;
                self.emit(GateEvent::BaselineRecorded {
                    invocation_id: ctx.invocation_id,
                    repository: ctx.repository().to_string(),
                    image_digest: report.latest_image().digest.clone(),
                    recorded_at: Utc::now(),
                })
                .await;
                Ok(GateOutcome::BaselineRecorded)
            }
            GateState::Compared(decision) => {
                self.emit(GateEvent::ComparisonCompleted {
                    invocation_id: ctx.invocation_id,
                    repository: ctx.repository().to_string(),
                    image_digest: report.latest_image().digest.clone(),
                    previous_digest: report
                        .previous_image()
                        .map(|p| p.digest.clone())
                        .unwrap_or_else(|| report.latest_image().digest.clone()),
                    decision,
                    new_findings: report.new_findings().into_iter().collect(),
                    resolved_findings: report.resolved_findings().into_iter().collect(),
                    completed_at: Utc::now(),
                })
                .await;

                // delivered before the pipeline is touched
                self.publish(report_notification(
                    &GateReport::for_comparison(&report),
                    ctx.event.raw(),
                    ctx.repository(),
                    &self.settings.system_tag,
                    &ctx.image_tag(),
                ))
                .await?;

                match ctx.pipeline.clone() {
                    None => {
                        ctx.advance(GateState::Done);
                        Ok(GateOutcome::Compared { decision })
                    }
                    Some(pipeline) => self.gate_on_approval(ctx, &report, decision, pipeline).await,
                }
            }
            other => Err(GateError::InvalidEvent(format!(
                "cannot enforce from gate state {other:?}"
            ))),
        }
    }

    async fn gate_on_approval(
        &self,
        ctx: &mut InvocationContext,
        report: &ComparisonReport,
        decision: GateDecision,
        pipeline: String,
    ) -> Result<GateOutcome, GateError> {
        ctx.advance(GateState::AcquireApproval);

        let mut request = ApprovalRequest::new(&pipeline);
        let acquired = self.acquirer.acquire(&mut request).await;
        let attempts = request.attempts_made();
        ctx.approval = Some(request);
        let token = acquired?;

        self.emit(GateEvent::ApprovalAcquired {
            invocation_id: ctx.invocation_id,
            pipeline: pipeline.clone(),
            attempts,
            acquired_at: Utc::now(),
        })
        .await;
        ctx.advance(GateState::Apply);

        let image_tag = ctx.image_tag();
        let (status, outcome) = match self.settings.approval.mode {
            ApprovalMode::AutoApply => {
                // a compared image never has a baseline decision; fail closed regardless
                let verdict = ApprovalVerdict::for_decision(decision).unwrap_or(ApprovalVerdict::Rejected);
                let submission =
                    ApprovalSubmission::new(&pipeline, token, verdict, approval_summary(report, &image_tag));

                self.orchestrator
                    .submit_approval(&submission)
                    .await
                    .map_err(|e| GateError::PipelineMutation {
                        pipeline: pipeline.clone(),
                        message: e.to_string(),
                    })?;
                info!(pipeline = %pipeline, verdict = verdict.as_str(), "Decision applied");

                self.emit(GateEvent::DecisionApplied {
                    invocation_id: ctx.invocation_id,
                    pipeline: pipeline.clone(),
                    verdict,
                    applied_at: Utc::now(),
                })
                .await;

                (
                    verdict.as_str().to_string(),
                    GateOutcome::Applied {
                        decision,
                        pipeline: pipeline.clone(),
                        verdict,
                    },
                )
            }
            ApprovalMode::ManualReview => {
                let base_url = self.settings.approval.link_base_url.as_deref().ok_or_else(|| {
                    GateError::Configuration("approval.link_base_url is required in manual_review mode".to_string())
                })?;
                let links = review_links(base_url, &pipeline, &token)?;

                self.publish(manual_review_notification(
                    ctx.repository(),
                    &self.settings.system_tag,
                    &image_tag,
                    &pipeline,
                    decision,
                    &links,
                ))
                .await?;
                info!(pipeline = %pipeline, recommended = %decision, "Manual review requested");

                self.emit(GateEvent::ManualReviewRequested {
                    invocation_id: ctx.invocation_id,
                    pipeline: pipeline.clone(),
                    recommended: decision,
                    requested_at: Utc::now(),
                })
                .await;

                (
                    AWAITING_REVIEW_STATUS.to_string(),
                    GateOutcome::AwaitingManualReview {
                        decision,
                        pipeline: pipeline.clone(),
                    },
                )
            }
        };

        let gate_report = GateReport::for_comparison(report).with_approval(ApprovalSection {
            pipeline,
            status,
            attempts,
        });
        // follow-up only; the comparison report already went out
        if let Err(e) = self
            .publish(report_notification(
                &gate_report,
                ctx.event.raw(),
                ctx.repository(),
                &self.settings.system_tag,
                &image_tag,
            ))
            .await
        {
            warn!(error = %e, "Failed to deliver approval report");
        }

        ctx.advance(GateState::Done);
        Ok(outcome)
    }

    /// Failure transition: notify, signal, and record `Failed`. The caller
    /// returns the original error.
    pub async fn fail(&self, ctx: &mut InvocationContext, err: &GateError) {
        let stage = ctx.stage();
        error!(stage = stage.label(), error_kind = err.kind(), error = %err, "Gate invocation failed");

        self.notify_failure(stage, Some(ctx.repository()), &ctx.image_tag(), err)
            .await;
        self.emit(GateEvent::GateFailed {
            invocation_id: ctx.invocation_id,
            repository: ctx.repository().to_string(),
            stage: stage.label().to_string(),
            error_kind: err.kind().to_string(),
            reason: err.to_string(),
            failed_at: Utc::now(),
        })
        .await;

        if ctx.state.can_transition_to(&GateState::Failed) {
            ctx.advance(GateState::Failed);
        }
    }

    /// Best-effort failure notice; delivery errors are only logged.
    pub async fn notify_failure(
        &self,
        stage: GateStage,
        repository: Option<&RepositoryName>,
        image_tag: &str,
        err: &GateError,
    ) {
        let notification = failure_notification(
            stage,
            repository,
            &self.settings.system_tag,
            image_tag,
            &err.to_string(),
        );
        if let Err(e) = self.notifier.publish(&notification).await {
            warn!(error = %e, "Failed to deliver failure notification");
        }
    }

    async fn publish(&self, notification: Notification) -> Result<(), GateError> {
        debug!(subject = %notification.subject, "Publishing notification");
        self.notifier.publish(&notification).await?;
        Ok(())
    }

    async fn emit(&self, event: GateEvent) {
        if !self.settings.profile.emit_event_signal {
            return;
        }
        if let Some(events) = &self.events {
            if let Err(e) = events.emit(&event).await {
                warn!(error = %e, "Failed to emit gate event");
            }
        }
    }
}

fn approval_summary(report: &ComparisonReport, image_tag: &str) -> String {
    match report.decision() {
        GateDecision::Reject => {
            let titles: Vec<String> = report.new_findings().into_iter().collect();
            format!(
                "Deployment is rejected as new vulnerabilities were added with the latest image tag {}: {}",
                image_tag,
                titles.join(", ")
            )
        }
        _ => "Deployment is approved.".to_string(),
    }
}
