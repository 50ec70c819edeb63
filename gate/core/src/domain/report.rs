// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Gate Reports
//!
//! Text reports published to the messaging sink. Each variant has a fixed
//! field set; which variant is published is chosen by the gate controller.
//!
//! Lines are `key : value` in a stable order. Event payload, title lists,
//! status fields and approval fields are preceded by a blank line.

use serde_json::Value;

use crate::domain::comparison::{ComparisonReport, CountTable, FindingDelta, GateDecision};
use crate::domain::gate::GateStage;
use crate::domain::image::RepositoryName;
use crate::domain::ports::Notification;
use crate::domain::severity::Severity;

const EVENT_KEY: &str = "Scan_Event_Latest_Image";

/// Approval details appended to a comparison report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalSection {
    pub pipeline: String,
    pub status: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateReport {
    Baseline {
        counts: CountTable,
    },
    /// Counts and changes both come from `delta`
    Comparison {
        delta: FindingDelta,
        decision: GateDecision,
    },
    ComparisonWithApproval {
        delta: FindingDelta,
        decision: GateDecision,
        approval: ApprovalSection,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub key: String,
    pub value: String,
    pub spaced: bool,
}

impl ReportLine {
    fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            spaced: false,
        }
    }

    fn spaced(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            spaced: true,
        }
    }

    fn render(&self) -> String {
        if self.spaced {
            format!("\n{} : {}", self.key, self.value)
        } else {
            format!("{} : {}", self.key, self.value)
        }
    }
}

impl GateReport {
    /// Baseline or plain comparison, depending on whether a previous image
    /// was compared.
    pub fn for_comparison(report: &ComparisonReport) -> Self {
        match report.delta() {
            None => GateReport::Baseline {
                counts: report.latest_counts().clone(),
            },
            Some(delta) => GateReport::Comparison {
                delta: delta.clone(),
                decision: report.decision(),
            },
        }
    }

    /// Attach approval details. A baseline has no approval section and is
    /// returned unchanged.
    pub fn with_approval(self, approval: ApprovalSection) -> Self {
        match self {
            GateReport::Comparison { delta, decision }
            | GateReport::ComparisonWithApproval { delta, decision, .. } => {
                GateReport::ComparisonWithApproval {
                    delta,
                    decision,
                    approval,
                }
            }
            baseline @ GateReport::Baseline { .. } => baseline,
        }
    }

    pub fn lines(&self, event: &Value) -> Vec<ReportLine> {
        let event_line = ReportLine::spaced(EVENT_KEY, event.to_string());
        match self {
            GateReport::Baseline { counts } => {
                let mut lines: Vec<ReportLine> = Severity::ALL
                    .iter()
                    .map(|s| ReportLine::plain(s.label(), counts.get(*s).to_string()))
                    .collect();
                lines.push(ReportLine::plain("Total", counts.total.to_string()));
                lines.push(event_line);
                lines
            }
            GateReport::Comparison { delta, decision } => {
                comparison_lines(delta, *decision, event_line)
            }
            GateReport::ComparisonWithApproval {
                delta,
                decision,
                approval,
                ..
            } => {
                let mut lines = comparison_lines(delta, *decision, event_line);
                lines.push(ReportLine::spaced("Pipeline", approval.pipeline.clone()));
                lines.push(ReportLine::plain("ApprovalStatus", approval.status.clone()));
                lines.push(ReportLine::plain("ApprovalAttempts", approval.attempts.to_string()));
                lines
            }
        }
    }

    pub fn render(&self, event: &Value) -> String {
        self.lines(event)
            .iter()
            .map(ReportLine::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn comparison_lines(delta: &FindingDelta, decision: GateDecision, event_line: ReportLine) -> Vec<ReportLine> {
    let mut lines: Vec<ReportLine> = delta
        .per_class
        .iter()
        .map(|(class, d)| ReportLine::plain(class.label(), format!("{} (Change = {})", d.latest, d.delta)))
        .collect();
    lines.push(ReportLine::plain(
        "Total",
        format!("{} (Change = {})", delta.total.latest, delta.total.delta),
    ));
    lines.push(event_line);

    for (severity, titles) in &delta.titles {
        let label = severity.label();
        lines.push(ReportLine::spaced(format!("Latest{label}FindingTitles"), join_titles(&titles.latest)));
        lines.push(ReportLine::spaced(format!("Previous{label}FindingTitles"), join_titles(&titles.previous)));
        lines.push(ReportLine::spaced(format!("New{label}Findings"), join_titles(&titles.new)));
        lines.push(ReportLine::spaced(format!("Resolved{label}Findings"), join_titles(&titles.resolved)));
        let status = if titles.new.is_empty() {
            format!("NO_NEW_{}_VULNERABILITY_ADDED", severity.as_str())
        } else {
            format!("NEW_{}_VULNERABILITY_ADDED", severity.as_str())
        };
        lines.push(ReportLine::spaced(format!("{label}Status"), status));
    }

    lines.push(ReportLine::spaced("Decision", decision.as_str()));
    lines
}

fn join_titles<'a, I>(titles: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    titles.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// `<repo ≤ 80 chars> | <system-tag> | <image-tag>`
pub fn report_subject(repository: &RepositoryName, system_tag: &str, image_tag: &str) -> String {
    format!("{} | {} | {}", repository.truncated(), system_tag, image_tag)
}

pub fn report_notification(
    report: &GateReport,
    event: &Value,
    repository: &RepositoryName,
    system_tag: &str,
    image_tag: &str,
) -> Notification {
    Notification {
        subject: report_subject(repository, system_tag, image_tag),
        message: report.render(event),
    }
}

/// Failure notice: gate stage, image tag and reason.
pub fn failure_notification(
    stage: GateStage,
    repository: Option<&RepositoryName>,
    system_tag: &str,
    image_tag: &str,
    reason: &str,
) -> Notification {
    let repository = repository.map(RepositoryName::as_str).unwrap_or("unknown");
    Notification {
        subject: format!("Error in {} | {} | {}", stage.label(), system_tag, image_tag),
        message: format!(
            "Repository Name: {repository}\n\nError while executing {}:\n {reason}",
            stage.label().to_lowercase()
        ),
    }
}

/// Links a reviewer follows to approve or reject a pending deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewLinks {
    pub approve: String,
    pub reject: String,
}

pub fn manual_review_notification(
    repository: &RepositoryName,
    system_tag: &str,
    image_tag: &str,
    pipeline: &str,
    recommended: GateDecision,
    links: &ReviewLinks,
) -> Notification {
    let lines = [
        ReportLine::plain("Pipeline", pipeline),
        ReportLine::plain("RecommendedDecision", recommended.as_str()),
        ReportLine::spaced("Approve", links.approve.clone()),
        ReportLine::plain("Reject", links.reject.clone()),
    ];
    Notification {
        subject: format!(
            "Approval Request for Deployment | {}",
            report_subject(repository, system_tag, image_tag)
        ),
        message: lines.iter().map(ReportLine::render).collect::<Vec<_>>().join("\n"),
    }
}
