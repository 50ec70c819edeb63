// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Delta Engine: finding comparison between two image builds
//!
//! Pure functions over two [`ImageFindings`] snapshots. No I/O, ordered
//! collections only, so identical inputs always serialize identically.
//!
//! | Class | Count delta | Title diff |
//! |-------|-------------|------------|
//! | CRITICAL | yes | always tracked |
//! | HIGH | yes | when the profile tracks HIGH |
//! | MEDIUM / LOW | yes | never |
//! | OTHER | yes, derived from totals | never |

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::error::GateError;
use crate::domain::finding::ImageFindings;
use crate::domain::image::ImageRecord;
use crate::domain::severity::Severity;

/// Outcome of the comparison stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDecision {
    Approve,
    Reject,
    BaselineOnly,
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateDecision::Approve => "APPROVE",
            GateDecision::Reject => "REJECT",
            GateDecision::BaselineOnly => "BASELINE_ONLY",
        }
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (latest, previous, latest − previous) for one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDelta {
    pub latest: u64,
    pub previous: u64,
    pub delta: i64,
}

impl CountDelta {
    pub fn between(latest: u64, previous: u64) -> Self {
        Self {
            latest,
            previous,
            delta: latest as i64 - previous as i64,
        }
    }
}

/// Title sets for one tracked severity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TitleComparison {
    pub latest: BTreeSet<String>,
    pub previous: BTreeSet<String>,
    /// In latest, not in previous.
    pub new: BTreeSet<String>,
    /// In previous, not in latest.
    pub resolved: BTreeSet<String>,
}

impl TitleComparison {
    pub fn between(latest: BTreeSet<String>, previous: BTreeSet<String>) -> Self {
        let new = latest.difference(&previous).cloned().collect();
        let resolved = previous.difference(&latest).cloned().collect();
        Self {
            latest,
            previous,
            new,
            resolved,
        }
    }
}

/// Counts for every class of a single image (the baseline view).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountTable {
    pub by_class: BTreeMap<Severity, u64>,
    pub total: u64,
}

impl CountTable {
    pub fn from_findings(findings: &ImageFindings) -> Result<Self, GateError> {
        let mut by_class = BTreeMap::new();
        for class in Severity::ALL {
            by_class.insert(class, findings.class_count(class)?);
        }
        Ok(Self {
            by_class,
            total: findings.total,
        })
    }

    pub fn get(&self, class: Severity) -> u64 {
        self.by_class.get(&class).copied().unwrap_or(0)
    }
}

/// Per-class deltas and per-tracked-severity title changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingDelta {
    pub per_class: BTreeMap<Severity, CountDelta>,
    pub total: CountDelta,
    pub titles: BTreeMap<Severity, TitleComparison>,
}

impl FindingDelta {
    /// Union of newly introduced titles across tracked severities.
    pub fn new_findings(&self) -> BTreeSet<String> {
        self.titles.values().flat_map(|t| t.new.iter().cloned()).collect()
    }

    /// Union of resolved titles across tracked severities.
    pub fn resolved_findings(&self) -> BTreeSet<String> {
        self.titles.values().flat_map(|t| t.resolved.iter().cloned()).collect()
    }

    pub fn new_for(&self, severity: Severity) -> BTreeSet<String> {
        self.titles.get(&severity).map(|t| t.new.clone()).unwrap_or_default()
    }
}

/// Compare two snapshots. `tracked` selects the severities whose titles are
/// diffed; `OTHER` and any duplicate entries are ignored.
pub fn compare(
    latest: &ImageFindings,
    previous: &ImageFindings,
    tracked: &[Severity],
) -> Result<FindingDelta, GateError> {
    let mut per_class = BTreeMap::new();
    for class in Severity::ALL {
        per_class.insert(
            class,
            CountDelta::between(latest.class_count(class)?, previous.class_count(class)?),
        );
    }

    let titles = tracked
        .iter()
        .filter(|s| s.is_queryable())
        .map(|s| (*s, TitleComparison::between(latest.titles(*s), previous.titles(*s))))
        .collect();

    Ok(FindingDelta {
        per_class,
        total: CountDelta::between(latest.total, previous.total),
        titles,
    })
}

/// REJECT when any gated severity introduced a new title, APPROVE otherwise.
pub fn decide(delta: &FindingDelta, gate_on: &[Severity]) -> GateDecision {
    if gate_on.iter().any(|s| !delta.new_for(*s).is_empty()) {
        GateDecision::Reject
    } else {
        GateDecision::Approve
    }
}

/// Result of one invocation's comparison stage. Built once through
/// [`ComparisonReport::baseline`] or [`ComparisonReport::compared`] and
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonReport {
    latest_image: ImageRecord,
    previous_image: Option<ImageRecord>,
    latest_counts: CountTable,
    delta: Option<FindingDelta>,
    decision: GateDecision,
}

impl ComparisonReport {
    /// First scan of a repository: counts only, never gated.
    pub fn baseline(latest_image: ImageRecord, latest: &ImageFindings) -> Result<Self, GateError> {
        Ok(Self {
            latest_counts: CountTable::from_findings(latest)?,
            latest_image,
            previous_image: None,
            delta: None,
            decision: GateDecision::BaselineOnly,
        })
    }

    pub fn compared(
        latest_image: ImageRecord,
        previous_image: ImageRecord,
        latest: &ImageFindings,
        previous: &ImageFindings,
        tracked: &[Severity],
        gate_on: &[Severity],
    ) -> Result<Self, GateError> {
        let delta = compare(latest, previous, tracked)?;
        let decision = decide(&delta, gate_on);
        Ok(Self {
            latest_counts: CountTable::from_findings(latest)?,
            latest_image,
            previous_image: Some(previous_image),
            delta: Some(delta),
            decision,
        })
    }

    pub fn latest_image(&self) -> &ImageRecord {
        &self.latest_image
    }

    pub fn previous_image(&self) -> Option<&ImageRecord> {
        self.previous_image.as_ref()
    }

    pub fn latest_counts(&self) -> &CountTable {
        &self.latest_counts
    }

    pub fn delta(&self) -> Option<&FindingDelta> {
        self.delta.as_ref()
    }

    pub fn decision(&self) -> GateDecision {
        self.decision
    }

    pub fn is_baseline(&self) -> bool {
        self.previous_image.is_none()
    }

    pub fn new_findings(&self) -> BTreeSet<String> {
        self.delta.as_ref().map(FindingDelta::new_findings).unwrap_or_default()
    }

    pub fn resolved_findings(&self) -> BTreeSet<String> {
        self.delta.as_ref().map(FindingDelta::resolved_findings).unwrap_or_default()
    }
}
