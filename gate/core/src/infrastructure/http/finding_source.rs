// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Finding source over HTTP.
//!
//! `POST {base}/findings/list` with inspector-style filter criteria; every
//! filter is an `EQUALS` comparison and they are AND-combined server side.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{build_client, check_status, endpoint, transport};
use crate::domain::finding::Finding;
use crate::domain::ports::{FindingPage, FindingQuery, FindingSource, UpstreamError};

const COLLABORATOR: &str = "finding-source";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListFindingsRequest {
    filter_criteria: FilterCriteria,
    max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FilterCriteria {
    ecr_image_hash: Vec<StringFilter>,
    finding_status: Vec<StringFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<Vec<StringFilter>>,
}

#[derive(Debug, Serialize)]
struct StringFilter {
    comparison: &'static str,
    value: String,
}

impl StringFilter {
    fn equals(value: impl Into<String>) -> Vec<Self> {
        vec![Self {
            comparison: "EQUALS",
            value: value.into(),
        }]
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFindingsResponse {
    #[serde(default)]
    findings: Vec<WireFinding>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireFinding {
    title: String,
    #[serde(default)]
    severity: Option<String>,
}

impl From<&FindingQuery> for ListFindingsRequest {
    fn from(query: &FindingQuery) -> Self {
        Self {
            filter_criteria: FilterCriteria {
                ecr_image_hash: StringFilter::equals(query.image_digest.as_str()),
                finding_status: StringFilter::equals(query.status.as_str()),
                severity: query.severity.map(|s| StringFilter::equals(s.as_str())),
            },
            max_results: query.page_size,
            next_token: query.next_token.clone(),
        }
    }
}

pub struct HttpFindingSource {
    base_url: String,
    client: Client,
}

impl HttpFindingSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client: build_client(timeout),
        }
    }
}

#[async_trait]
impl FindingSource for HttpFindingSource {
    async fn list_findings(&self, query: &FindingQuery) -> Result<FindingPage, UpstreamError> {
        let url = endpoint(COLLABORATOR, &self.base_url, &["findings", "list"])?;
        let response = self
            .client
            .post(url)
            .json(&ListFindingsRequest::from(query))
            .send()
            .await
            .map_err(|e| transport(COLLABORATOR, e))?;

        let body: ListFindingsResponse = check_status(COLLABORATOR, response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::new(COLLABORATOR, format!("invalid response body: {e}")))?;

        debug!(
            image_digest = %query.image_digest,
            findings = body.findings.len(),
            has_more = body.next_token.is_some(),
            "Fetched findings page"
        );

        Ok(FindingPage {
            findings: body
                .findings
                .into_iter()
                .map(|f| Finding {
                    title: f.title,
                    // unknown labels (INFORMATIONAL, UNTRIAGED) fall into OTHER
                    severity: f.severity.and_then(|s| s.parse().ok()),
                })
                .collect(),
            next_token: body.next_token.filter(|t| !t.is_empty()),
        })
    }
}
