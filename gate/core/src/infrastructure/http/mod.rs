// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP adapters for the collaborator ports.
//!
//! Each adapter owns a `reqwest::Client` built with the configured request
//! timeout. Non-2xx responses and undecodable bodies become `UpstreamError`s
//! tagged with the collaborator name.

pub mod event_sink;
pub mod finding_source;
pub mod image_registry;
pub mod notifier;
pub mod pipeline;

pub use event_sink::HttpEventSink;
pub use finding_source::HttpFindingSource;
pub use image_registry::HttpImageRegistry;
pub use notifier::WebhookNotifier;
pub use pipeline::HttpPipelineOrchestrator;

use reqwest::{Client, Response, Url};
use std::time::Duration;

use crate::domain::ports::UpstreamError;

pub(crate) fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout ({}), using defaults", e);
            Client::new()
        })
}

/// `base` with `segments` appended, each percent-encoded.
pub(crate) fn endpoint(collaborator: &str, base: &str, segments: &[&str]) -> Result<Url, UpstreamError> {
    let mut url = Url::parse(base)
        .map_err(|e| UpstreamError::new(collaborator, format!("invalid base URL '{base}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| UpstreamError::new(collaborator, format!("base URL '{base}' cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Fail on non-success status, keeping the response body for the message.
pub(crate) async fn check_status(collaborator: &str, response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::new(
        collaborator,
        format!("HTTP {}: {}", status.as_u16(), body.trim()),
    ))
}

pub(crate) fn transport(collaborator: &str, err: reqwest::Error) -> UpstreamError {
    UpstreamError::new(collaborator, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_appends_encoded_segments() {
        let url = endpoint("pipeline", "http://localhost:9103/api/", &["pipelines", "deploy web", "state"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9103/api/pipelines/deploy%20web/state");
    }

    #[test]
    fn test_endpoint_rejects_bad_base() {
        assert!(endpoint("pipeline", "::nope", &["x"]).is_err());
    }
}
