// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{build_client, check_status, transport};
use crate::domain::events::GateEvent;
use crate::domain::ports::{EventSignal, UpstreamError};

const COLLABORATOR: &str = "event-sink";

/// Forwards gate events to an external event bus endpoint as JSON.
pub struct HttpEventSink {
    url: String,
    client: Client,
}

impl HttpEventSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: build_client(timeout),
        }
    }
}

#[async_trait]
impl EventSignal for HttpEventSink {
    async fn emit(&self, event: &GateEvent) -> Result<(), UpstreamError> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| transport(COLLABORATOR, e))?;
        check_status(COLLABORATOR, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::image::ImageDigest;
    use chrono::Utc;
    use mockito::Matcher;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_posts_tagged_event() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/events")
            .match_body(Matcher::PartialJson(json!({
                "type": "baseline_recorded",
                "repository": "web",
                "image_digest": "sha256:a"
            })))
            .with_status(200)
            .create_async()
            .await;

        let sink = HttpEventSink::new(format!("{}/events", server.url()), Duration::from_secs(5));
        sink.emit(&GateEvent::BaselineRecorded {
            invocation_id: Uuid::new_v4(),
            repository: "web".into(),
            image_digest: ImageDigest::new("sha256:a"),
            recorded_at: Utc::now(),
        })
        .await
        .unwrap();
        mock.assert_async().await;
    }
}
