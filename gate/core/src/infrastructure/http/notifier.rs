// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{build_client, check_status};
use crate::domain::ports::{Notification, Notifier, NotifyError};

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    subject: &'a str,
    message: &'a str,
}

/// Messaging sink reached through a JSON webhook: `POST {url}` with
/// `{topic?, subject, message}`.
pub struct WebhookNotifier {
    url: String,
    topic: Option<String>,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, topic: Option<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            topic,
            client: build_client(timeout),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = WebhookMessage {
            topic: self.topic.as_deref(),
            subject: &notification.subject,
            message: &notification.message,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;
        check_status("notification-webhook", response)
            .await
            .map_err(|e| NotifyError(e.to_string()))?;

        debug!(subject = %notification.subject, "Notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_posts_subject_and_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .match_body(Matcher::Json(json!({
                "topic": "security-alerts",
                "subject": "web | Thor | v2",
                "message": "Critical : 1"
            })))
            .with_status(202)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(
            format!("{}/notify", server.url()),
            Some("security-alerts".into()),
            Duration::from_secs(5),
        );
        notifier
            .publish(&Notification {
                subject: "web | Thor | v2".into(),
                message: "Critical : 1".into(),
            })
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_sink_failure_is_notify_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/notify").with_status(500).create_async().await;

        let notifier = WebhookNotifier::new(format!("{}/notify", server.url()), None, Duration::from_secs(5));
        let err = notifier
            .publish(&Notification {
                subject: "s".into(),
                message: "m".into(),
            })
            .await
            .unwrap_err();
        assert!(err.0.contains("500"));
    }
}
