// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use super::{build_client, check_status, endpoint, transport};
use crate::domain::image::{ImageRecord, RepositoryName};
use crate::domain::ports::{ImageRegistry, UpstreamError};

const COLLABORATOR: &str = "image-registry";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeImagesRequest<'a> {
    repository_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeImagesResponse {
    #[serde(default)]
    image_details: Vec<ImageDetail>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageDetail {
    image_digest: String,
    #[serde(default)]
    image_tags: Vec<String>,
    image_pushed_at: DateTime<Utc>,
}

/// Registry listing over HTTP: `POST {base}/images/describe`, following
/// `nextToken` until the listing is complete. A token the listing already
/// handed out fails the call.
pub struct HttpImageRegistry {
    base_url: String,
    client: Client,
}

impl HttpImageRegistry {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client: build_client(timeout),
        }
    }
}

#[async_trait]
impl ImageRegistry for HttpImageRegistry {
    async fn list_images(&self, repository: &RepositoryName) -> Result<Vec<ImageRecord>, UpstreamError> {
        let url = endpoint(COLLABORATOR, &self.base_url, &["images", "describe"])?;
        let mut images = Vec::new();
        let mut next_token = None;
        let mut seen = HashSet::new();

        loop {
            let request = DescribeImagesRequest {
                repository_name: repository.as_str(),
                next_token: next_token.take(),
            };
            let response = self
                .client
                .post(url.clone())
                .json(&request)
                .send()
                .await
                .map_err(|e| transport(COLLABORATOR, e))?;

            let body: DescribeImagesResponse = check_status(COLLABORATOR, response)
                .await?
                .json()
                .await
                .map_err(|e| UpstreamError::new(COLLABORATOR, format!("invalid response body: {e}")))?;

            images.extend(
                body.image_details
                    .into_iter()
                    .map(|d| ImageRecord::new(d.image_digest, d.image_tags, d.image_pushed_at)),
            );

            match body.next_token.filter(|t| !t.is_empty()) {
                Some(token) if !seen.insert(token.clone()) => {
                    return Err(UpstreamError::new(
                        COLLABORATOR,
                        format!("continuation token '{token}' repeated"),
                    ));
                }
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        debug!(repository = %repository, images = images.len(), "Described repository images");
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_follows_next_token() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/images/describe")
            .match_body(Matcher::Json(json!({"repositoryName": "web"})))
            .with_status(200)
            .with_body(
                json!({
                    "imageDetails": [
                        {"imageDigest": "sha256:a", "imageTags": ["v1"], "imagePushedAt": "2026-01-01T00:00:00Z"}
                    ],
                    "nextToken": "more"
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("POST", "/images/describe")
            .match_body(Matcher::Json(json!({"repositoryName": "web", "nextToken": "more"})))
            .with_status(200)
            .with_body(
                json!({
                    "imageDetails": [
                        {"imageDigest": "sha256:b", "imagePushedAt": "2026-01-02T00:00:00Z"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let registry = HttpImageRegistry::new(server.url(), Duration::from_secs(5));
        let images = registry
            .list_images(&RepositoryName::from_identifier("team/web").unwrap())
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].tags, vec!["v1".to_string()]);
        assert!(images[1].tags.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_token_stops_the_listing() {
        let mut server = mockito::Server::new_async().await;
        let page = |token: &str| {
            json!({
                "imageDetails": [
                    {"imageDigest": "sha256:a", "imagePushedAt": "2026-01-01T00:00:00Z"}
                ],
                "nextToken": token
            })
            .to_string()
        };
        let first = server
            .mock("POST", "/images/describe")
            .match_body(Matcher::Json(json!({"repositoryName": "web"})))
            .with_body(page("A"))
            .create_async()
            .await;
        let second = server
            .mock("POST", "/images/describe")
            .match_body(Matcher::Json(json!({"repositoryName": "web", "nextToken": "A"})))
            .with_body(page("B"))
            .create_async()
            .await;
        let third = server
            .mock("POST", "/images/describe")
            .match_body(Matcher::Json(json!({"repositoryName": "web", "nextToken": "B"})))
            .with_body(page("A"))
            .expect(1)
            .create_async()
            .await;

        let registry = HttpImageRegistry::new(server.url(), Duration::from_secs(5));
        let err = registry
            .list_images(&RepositoryName::from_identifier("web").unwrap())
            .await
            .unwrap_err();

        first.assert_async().await;
        second.assert_async().await;
        third.assert_async().await;
        assert_eq!(err.collaborator, "image-registry");
        assert!(err.message.contains("'A' repeated"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/images/describe")
            .with_status(200)
            .with_body(r#"{"imageDetails": [{"imageDigest": 7}]}"#)
            .create_async()
            .await;

        let registry = HttpImageRegistry::new(server.url(), Duration::from_secs(5));
        let err = registry
            .list_images(&RepositoryName::from_identifier("web").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.collaborator, "image-registry");
    }
}
