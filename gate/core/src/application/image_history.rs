// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Image History Resolver
//!
//! - **Layer:** Application
//! - **Responsibility:** Pick the newest and previous image of a repository
//! - **Collaborators:** `ImageRegistry` port

use std::sync::Arc;
use tracing::debug;

use crate::domain::error::GateError;
use crate::domain::image::{ImageHistory, RepositoryName};
use crate::domain::ports::ImageRegistry;

pub struct ImageHistoryResolver {
    registry: Arc<dyn ImageRegistry>,
}

impl ImageHistoryResolver {
    pub fn new(registry: Arc<dyn ImageRegistry>) -> Self {
        Self { registry }
    }

    /// Latest = most recently pushed; previous = the one pushed before it.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the repository has no images
    /// - `UpstreamQuery` when the registry call fails
    pub async fn resolve(&self, repository: &RepositoryName) -> Result<ImageHistory, GateError> {
        let mut images = self.registry.list_images(repository).await?;
        debug!(repository = %repository, images = images.len(), "Listed repository images");

        // stable sort: equal push times keep registry order
        images.sort_by(|a, b| b.pushed_at.cmp(&a.pushed_at));

        let mut newest_first = images.into_iter();
        let latest = newest_first.next().ok_or_else(|| GateError::NotFound {
            repository: repository.to_string(),
        })?;

        Ok(ImageHistory {
            latest,
            previous: newest_first.next(),
        })
    }
}
