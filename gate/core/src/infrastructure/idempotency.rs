// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::ports::{IdempotencyKey, IdempotencyStore};

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Process-local redelivery guard. A key is honoured for `ttl` after it was
/// recorded; past `max_entries` the oldest keys are evicted first. A
/// restarted server will gate a redelivered event again.
#[derive(Clone)]
pub struct InMemoryIdempotencyStore {
    completed: Arc<DashMap<IdempotencyKey, DateTime<Utc>>>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            completed: Arc::new(DashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// When the key was recorded, if ever.
    pub fn recorded_at(&self, key: &IdempotencyKey) -> Option<DateTime<Utc>> {
        self.completed.get(key).map(|at| *at.value())
    }

    fn is_fresh(&self, recorded: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // clock stepped backwards: still fresh
        (now - recorded).to_std().map(|age| age < self.ttl).unwrap_or(true)
    }

    fn contains_at(&self, key: &IdempotencyKey, now: DateTime<Utc>) -> bool {
        let expired = self.completed.remove_if(key, |_, at| !self.is_fresh(*at, now));
        if expired.is_some() {
            debug!(key = %key, "Idempotency key expired");
            return false;
        }
        self.completed.contains_key(key)
    }

    fn record_at(&self, key: IdempotencyKey, now: DateTime<Utc>) {
        self.completed.retain(|_, at| self.is_fresh(*at, now));
        self.completed.entry(key).or_insert(now);

        while self.completed.len() > self.max_entries {
            let oldest = self
                .completed
                .iter()
                .min_by_key(|entry| *entry.value())
                .map(|entry| entry.key().clone());
            match oldest {
                Some(oldest) => {
                    debug!(key = %oldest, "Evicting oldest idempotency key");
                    self.completed.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn contains(&self, key: &IdempotencyKey) -> bool {
        self.contains_at(key, Utc::now())
    }

    async fn record(&self, key: IdempotencyKey) {
        debug!(key = %key, "Recording completed gate outcome");
        self.record_at(key, Utc::now());
    }
}
