// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod http;
pub mod idempotency;
pub mod in_memory;

pub use event_bus::EventBus;
pub use idempotency::InMemoryIdempotencyStore;
