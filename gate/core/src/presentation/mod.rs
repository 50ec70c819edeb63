// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`imagegate-core`)
//!
//! HTTP surface that translates scan-event deliveries and followed review
//! links into application service calls. No gate logic lives here; all real
//! work is delegated to `crate::application`.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | Event intake, manual review links, health |

pub mod api;
