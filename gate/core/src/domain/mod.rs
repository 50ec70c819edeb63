// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Gate types, collaborator ports and the pure comparison logic.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** No I/O; everything here is deterministic over its inputs

pub mod approval;
pub mod comparison;
pub mod config;
pub mod error;
pub mod events;
pub mod finding;
pub mod gate;
pub mod image;
pub mod ports;
pub mod report;
pub mod scan_event;
pub mod severity;
