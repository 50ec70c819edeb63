// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Container image vulnerability deployment gate.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Compares findings between the newest and previous image
//!   build and drives the delivery pipeline's approval stage accordingly

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
