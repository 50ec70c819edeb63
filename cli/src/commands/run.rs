// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Gate a single scan event and print the invocation result

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;

use imagegate_core::domain::config::GateConfigManifest;

use crate::wiring;

#[derive(Args)]
pub struct RunArgs {
    /// Scan event JSON file, or `-` for stdin
    #[arg(short, long, value_name = "FILE")]
    pub event: PathBuf,

    /// Replay collaborators from a JSON fixture instead of calling endpoints
    #[arg(long, value_name = "FIXTURE")]
    pub offline: Option<PathBuf>,
}

pub async fn execute(args: RunArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = GateConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let event = read_event(&args.event)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C signal, cancelling pending waits");
            ctrl_c.cancel();
        }
    });

    let services = match &args.offline {
        Some(fixture) => wiring::offline(&config, fixture, cancel)?,
        None => wiring::live(&config, cancel)?,
    };

    let outcome = services.evaluate.evaluate(event).await;

    if let Some(recorded) = &services.recorded_notifications {
        for notification in recorded.sent() {
            println!("{}", notification.subject.bold());
            println!("{}", notification.message);
            println!();
        }
    }

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            println!("{}", format!("✓ {}", result.body).green());
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format!("✗ {} ({})", e, e.kind()).red());
            Err(e).context("Gate invocation failed")
        }
    }
}

fn read_event(path: &Path) -> Result<serde_json::Value> {
    let content = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read scan event from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scan event {:?}", path))?
    };

    serde_json::from_str(&content).context("Scan event is not valid JSON")
}
