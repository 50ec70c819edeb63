// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP server: scan-event intake and manual review links

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use imagegate_core::domain::config::GateConfigManifest;
use imagegate_core::infrastructure::event_bus::EventBusError;
use imagegate_core::presentation::api;

use crate::wiring;

#[derive(Args)]
pub struct ServeArgs {
    /// HTTP API host
    #[arg(long, env = "IMAGEGATE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP API port
    #[arg(long, env = "IMAGEGATE_PORT", default_value = "8080")]
    pub port: u16,

    /// Replay collaborators from a JSON fixture instead of calling endpoints
    #[arg(long, value_name = "FIXTURE")]
    pub offline: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = GateConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    info!(
        name = %config.metadata.name,
        system_tag = %config.spec.system_tag,
        mode = ?config.spec.approval.mode,
        "Configuration loaded"
    );

    let cancel = CancellationToken::new();
    let services = match &args.offline {
        Some(fixture) => wiring::offline(&config, fixture, cancel.clone())?,
        None => wiring::live(&config, cancel.clone())?,
    };

    // Log in-process gate events when no external sink takes them
    let mut receiver = services.event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => info!(invocation_id = %event.invocation_id(), event = ?event, "Gate event"),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });

    let app = api::app(services.evaluate, services.review);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("imagegate listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .context("HTTP server failed")?;

    info!("imagegate shutting down");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and cancels any pending retry waits.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    cancel.cancel();
}
