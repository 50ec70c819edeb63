// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Builds gate services from a loaded [`GateConfigManifest`].
//!
//! Live wiring talks to the configured HTTP endpoints. Offline wiring
//! replays a fixture file and keeps notifications in memory so `run` can
//! print them.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use imagegate_core::application::gate_controller::{GateCollaborators, GateController, GateSettings};
use imagegate_core::application::retry::{RetryPolicy, TokioSleeper};
use imagegate_core::application::{
    EvaluateScanEventUseCase, StandardEvaluateScanEventUseCase, StandardSubmitReviewUseCase,
    SubmitReviewUseCase,
};
use imagegate_core::domain::config::GateConfigManifest;
use imagegate_core::domain::ports::{
    EventSignal, FindingSource, ImageRegistry, Notifier, PipelineOrchestrator, StaticPipelineDirectory,
};
use imagegate_core::infrastructure::http::{
    HttpEventSink, HttpFindingSource, HttpImageRegistry, HttpPipelineOrchestrator, WebhookNotifier,
};
use imagegate_core::infrastructure::in_memory::{OfflineFixture, RecordingNotifier};
use imagegate_core::infrastructure::{EventBus, InMemoryIdempotencyStore};

/// Everything a command needs to serve gate invocations.
pub struct GateServices {
    pub evaluate: Arc<dyn EvaluateScanEventUseCase>,
    pub review: Arc<dyn SubmitReviewUseCase>,
    pub event_bus: EventBus,
    /// Present in offline mode only
    pub recorded_notifications: Option<Arc<RecordingNotifier>>,
}

struct Adapters {
    registry: Arc<dyn ImageRegistry>,
    findings: Arc<dyn FindingSource>,
    orchestrator: Arc<dyn PipelineOrchestrator>,
    notifier: Arc<dyn Notifier>,
}

/// Wire against the configured HTTP collaborators.
pub fn live(config: &GateConfigManifest, cancel: CancellationToken) -> Result<GateServices> {
    let endpoints = &config.spec.endpoints;
    let timeout = endpoints.request_timeout;
    let adapters = Adapters {
        registry: Arc::new(HttpImageRegistry::new(&endpoints.image_registry, timeout)),
        findings: Arc::new(HttpFindingSource::new(&endpoints.finding_source, timeout)),
        orchestrator: Arc::new(HttpPipelineOrchestrator::new(
            &endpoints.pipeline_orchestrator,
            timeout,
        )),
        notifier: Arc::new(WebhookNotifier::new(
            &endpoints.notification_webhook,
            endpoints.notification_topic.clone(),
            timeout,
        )),
    };
    info!(
        finding_source = %endpoints.finding_source,
        image_registry = %endpoints.image_registry,
        pipeline_orchestrator = %endpoints.pipeline_orchestrator,
        "Wiring HTTP collaborators"
    );
    build(config, adapters, cancel, None)
}

/// Wire against a JSON fixture instead of live collaborators.
pub fn offline(
    config: &GateConfigManifest,
    fixture_path: &Path,
    cancel: CancellationToken,
) -> Result<GateServices> {
    let content = std::fs::read_to_string(fixture_path)
        .with_context(|| format!("Failed to read fixture {:?}", fixture_path))?;
    let fixture = OfflineFixture::from_json_str(&content)
        .with_context(|| format!("Failed to parse fixture {:?}", fixture_path))?;

    let (registry, findings, orchestrator) = fixture.into_collaborators();
    let notifier = Arc::new(RecordingNotifier::new());
    let adapters = Adapters {
        registry: Arc::new(registry),
        findings: Arc::new(findings),
        orchestrator: Arc::new(orchestrator),
        notifier: notifier.clone(),
    };
    info!(fixture = %fixture_path.display(), "Wiring offline fixture");
    build(config, adapters, cancel, Some(notifier))
}

fn build(
    config: &GateConfigManifest,
    adapters: Adapters,
    cancel: CancellationToken,
    recorded_notifications: Option<Arc<RecordingNotifier>>,
) -> Result<GateServices> {
    let spec = &config.spec;
    let event_bus = EventBus::with_default_capacity();

    let events: Option<Arc<dyn EventSignal>> = if !spec.profile.emit_event_signal {
        None
    } else if let Some(sink) = &spec.endpoints.event_sink {
        Some(Arc::new(HttpEventSink::new(sink, spec.endpoints.request_timeout)))
    } else {
        Some(Arc::new(event_bus.clone()))
    };

    let pipelines: HashMap<String, String> = spec.pipelines.clone();
    let collaborators = GateCollaborators {
        registry: adapters.registry,
        findings: adapters.findings,
        orchestrator: adapters.orchestrator.clone(),
        notifier: adapters.notifier,
        directory: Arc::new(StaticPipelineDirectory::new(pipelines)),
        events: events.clone(),
        sleeper: Arc::new(TokioSleeper::new(cancel)),
    };

    let controller = GateController::new(
        collaborators,
        GateSettings::from(spec),
        RetryPolicy::from(&spec.retry),
    );

    Ok(GateServices {
        evaluate: Arc::new(StandardEvaluateScanEventUseCase::new(
            controller,
            Arc::new(InMemoryIdempotencyStore::with_limits(
                spec.idempotency.ttl,
                spec.idempotency.max_entries,
            )),
            spec.invocation_timeout,
        )),
        review: Arc::new(StandardSubmitReviewUseCase::new(adapters.orchestrator, events)),
        event_bus,
        recorded_notifications,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIXTURE: &str = r#"{
        "images": {
            "web": [
                {"digest": "sha256:old", "tags": ["v1"], "pushed_at": "2026-01-01T00:00:00Z"},
                {"digest": "sha256:new", "tags": ["v2"], "pushed_at": "2026-01-02T00:00:00Z"}
            ]
        },
        "findings": {
            "sha256:new": [{"title": "CVE-2", "severity": "CRITICAL"}],
            "sha256:old": []
        }
    }"#;

    #[tokio::test]
    async fn test_offline_wiring_runs_a_gate() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("fixture.json");
        std::fs::write(&fixture, FIXTURE).unwrap();

        let services = offline(&GateConfigManifest::default(), &fixture, CancellationToken::new()).unwrap();
        let result = services
            .evaluate
            .evaluate(json!({"detail": {"repository-name": "team/web"}}))
            .await
            .unwrap();

        assert_eq!(result.status_code, 200);
        let sent = services.recorded_notifications.unwrap().sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].message.contains("CVE-2"));
    }
}
