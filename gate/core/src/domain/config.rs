// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gate Configuration Types
//
// Defines the configuration schema for an imagegate deployment, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Gate profile (tracked and gating severities, approval gate, event signal)
// - Approval retry budget
// - Repository to pipeline mapping
// - Collaborator endpoints and approval mode

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::gate::{ApprovalMode, GateProfile};

pub const API_VERSION: &str = "imagegate.io/v1";
pub const KIND: &str = "GateConfig";

/// Top-level Kubernetes-style gate configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfigManifest {
    /// API version (must be "imagegate.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GateConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: GateConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Content under spec:
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfigSpec {
    /// Middle segment of report subjects
    #[serde(default = "default_system_tag")]
    pub system_tag: String,

    #[serde(default)]
    pub profile: GateProfile,

    #[serde(default)]
    pub retry: RetrySettings,

    /// Bare repository name → pipeline name
    #[serde(default)]
    pub pipelines: HashMap<String, String>,

    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub idempotency: IdempotencySettings,

    /// Wall-clock budget for one invocation, retry waits included
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub invocation_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Pipeline state reads before giving up on the approval token
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed wait between reads
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub delay: Duration,
}

/// Bounds on the process-local redelivery guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencySettings {
    /// How long a completed outcome suppresses redeliveries
    #[serde(default = "default_idempotency_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    /// Oldest keys are evicted past this many
    #[serde(default = "default_idempotency_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_finding_source")]
    pub finding_source: String,

    #[serde(default = "default_image_registry")]
    pub image_registry: String,

    #[serde(default = "default_pipeline_orchestrator")]
    pub pipeline_orchestrator: String,

    #[serde(default = "default_notification_webhook")]
    pub notification_webhook: String,

    /// Optional topic forwarded with every notification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_topic: Option<String>,

    /// Event signal sink, only used when the profile emits events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_sink: Option<String>,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default)]
    pub mode: ApprovalMode,

    /// Base URL of the approve/reject links sent in manual review mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_base_url: Option<String>,
}

fn default_system_tag() -> String {
    "Thor".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_idempotency_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_idempotency_max_entries() -> usize {
    10_000
}

fn default_finding_source() -> String {
    "http://localhost:9101".to_string()
}

fn default_image_registry() -> String {
    "http://localhost:9102".to_string()
}

fn default_pipeline_orchestrator() -> String {
    "http://localhost:9103".to_string()
}

fn default_notification_webhook() -> String {
    "http://localhost:9104/notify".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay: default_retry_delay(),
        }
    }
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            ttl: default_idempotency_ttl(),
            max_entries: default_idempotency_max_entries(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            finding_source: default_finding_source(),
            image_registry: default_image_registry(),
            pipeline_orchestrator: default_pipeline_orchestrator(),
            notification_webhook: default_notification_webhook(),
            notification_topic: None,
            event_sink: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for GateConfigSpec {
    fn default() -> Self {
        Self {
            system_tag: default_system_tag(),
            profile: GateProfile::default(),
            retry: RetrySettings::default(),
            pipelines: HashMap::new(),
            endpoints: EndpointsConfig::default(),
            approval: ApprovalConfig::default(),
            idempotency: IdempotencySettings::default(),
            invocation_timeout: None,
        }
    }
}

impl Default for GateConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "imagegate".to_string(),
                labels: None,
            },
            spec: GateConfigSpec::default(),
        }
    }
}

impl GateConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. IMAGEGATE_CONFIG_PATH environment variable
    /// 2. ./imagegate-config.yaml (working directory)
    /// 3. ~/.imagegate/config.yaml (user home)
    /// 4. /etc/imagegate/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("IMAGEGATE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./imagegate-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".imagegate").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/imagegate/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("IMAGEGATE_RETRY_MAX_ATTEMPTS") {
            match val.parse::<u32>() {
                Ok(attempts) => {
                    tracing::info!("Environment override: IMAGEGATE_RETRY_MAX_ATTEMPTS={}", attempts);
                    self.spec.retry.max_attempts = attempts;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for IMAGEGATE_RETRY_MAX_ATTEMPTS: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("IMAGEGATE_RETRY_DELAY") {
            match humantime_serde::re::humantime::parse_duration(&val) {
                Ok(delay) => {
                    tracing::info!("Environment override: IMAGEGATE_RETRY_DELAY={}", val);
                    self.spec.retry.delay = delay;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for IMAGEGATE_RETRY_DELAY: '{}'. Expected a duration like '60s'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("IMAGEGATE_APPROVAL_MODE") {
            match val.to_lowercase().as_str() {
                "auto_apply" | "auto" => {
                    tracing::info!("Environment override: IMAGEGATE_APPROVAL_MODE=auto_apply");
                    self.spec.approval.mode = ApprovalMode::AutoApply;
                }
                "manual_review" | "manual" => {
                    tracing::info!("Environment override: IMAGEGATE_APPROVAL_MODE=manual_review");
                    self.spec.approval.mode = ApprovalMode::ManualReview;
                }
                _ => tracing::warn!(
                    "Invalid value for IMAGEGATE_APPROVAL_MODE: '{}'. Expected auto_apply/manual_review. Ignoring.",
                    val
                ),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.system_tag.is_empty() {
            anyhow::bail!("spec.system_tag cannot be empty");
        }

        if let Err(reason) = self.spec.profile.validate() {
            anyhow::bail!("spec.{}", reason);
        }

        if self.spec.retry.max_attempts == 0 {
            anyhow::bail!("spec.retry.max_attempts must be at least 1");
        }

        if self.spec.idempotency.max_entries == 0 {
            anyhow::bail!("spec.idempotency.max_entries must be at least 1");
        }

        for (repository, pipeline) in &self.spec.pipelines {
            if repository.is_empty() || pipeline.is_empty() {
                anyhow::bail!(
                    "spec.pipelines entries cannot be empty ('{}' -> '{}')",
                    repository,
                    pipeline
                );
            }
        }

        let endpoints = &self.spec.endpoints;
        for (field, url) in [
            ("finding_source", &endpoints.finding_source),
            ("image_registry", &endpoints.image_registry),
            ("pipeline_orchestrator", &endpoints.pipeline_orchestrator),
            ("notification_webhook", &endpoints.notification_webhook),
        ] {
            if url.is_empty() {
                anyhow::bail!("spec.endpoints.{} cannot be empty", field);
            }
        }

        if self.spec.profile.emit_event_signal && endpoints.event_sink.is_none() {
            tracing::warn!("profile.emit_event_signal is on but no event_sink is configured; events stay in-process");
        }

        if self.spec.approval.mode == ApprovalMode::ManualReview
            && self.spec.approval.link_base_url.as_deref().map_or(true, str::is_empty)
        {
            anyhow::bail!("spec.approval.link_base_url is required in manual_review mode");
        }

        Ok(())
    }
}
