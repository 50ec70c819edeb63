// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use imagegate_core::domain::config::GateConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./imagegate-config.yaml)
        #[arg(short, long, default_value = "./imagegate-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GateConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. IMAGEGATE_CONFIG_PATH: {}",
            std::env::var("IMAGEGATE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./imagegate-config.yaml");
        println!("  4. ~/.imagegate/config.yaml");
        println!("  5. /etc/imagegate/config.yaml");
        println!();
    }

    let spec = &config.spec;

    println!("{}", "Current configuration:".bold());
    println!();
    println!("  Name: {}", config.metadata.name);
    println!("  System tag: {}", spec.system_tag);
    println!();

    println!("{}", "Gate Profile:".bold());
    println!("  Track HIGH: {}", spec.profile.track_high);
    println!(
        "  Gate on: {}",
        spec.profile
            .gate_on
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Approval gate: {}", spec.profile.gate_on_approval);
    println!("  Approval mode: {:?}", spec.approval.mode);
    println!("  Emit events: {}", spec.profile.emit_event_signal);
    println!(
        "  Retry: {} attempts, {}s apart",
        spec.retry.max_attempts,
        spec.retry.delay.as_secs()
    );
    println!();

    println!("{}", "Pipelines:".bold());
    if spec.pipelines.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    let mut pipelines: Vec<_> = spec.pipelines.iter().collect();
    pipelines.sort();
    for (repository, pipeline) in pipelines {
        println!("  {} → {}", repository.bold(), pipeline);
    }
    println!();

    println!("{}", "Endpoints:".bold());
    println!("  Finding source: {}", spec.endpoints.finding_source);
    println!("  Image registry: {}", spec.endpoints.image_registry);
    println!("  Pipeline orchestrator: {}", spec.endpoints.pipeline_orchestrator);
    println!("  Notification webhook: {}", spec.endpoints.notification_webhook);
    if let Some(sink) = &spec.endpoints.event_sink {
        println!("  Event sink: {}", sink);
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GateConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_templates_are_valid_manifests() {
        for template in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config = imagegate_core::domain::config::GateConfigManifest::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }
}
