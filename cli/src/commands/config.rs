// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use crm_gateway_core::domain::gateway_config::GatewayConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./crm-gateway.yaml)
        #[arg(short, long, default_value = "./crm-gateway.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. CRM_GATEWAY_CONFIG_PATH: {}",
            std::env::var("CRM_GATEWAY_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./crm-gateway.yaml");
        println!("  4. ~/.crm-gateway/config.yaml");
        println!("  5. /etc/crm-gateway/config.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", config.to_yaml_string()?);
        return Ok(());
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Gateway:".bold());
    println!("  Name: {}", config.metadata.name);
    println!(
        "  Listen: {}:{}",
        config.spec.server.bind_address, config.spec.server.port
    );
    println!();

    let aggregator = &config.spec.aggregator;
    println!("{}", "Aggregator:".bold());
    println!("  Max concurrent calls: {}", aggregator.max_concurrent);
    println!(
        "  Request timeout: {}",
        format_duration(aggregator.request_timeout)
    );
    match aggregator.batch_timeout {
        Some(timeout) => println!("  Batch timeout: {}", format_duration(timeout)),
        None => println!("  Batch timeout: {}", "(none)".dimmed()),
    }
    println!(
        "  Retries: {} (base delay {})",
        aggregator.retry_attempts,
        format_duration(aggregator.retry_delay)
    );
    if aggregator.enable_caching {
        println!("  Caching: enabled (ttl {})", format_duration(aggregator.cache_ttl));
    } else {
        println!("  Caching: {}", "disabled".yellow());
    }
    println!(
        "  Reject cycles: {}, reject unknown dependencies: {}",
        aggregator.reject_cycles, aggregator.reject_dangling_dependencies
    );
    println!();

    println!("{}", "Services:".bold());
    for service in &config.spec.services {
        println!("  {} → {}", service.name.bold(), service.base_url);
        if let Some(timeout) = service.timeout {
            println!("    Timeout: {}", format_duration(timeout));
        }
        if let Some(path) = &service.health_path {
            println!("    Health: {}", path);
        }
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/crm-gateway-with-examples.yaml").to_string()
    } else {
        GatewayConfigManifest::default()
            .to_yaml_string()
            .context("Failed to render default configuration")?
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn format_duration(duration: std::time::Duration) -> String {
    format!("{:?}", duration)
}
