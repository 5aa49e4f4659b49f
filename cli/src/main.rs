// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # CRM API Gateway
//!
//! The `crm-gateway` binary fronts the CRM backend services (iam, customer,
//! sales, notification) and answers batched, dependency-ordered requests.
//!
//! ## Commands
//!
//! - `crm-gateway serve` - Run the HTTP gateway
//! - `crm-gateway config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crm_gateway::commands::{self, ConfigCommand};
use crm_gateway::server::{self, ServerOverrides};
use crm_gateway_core::domain::gateway_config::GatewayConfigManifest;

/// CRM API Gateway - request aggregation for the CRM backend services
#[derive(Parser)]
#[command(name = "crm-gateway")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CRM_GATEWAY_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// HTTP port (default: spec.server.port)
    #[arg(long, global = true, env = "CRM_GATEWAY_PORT")]
    port: Option<u16>,

    /// HTTP bind address (default: spec.server.bind_address)
    #[arg(long, global = true, env = "CRM_GATEWAY_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CRM_GATEWAY_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway HTTP server
    #[command(name = "serve")]
    Serve,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is not an error
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let manifest = GatewayConfigManifest::load_or_default(cli.config.clone())
                .context("Failed to load configuration")?;

            let logging = manifest.logging();
            let level = cli.log_level.as_deref().unwrap_or(&logging.level);
            init_logging(level, &logging.format)?;

            let overrides = ServerOverrides {
                host: cli.host,
                port: cli.port,
            };
            server::run(manifest, overrides).await
        }
        Commands::Config { command } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "text")?;
            commands::config::handle_command(command, cli.config).await
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
