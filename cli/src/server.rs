// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Gateway HTTP server wiring

use anyhow::{Context, Result};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crm_gateway_core::{
    application::{HealthMonitor, HttpCallExecutor, RequestAggregator},
    domain::gateway_config::GatewayConfigManifest,
    infrastructure::{telemetry, InMemoryResponseCache, InMemoryServiceRegistry, ReqwestTransport},
    presentation::{app, AppState},
};

/// Command-line values that take precedence over `spec.server`.
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

pub async fn run(manifest: GatewayConfigManifest, overrides: ServerOverrides) -> Result<()> {
    manifest
        .validate()
        .context("Configuration validation failed")?;

    info!(
        "Configuration loaded: name={}, services={}",
        manifest.metadata.name,
        manifest.spec.services.len()
    );

    let spec = manifest.spec;

    let metrics = match telemetry::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    // Initialize services
    let registry = Arc::new(InMemoryServiceRegistry::from_endpoints(spec.services.clone()));
    for service in &spec.services {
        info!("Registered service: {} -> {}", service.name, service.base_url);
    }

    let transport = Arc::new(ReqwestTransport::new()?);
    let cache = Arc::new(InMemoryResponseCache::new());
    let shutdown = CancellationToken::new();

    let sweeper = cache.spawn_sweeper(spec.cache.sweep_interval, shutdown.child_token());

    let monitor = Arc::new(HealthMonitor::new(
        registry.clone(),
        transport.clone(),
        spec.health.clone(),
    ));
    let monitor_token = monitor.shutdown_token();
    let monitor_handle = monitor.start();

    let executor = HttpCallExecutor::new(spec.aggregator.clone(), registry.clone(), transport).with_cache(cache);
    let aggregator = Arc::new(RequestAggregator::from_config(&spec.aggregator, Arc::new(executor)));

    let mut state = AppState::new(aggregator, registry);
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }

    // Start HTTP server
    let host = overrides.host.unwrap_or(spec.server.bind_address);
    let port = overrides.port.unwrap_or(spec.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Gateway listening on {}", addr);

    let signalled = shutdown.clone();
    let server = axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signalled.cancel();
        })
        .into_future();

    let grace = spec.server.shutdown_timeout;
    tokio::select! {
        result = server => result.context("HTTP server failed")?,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!("In-flight requests still running after {:?}, shutting down anyway", grace);
        }
    }

    monitor_token.cancel();
    shutdown.cancel();
    let (sweeper_result, monitor_result) = tokio::join!(sweeper, monitor_handle);
    if let Err(e) = sweeper_result {
        error!("Cache sweeper task failed: {}", e);
    }
    if let Err(e) = monitor_result {
        error!("Health monitor task failed: {}", e);
    }

    info!("Gateway shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
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
}
