// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Prometheus metrics recorder.
//!
//! # Metrics Exposed
//!
//! - `gateway_calls_total` - Executed calls by service and outcome (ok, error, cache_hit)
//! - `gateway_call_duration_seconds` - Per-call latency histogram by service
//! - `gateway_cache_hits_total` - Calls answered from the response cache
//! - `gateway_call_retries_total` - Transport retries by service
//! - `gateway_batches_total` - Aggregated batches by resulting HTTP status class

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to install Prometheus recorder: {0}")]
    Install(String),
}

/// Install the global recorder. Only one recorder may exist per process.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::Install(e.to_string()))?;

    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_counter!("gateway_calls_total", "Total number of executed upstream calls");
    metrics::describe_histogram!(
        "gateway_call_duration_seconds",
        metrics::Unit::Seconds,
        "Upstream call duration in seconds"
    );
    metrics::describe_counter!("gateway_cache_hits_total", "Total number of calls served from cache");
    metrics::describe_counter!("gateway_call_retries_total", "Total number of upstream retries");
    metrics::describe_counter!("gateway_batches_total", "Total number of aggregated batches");
}
