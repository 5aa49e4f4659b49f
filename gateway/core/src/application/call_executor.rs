// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Call Executor - runs one call descriptor to completion
//!
//! Every failure mode is folded into the returned [`CallOutcome`]; nothing a
//! single call does can abort its siblings.
//!
//! # Steps
//!
//! 1. Cache lookup (reads only, caching enabled, cache configured)
//! 2. Service registry resolution
//! 3. Target URL and header merge
//! 4. Transport attempts with linear backoff on connection-level failures
//! 5. Cache write of `200` read responses

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::cache::{cache_key, ResponseCache};
use crate::domain::call::{CallDescriptor, CallOutcome};
use crate::domain::endpoint::{ServiceEndpoint, ServiceRegistry};
use crate::domain::gateway_config::AggregatorConfig;
use crate::domain::transport::{Transport, TransportError, TransportRequest, TransportResponse};

/// Executes a single call. The scheduler only depends on this seam.
#[async_trait]
pub trait CallExecutor: Send + Sync {
    async fn execute(&self, call: &CallDescriptor, cancel: &CancellationToken) -> CallOutcome;
}

pub struct HttpCallExecutor {
    config: AggregatorConfig,
    registry: Arc<dyn ServiceRegistry>,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn ResponseCache>>,
}

impl HttpCallExecutor {
    pub fn new(
        config: AggregatorConfig,
        registry: Arc<dyn ServiceRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            registry,
            transport,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    fn cache_for(&self, call: &CallDescriptor) -> Option<&Arc<dyn ResponseCache>> {
        if self.config.enable_caching && call.is_read() {
            self.cache.as_ref()
        } else {
            None
        }
    }

    fn build_request(
        &self,
        call: &CallDescriptor,
        endpoint: &ServiceEndpoint,
    ) -> Result<TransportRequest, TransportError> {
        let mut url = endpoint
            .url_for(&call.path)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        if !call.query_params.is_empty() {
            url.query_pairs_mut().extend_pairs(call.query_params.iter());
        }

        // Service headers first so call-level values win
        let mut headers: HashMap<String, String> = endpoint
            .headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
            .collect();
        for (name, value) in &call.headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }

        let body = call.body.as_ref().map(|payload| payload.as_bytes().clone());
        if body.is_some() {
            headers
                .entry("content-type".to_string())
                .or_insert_with(|| "application/json".to_string());
        }

        Ok(TransportRequest {
            method: call.method.to_ascii_uppercase(),
            url,
            headers,
            body,
            timeout: endpoint.timeout.unwrap_or(self.config.request_timeout),
        })
    }

    async fn send_with_retry(
        &self,
        call: &CallDescriptor,
        request: TransportRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            debug!(
                call_id = %call.id,
                service = %call.service,
                attempt = attempt + 1,
                url = %request.url,
                "Sending upstream request"
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                result = self.transport.send(request.clone()) => result,
            };

            let error = match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.config.retry_attempts => e,
                Err(e) => return Err(e),
            };

            let delay = self.config.retry_delay * (attempt + 1);
            warn!(
                call_id = %call.id,
                service = %call.service,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Upstream request failed, retrying"
            );
            metrics::counter!("gateway_call_retries_total", "service" => call.service.clone()).increment(1);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    async fn store(&self, cache: &Arc<dyn ResponseCache>, key: &str, outcome: &CallOutcome) {
        let Some(body) = outcome.body.as_ref() else {
            return;
        };
        if let Err(e) = cache.set(key, body.as_bytes().clone(), self.config.cache_ttl).await {
            warn!(call_id = %outcome.id, key, "Failed to cache response: {}", e);
        }
    }
}

#[async_trait]
impl CallExecutor for HttpCallExecutor {
    async fn execute(&self, call: &CallDescriptor, cancel: &CancellationToken) -> CallOutcome {
        let started = Instant::now();
        let mut outcome = CallOutcome::for_call(call);

        let cache = self.cache_for(call).map(|cache| (cache, cache_key(call)));
        if let Some((cache, key)) = &cache {
            if let Some(body) = cache.get(key).await {
                debug!(call_id = %call.id, key = %key, "Serving call from cache");
                metrics::counter!("gateway_cache_hits_total", "service" => call.service.clone()).increment(1);
                outcome.status_code = 200;
                outcome.body = Some(body.into());
                outcome.from_cache = true;
                return finish(outcome, started);
            }
        }

        let Some(endpoint) = self.registry.lookup(&call.service) else {
            outcome.status_code = 502;
            outcome.error = format!("service not found: {}", call.service);
            return finish(outcome, started);
        };

        let request = match self.build_request(call, &endpoint) {
            Ok(request) => request,
            Err(e) => {
                outcome.status_code = 500;
                outcome.error = e.to_string();
                return finish(outcome, started);
            }
        };

        match self.send_with_retry(call, request, cancel).await {
            Ok(response) => {
                outcome.status_code = response.status;
                outcome.headers = response.headers;
                outcome.body = Some(response.body.into());

                if response.status == 200 {
                    if let Some((cache, key)) = &cache {
                        self.store(cache, key, &outcome).await;
                    }
                }
            }
            Err(TransportError::Cancelled) => {
                outcome.status_code = 502;
                outcome.error = TransportError::Cancelled.to_string();
            }
            Err(e) if e.is_retryable() => {
                outcome.status_code = 502;
                outcome.error = format!("request failed: {}", e);
            }
            Err(e) => {
                outcome.status_code = 500;
                outcome.error = e.to_string();
            }
        }

        finish(outcome, started)
    }
}

fn finish(mut outcome: CallOutcome, started: Instant) -> CallOutcome {
    outcome.duration = started.elapsed();

    let result = if outcome.from_cache {
        "cache_hit"
    } else if outcome.is_failure() {
        "error"
    } else {
        "ok"
    };
    metrics::counter!(
        "gateway_calls_total",
        "service" => outcome.service.clone(),
        "outcome" => result
    )
    .increment(1);
    metrics::histogram!("gateway_call_duration_seconds", "service" => outcome.service.clone())
        .record(outcome.duration.as_secs_f64());

    outcome
}
