// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Endpoint Health Monitor - background probing of backend services
//!
//! Periodically issues `GET base_url + health_path` for every registered
//! endpoint that declares a health path and records the result in the
//! registry. Health is informational; the executor still routes calls to
//! unhealthy endpoints.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::endpoint::{ServiceEndpoint, ServiceRegistry};
use crate::domain::gateway_config::HealthConfig;
use crate::domain::transport::{Transport, TransportRequest};

pub struct HealthMonitor {
    registry: Arc<dyn ServiceRegistry>,
    transport: Arc<dyn Transport>,
    config: HealthConfig,
    shutdown_token: CancellationToken,
}

impl HealthMonitor {
    pub fn new(registry: Arc<dyn ServiceRegistry>, transport: Arc<dyn Transport>, config: HealthConfig) -> Self {
        Self {
            registry,
            transport,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the monitor background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Health monitor is disabled");
            return;
        }

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Starting health monitor background task"
        );

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let results = self.probe_all().await;
                    let unhealthy = results.values().filter(|healthy| !**healthy).count();
                    debug!(probed = results.len(), unhealthy, "Health probe cycle completed");
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping health monitor");
                    break;
                }
            }
        }

        info!("Health monitor background task stopped");
    }

    /// Probe every endpoint with a health path once, concurrently.
    pub async fn probe_all(&self) -> HashMap<String, bool> {
        let probes = self
            .registry
            .list()
            .into_iter()
            .filter(|endpoint| endpoint.health_path.is_some())
            .map(|endpoint| async move {
                let healthy = self.probe(&endpoint).await;
                (endpoint, healthy)
            });

        let mut results = HashMap::new();
        for (endpoint, healthy) in join_all(probes).await {
            if endpoint.healthy != healthy {
                if healthy {
                    info!(service = %endpoint.name, "Service became healthy");
                } else {
                    warn!(service = %endpoint.name, "Service became unhealthy");
                }
            }
            self.registry.set_health(&endpoint.name, healthy);
            results.insert(endpoint.name, healthy);
        }
        results
    }

    async fn probe(&self, endpoint: &ServiceEndpoint) -> bool {
        let url = match endpoint.health_url() {
            Some(Ok(url)) => url,
            Some(Err(e)) => {
                warn!(service = %endpoint.name, "Invalid health URL: {}", e);
                return false;
            }
            None => return true,
        };

        let request = TransportRequest {
            method: "GET".to_string(),
            url,
            headers: HashMap::new(),
            body: None,
            timeout: self.config.timeout,
        };

        match self.transport.send(request).await {
            Ok(response) => response.status == 200,
            Err(e) => {
                debug!(service = %endpoint.name, "Health probe failed: {}", e);
                false
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub base_url: String,
    pub healthy: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// "healthy" when every service is healthy, otherwise "degraded"
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub services: Vec<ServiceHealth>,
}

impl HealthReport {
    pub fn from_registry(registry: &dyn ServiceRegistry, uptime: Duration) -> Self {
        let services: Vec<ServiceHealth> = registry
            .list()
            .into_iter()
            .map(|endpoint| ServiceHealth {
                name: endpoint.name,
                base_url: endpoint.base_url,
                healthy: endpoint.healthy,
                last_checked_at: endpoint.last_checked_at,
            })
            .collect();

        let status = if services.iter().all(|service| service.healthy) {
            "healthy"
        } else {
            "degraded"
        };

        Self {
            status,
            uptime_seconds: uptime.as_secs(),
            services,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transport::{TransportError, TransportResponse};
    use crate::infrastructure::service_registry::InMemoryServiceRegistry;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers by host: "up" -> 200, "sick" -> 503, anything else refuses.
    #[derive(Default)]
    struct HostTransport {
        probes: AtomicUsize,
    }

    #[async_trait]
    impl Transport for HostTransport {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let status = match request.url.host_str() {
                Some("up") => 200,
                Some("sick") => 503,
                _ => return Err(TransportError::Connect("connection refused".to_string())),
            };
            Ok(TransportResponse {
                status,
                headers: HashMap::new(),
                body: Bytes::new(),
            })
        }
    }

    fn registry() -> Arc<InMemoryServiceRegistry> {
        Arc::new(InMemoryServiceRegistry::from_endpoints([
            ServiceEndpoint::new("iam", "http://up:8081").with_health_path("/health"),
            ServiceEndpoint::new("sales", "http://sick:8083").with_health_path("/health"),
            ServiceEndpoint::new("customer", "http://down:8082").with_health_path("/health"),
            ServiceEndpoint::new("notification", "http://down:8084"),
        ]))
    }

    #[tokio::test]
    async fn test_probe_all_records_health() {
        let registry = registry();
        let transport = Arc::new(HostTransport::default());
        let monitor = HealthMonitor::new(registry.clone(), transport.clone(), HealthConfig::default());

        let results = monitor.probe_all().await;

        assert_eq!(results.len(), 3);
        assert!(results["iam"]);
        assert!(!results["sales"]);
        assert!(!results["customer"]);
        assert_eq!(transport.probes.load(Ordering::SeqCst), 3);

        // Without a health path the endpoint is left alone
        let notification = registry.lookup("notification").unwrap();
        assert!(notification.healthy);
        assert!(notification.last_checked_at.is_none());

        let report = HealthReport::from_registry(registry.as_ref(), Duration::from_secs(90));
        assert_eq!(report.status, "degraded");
        assert_eq!(report.uptime_seconds, 90);
        assert_eq!(report.services.len(), 4);
    }

    #[tokio::test]
    async fn test_report_is_healthy_when_all_services_are() {
        let registry = InMemoryServiceRegistry::from_endpoints([
            ServiceEndpoint::new("iam", "http://up:8081").with_health_path("/health"),
        ]);
        let monitor = HealthMonitor::new(
            Arc::new(registry.clone()),
            Arc::new(HostTransport::default()),
            HealthConfig::default(),
        );
        monitor.probe_all().await;

        let report = HealthReport::from_registry(&registry, Duration::ZERO);
        assert_eq!(report.status, "healthy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_probes_periodically_until_shutdown() {
        let transport = Arc::new(HostTransport::default());
        let config = HealthConfig {
            enabled: true,
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(1),
        };
        let monitor = Arc::new(HealthMonitor::new(registry(), transport.clone(), config));
        let shutdown = monitor.shutdown_token();

        let handle = monitor.start();
        tokio::time::sleep(Duration::from_secs(25)).await;
        shutdown.cancel();
        handle.await.unwrap();

        // Ticks at 0s, 10s and 20s, three probed endpoints each
        assert_eq!(transport.probes.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn test_disabled_monitor_exits_immediately() {
        let config = HealthConfig {
            enabled: false,
            ..Default::default()
        };
        let monitor = Arc::new(HealthMonitor::new(registry(), Arc::new(HostTransport::default()), config));
        monitor.start().await.unwrap();
    }
}
