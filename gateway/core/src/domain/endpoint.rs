// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service endpoints and the registry contract.
//!
//! The registry is read by every in-flight call and mutated only through
//! explicit register/unregister (and health) operations. Implementations must
//! be safe for concurrent reads while being mutated; the only visibility
//! guarantee between a `register` and a concurrent `lookup` is eventual.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Logical service name used in call descriptors
    pub name: String,

    pub base_url: String,

    /// Per-attempt timeout; falls back to the aggregator request timeout
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Sent with every call to this service; call-level headers win
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// Probed by the health monitor when present (e.g. "/health")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_path: Option<String>,

    #[serde(default = "default_healthy")]
    pub healthy: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            timeout: None,
            headers: HashMap::new(),
            health_path: None,
            healthy: true,
            last_checked_at: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = Some(path.into());
        self
    }

    /// Absolute target for `path` on this service.
    pub fn url_for(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.base_url.trim_end_matches('/');
        if path.is_empty() || path.starts_with('/') {
            Url::parse(&format!("{}{}", base, path))
        } else {
            Url::parse(&format!("{}/{}", base, path))
        }
    }

    pub fn health_url(&self) -> Option<Result<Url, url::ParseError>> {
        self.health_path.as_deref().map(|path| self.url_for(path))
    }
}

fn default_healthy() -> bool {
    true
}

/// Name → endpoint lookup shared by all concurrent call executions.
pub trait ServiceRegistry: Send + Sync {
    /// Register or replace the endpoint under its name.
    fn register(&self, endpoint: ServiceEndpoint);

    /// Remove an endpoint, returning it if it was registered.
    fn unregister(&self, name: &str) -> Option<ServiceEndpoint>;

    fn lookup(&self, name: &str) -> Option<ServiceEndpoint>;

    /// All endpoints, sorted by name.
    fn list(&self) -> Vec<ServiceEndpoint>;

    /// Record a health probe result. Returns false when the service is unknown.
    fn set_health(&self, name: &str, healthy: bool) -> bool;
}
