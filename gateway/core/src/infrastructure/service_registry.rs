// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory service registry shared by the executor, health monitor and
//! admin API.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use crate::domain::endpoint::{ServiceEndpoint, ServiceRegistry};

#[derive(Debug, Clone, Default)]
pub struct InMemoryServiceRegistry {
    endpoints: Arc<RwLock<HashMap<String, ServiceEndpoint>>>,
}

impl InMemoryServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_endpoints(endpoints: impl IntoIterator<Item = ServiceEndpoint>) -> Self {
        let registry = Self::new();
        for endpoint in endpoints {
            registry.register(endpoint);
        }
        registry
    }

    pub fn count(&self) -> usize {
        self.endpoints.read().len()
    }
}

impl ServiceRegistry for InMemoryServiceRegistry {
    fn register(&self, endpoint: ServiceEndpoint) {
        debug!("Registered service endpoint: name={}, base_url={}", endpoint.name, endpoint.base_url);
        self.endpoints.write().insert(endpoint.name.clone(), endpoint);
    }

    fn unregister(&self, name: &str) -> Option<ServiceEndpoint> {
        let removed = self.endpoints.write().remove(name);
        if removed.is_some() {
            debug!("Unregistered service endpoint: name={}", name);
        }
        removed
    }

    fn lookup(&self, name: &str) -> Option<ServiceEndpoint> {
        self.endpoints.read().get(name).cloned()
    }

    fn list(&self) -> Vec<ServiceEndpoint> {
        let mut endpoints: Vec<ServiceEndpoint> = self.endpoints.read().values().cloned().collect();
        endpoints.sort_by(|a, b| a.name.cmp(&b.name));
        endpoints
    }

    fn set_health(&self, name: &str, healthy: bool) -> bool {
        match self.endpoints.write().get_mut(name) {
            Some(endpoint) => {
                endpoint.healthy = healthy;
                endpoint.last_checked_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_replaces_by_name() {
        let registry = InMemoryServiceRegistry::new();
        registry.register(ServiceEndpoint::new("iam", "http://iam:8081"));
        registry.register(ServiceEndpoint::new("iam", "http://iam-v2:8081"));

        assert_eq!(registry.count(), 1);
        assert_eq!(registry.lookup("iam").unwrap().base_url, "http://iam-v2:8081");
    }

    #[test]
    fn test_unregister_and_list_order() {
        let registry = InMemoryServiceRegistry::from_endpoints([
            ServiceEndpoint::new("sales", "http://sales:8083"),
            ServiceEndpoint::new("customer", "http://customer:8082"),
        ]);

        let names: Vec<String> = registry.list().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["customer", "sales"]);

        assert!(registry.unregister("sales").is_some());
        assert!(registry.unregister("sales").is_none());
        assert!(registry.lookup("sales").is_none());
    }

    #[test]
    fn test_set_health_records_probe_time() {
        let registry = InMemoryServiceRegistry::from_endpoints([ServiceEndpoint::new("iam", "http://iam:8081")]);

        assert!(registry.set_health("iam", false));
        let endpoint = registry.lookup("iam").unwrap();
        assert!(!endpoint.healthy);
        assert!(endpoint.last_checked_at.is_some());

        assert!(!registry.set_health("unknown", true));
    }

    #[test]
    fn test_clones_share_state() {
        let registry = InMemoryServiceRegistry::new();
        let handle = registry.clone();
        handle.register(ServiceEndpoint::new("notification", "http://notification:8084"));
        assert!(registry.lookup("notification").is_some());
    }
}
