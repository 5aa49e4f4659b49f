// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Response cache contract.
//!
//! Any key/value store with per-entry TTL can back the executor. `get` must
//! report an expired entry as a miss whether or not it has been evicted yet.

use crate::domain::call::CallDescriptor;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Write or eviction failure reported by an external store. The in-memory
/// cache never fails; the executor logs the error and keeps the outcome.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Bytes>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Cache key for a read call: service, method, path and the sorted,
/// form-encoded query parameters. Headers and body are not part of the key.
pub fn cache_key(call: &CallDescriptor) -> String {
    let mut key = format!(
        "agg:{}:{}:{}",
        call.service,
        call.method.to_ascii_uppercase(),
        call.path
    );

    if !call.query_params.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(call.query_params.iter())
            .finish();
        key.push('?');
        key.push_str(&query);
    }

    key
}
