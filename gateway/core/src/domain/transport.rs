// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Transport contract (Anti-Corruption Layer over the HTTP client).
//!
//! The executor only ever talks to a [`Transport`]; the reqwest adapter lives
//! in `crate::infrastructure::http_transport`, tests substitute fakes.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: String,
    pub url: Url,
    /// Lower-cased header names
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Applies to this attempt only
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("failed to create request: {0}")]
    InvalidRequest(String),

    #[error("failed to read response: {0}")]
    Body(String),
}

impl TransportError {
    /// Only connection-level failures are retried; HTTP error statuses never
    /// reach this type.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_) | Self::Network(_))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
