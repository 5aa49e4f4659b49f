// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Call descriptors, call outcomes and the batch envelope.
//!
//! A batch is a flat list of [`CallDescriptor`]s. Each descriptor is keyed by
//! an id unique within the batch and may name other ids it depends on. The
//! engine answers with one [`CallOutcome`] per executed call, collected in
//! completion order into an [`AggregatedResponse`].

use crate::domain::payload::Payload;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// One logical service call inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDescriptor {
    /// Node key, unique within the batch
    pub id: String,

    /// Logical service name, resolved through the service registry
    pub service: String,

    #[serde(default = "default_method")]
    pub method: String,

    pub path: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// Ordered so that serialization (and the cache key) is deterministic
    #[serde(default, alias = "queryParams", skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Payload>,

    #[serde(default, alias = "dependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// A failure of a required call fails the whole batch at the HTTP boundary
    #[serde(default)]
    pub required: bool,
}

impl CallDescriptor {
    pub fn new(
        id: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            query_params: BTreeMap::new(),
            body: None,
            depends_on: Vec::new(),
            required: false,
        }
    }

    pub fn get(id: impl Into<String>, service: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(id, service, "GET", path)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Payload>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Only reads are eligible for response caching.
    pub fn is_read(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

fn default_method() -> String {
    "GET".to_string()
}

/// Normalized result of executing one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub id: String,
    pub service: String,
    pub status_code: u16,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Payload>,

    /// Empty means no error
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,

    #[serde(rename = "duration_ms", with = "millis")]
    pub duration: Duration,

    #[serde(default)]
    pub from_cache: bool,
}

impl CallOutcome {
    /// Outcome skeleton for a call that has not produced a result yet.
    pub fn for_call(call: &CallDescriptor) -> Self {
        Self {
            id: call.id.clone(),
            service: call.service.clone(),
            status_code: 0,
            headers: HashMap::new(),
            body: None,
            error: String::new(),
            duration: Duration::ZERO,
            from_cache: false,
        }
    }

    /// A call counts as failed when it carries an error or an HTTP error status.
    pub fn is_failure(&self) -> bool {
        !self.error.is_empty() || self.status_code >= 400
    }
}

/// Batch submitted by a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedRequest {
    /// Generated when absent
    #[serde(default, alias = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(default)]
    pub requests: Vec<CallDescriptor>,
}

impl AggregatedRequest {
    pub fn new(requests: Vec<CallDescriptor>) -> Self {
        Self {
            request_id: None,
            requests,
        }
    }

    /// Ids of the calls whose failure fails the whole batch.
    pub fn required_ids(&self) -> HashSet<String> {
        self.requests
            .iter()
            .filter(|call| call.required)
            .map(|call| call.id.clone())
            .collect()
    }
}

/// Aggregated result of one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResponse {
    pub request_id: String,

    /// Completion order, not submission order: correlate by `id`
    pub responses: Vec<CallOutcome>,

    #[serde(rename = "total_time_ms", with = "millis")]
    pub total_time: Duration,

    pub has_errors: bool,
    pub error_count: usize,
}

impl AggregatedResponse {
    pub fn outcome(&self, id: &str) -> Option<&CallOutcome> {
        self.responses.iter().find(|outcome| outcome.id == id)
    }
}

/// Durations travel as integral milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
