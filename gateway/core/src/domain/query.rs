// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Declarative query shape: a named set of independent reads answered as a
//! map of named results instead of positional responses.

use crate::domain::payload::Payload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryField {
    /// Key of this field in the response `data` map
    pub name: String,
    pub service: String,
    pub path: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,

    /// Nested selections are part of the wire schema but rejected when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<QueryField>,
}

impl QueryField {
    pub fn new(name: impl Into<String>, service: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
            path: path.into(),
            params: BTreeMap::new(),
            fields: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub fields: Vec<QueryField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: BTreeMap<String, Payload>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<QueryError>,
}
