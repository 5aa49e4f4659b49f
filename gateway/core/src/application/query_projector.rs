// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Declarative Query Projector
//!
//! Turns a set of named fields into one batch of independent reads and maps
//! the outcomes back onto the field names.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::application::aggregator::{AggregateError, RequestAggregator};
use crate::domain::call::{AggregatedRequest, CallDescriptor, CallOutcome};
use crate::domain::payload::Payload;
use crate::domain::query::{QueryError, QueryField, QueryRequest, QueryResponse};

pub struct QueryProjector {
    aggregator: Arc<RequestAggregator>,
}

impl QueryProjector {
    pub fn new(aggregator: Arc<RequestAggregator>) -> Self {
        Self { aggregator }
    }

    pub async fn project(
        &self,
        query: QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, AggregateError> {
        validate(&query.fields)?;

        let calls: Vec<CallDescriptor> = query
            .fields
            .iter()
            .enumerate()
            .map(|(index, field)| to_call(index, field))
            .collect();
        let response = self
            .aggregator
            .aggregate(AggregatedRequest::new(calls), cancel)
            .await?;

        let mut outcomes: HashMap<String, CallOutcome> = response
            .responses
            .into_iter()
            .map(|outcome| (outcome.id.clone(), outcome))
            .collect();

        let mut result = QueryResponse::default();
        for (index, field) in query.fields.into_iter().enumerate() {
            match outcomes.remove(&field_id(index)) {
                Some(outcome) if !outcome.is_failure() => {
                    let body = outcome.body.unwrap_or_else(|| Payload::from("null"));
                    result.data.insert(field.name, body);
                }
                Some(outcome) => {
                    let message = if outcome.error.is_empty() {
                        format!("upstream returned status {}", outcome.status_code)
                    } else {
                        outcome.error
                    };
                    result.errors.push(QueryError {
                        field: field.name,
                        message,
                    });
                }
                None => result.errors.push(QueryError {
                    field: field.name,
                    message: "field was not executed".to_string(),
                }),
            }
        }

        Ok(result)
    }
}

fn field_id(index: usize) -> String {
    format!("field_{}", index)
}

fn to_call(index: usize, field: &QueryField) -> CallDescriptor {
    let mut call = CallDescriptor::get(field_id(index), field.service.clone(), field.path.clone());
    call.query_params = field.params.clone();
    call
}

fn validate(fields: &[QueryField]) -> Result<(), AggregateError> {
    let mut names = HashSet::new();
    for field in fields {
        if field.name.is_empty() {
            return Err(AggregateError::InvalidQuery("field name cannot be empty".to_string()));
        }
        if !names.insert(field.name.as_str()) {
            return Err(AggregateError::InvalidQuery(format!("duplicate field: {}", field.name)));
        }
        if !field.fields.is_empty() {
            return Err(AggregateError::InvalidQuery(format!(
                "nested selections are not supported (field '{}')",
                field.name
            )));
        }
    }
    Ok(())
}
