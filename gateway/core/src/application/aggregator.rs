// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Request Aggregator - graph validation, scheduling and result summary for
//! one batch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::call_executor::CallExecutor;
use crate::application::scheduler::BatchScheduler;
use crate::domain::call::{AggregatedRequest, AggregatedResponse, CallOutcome};
use crate::domain::gateway_config::AggregatorConfig;
use crate::domain::graph::{DependencyGraph, GraphError, GraphPolicy};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Overall result of a batch as seen by the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// No call failed
    Ok,
    /// Some calls failed, none of them required
    MultiStatus,
    /// At least one required call failed
    BadGateway,
}

impl BatchStatus {
    pub fn evaluate(response: &AggregatedResponse, required: &HashSet<String>) -> Self {
        if !response.has_errors {
            return Self::Ok;
        }

        let required_failed = response
            .responses
            .iter()
            .any(|outcome| outcome.is_failure() && required.contains(&outcome.id));

        if required_failed {
            Self::BadGateway
        } else {
            Self::MultiStatus
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::MultiStatus => 207,
            Self::BadGateway => 502,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::MultiStatus => "multi_status",
            Self::BadGateway => "bad_gateway",
        }
    }
}

/// Fold collected outcomes into the batch envelope.
pub fn summarize(request_id: String, responses: Vec<CallOutcome>, total_time: Duration) -> AggregatedResponse {
    let error_count = responses.iter().filter(|outcome| outcome.is_failure()).count();

    AggregatedResponse {
        request_id,
        responses,
        total_time,
        has_errors: error_count > 0,
        error_count,
    }
}

pub struct RequestAggregator {
    executor: Arc<dyn CallExecutor>,
    scheduler: BatchScheduler,
    policy: GraphPolicy,
}

impl RequestAggregator {
    pub fn new(executor: Arc<dyn CallExecutor>, scheduler: BatchScheduler, policy: GraphPolicy) -> Self {
        Self {
            executor,
            scheduler,
            policy,
        }
    }

    pub fn from_config(config: &AggregatorConfig, executor: Arc<dyn CallExecutor>) -> Self {
        let scheduler = BatchScheduler::new(config.max_concurrent).with_deadline(config.batch_timeout);
        Self::new(executor, scheduler, config.graph_policy())
    }

    /// Run one batch. Only malformed graphs are errors; every per-call
    /// failure is reported inside the response.
    pub async fn aggregate(
        &self,
        request: AggregatedRequest,
        cancel: &CancellationToken,
    ) -> Result<AggregatedResponse, AggregateError> {
        let started = Instant::now();
        let required = request.required_ids();
        let request_id = request
            .request_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let graph = DependencyGraph::build(request.requests)?;
        for reference in graph.dangling() {
            warn!(
                batch_id = %request_id,
                call_id = %reference.call_id,
                missing = %reference.missing,
                "Ignoring dependency on a call that is not part of the batch"
            );
        }
        graph.validate(self.policy)?;

        let calls = graph.len();
        let outcomes = self.scheduler.run(graph, Arc::clone(&self.executor), cancel).await;
        let response = summarize(request_id, outcomes, started.elapsed());

        let status = BatchStatus::evaluate(&response, &required);
        metrics::counter!("gateway_batches_total", "status" => status.as_str()).increment(1);
        info!(
            batch_id = %response.request_id,
            calls,
            executed = response.responses.len(),
            errors = response.error_count,
            status = status.as_str(),
            total_ms = response.total_time.as_millis() as u64,
            "Batch aggregated"
        );

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::CallDescriptor;
    use async_trait::async_trait;

    /// Answers every call with the status encoded in its path ("/500" -> 500).
    struct PathStatusExecutor;

    #[async_trait]
    impl CallExecutor for PathStatusExecutor {
        async fn execute(&self, call: &CallDescriptor, _cancel: &CancellationToken) -> CallOutcome {
            let mut outcome = CallOutcome::for_call(call);
            outcome.status_code = call.path.trim_start_matches('/').parse().unwrap_or(200);
            outcome
        }
    }

    fn aggregator(policy: GraphPolicy) -> RequestAggregator {
        RequestAggregator::new(Arc::new(PathStatusExecutor), BatchScheduler::new(4), policy)
    }

    fn outcome(id: &str, status: u16, error: &str) -> CallOutcome {
        let mut outcome = CallOutcome::for_call(&CallDescriptor::get(id, "customer", "/"));
        outcome.status_code = status;
        outcome.error = error.to_string();
        outcome
    }

    #[test]
    fn test_summarize_counts_errors() {
        let response = summarize(
            "r".to_string(),
            vec![
                outcome("a", 200, ""),
                outcome("b", 404, ""),
                outcome("c", 200, "failed to read response: eof"),
                outcome("d", 502, "service not found: x"),
            ],
            Duration::from_millis(5),
        );

        assert_eq!(response.error_count, 3);
        assert!(response.has_errors);

        let clean = summarize("r".to_string(), vec![outcome("a", 204, "")], Duration::ZERO);
        assert_eq!(clean.error_count, 0);
        assert!(!clean.has_errors);
    }

    #[test]
    fn test_batch_status() {
        let required: HashSet<String> = ["a".to_string()].into();

        let ok = summarize("r".into(), vec![outcome("a", 200, "")], Duration::ZERO);
        assert_eq!(BatchStatus::evaluate(&ok, &required), BatchStatus::Ok);

        let optional_failed = summarize("r".into(), vec![outcome("a", 200, ""), outcome("b", 500, "")], Duration::ZERO);
        assert_eq!(BatchStatus::evaluate(&optional_failed, &required), BatchStatus::MultiStatus);

        let required_failed = summarize("r".into(), vec![outcome("a", 500, ""), outcome("b", 200, "")], Duration::ZERO);
        assert_eq!(BatchStatus::evaluate(&required_failed, &required), BatchStatus::BadGateway);
        assert_eq!(BatchStatus::BadGateway.as_u16(), 502);
    }

    #[tokio::test]
    async fn test_request_id_is_generated_when_absent() {
        let request = AggregatedRequest::new(vec![CallDescriptor::get("a", "customer", "/200")]);
        let response = aggregator(GraphPolicy::default())
            .aggregate(request, &CancellationToken::new())
            .await
            .unwrap();

        assert!(Uuid::parse_str(&response.request_id).is_ok());
        assert_eq!(response.responses.len(), 1);
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let mut request = AggregatedRequest::new(vec![CallDescriptor::get("a", "customer", "/200")]);
        request.request_id = Some("req-42".to_string());

        let response = aggregator(GraphPolicy::default())
            .aggregate(request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.request_id, "req-42");
    }

    #[tokio::test]
    async fn test_cycle_is_rejected_by_default() {
        let request = AggregatedRequest::new(vec![
            CallDescriptor::get("a", "customer", "/200").depends_on(["b"]),
            CallDescriptor::get("b", "customer", "/200").depends_on(["a"]),
        ]);

        let err = aggregator(GraphPolicy::default())
            .aggregate(request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::Graph(GraphError::Cycle(_))));
    }

    #[tokio::test]
    async fn test_cycle_tolerated_when_allowed() {
        let request = AggregatedRequest::new(vec![
            CallDescriptor::get("root", "customer", "/200"),
            CallDescriptor::get("a", "customer", "/200").depends_on(["b"]),
            CallDescriptor::get("b", "customer", "/200").depends_on(["a"]),
        ]);
        let lenient = GraphPolicy {
            reject_cycles: false,
            reject_dangling: false,
        };

        let response = aggregator(lenient)
            .aggregate(request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.responses.len(), 1);
        assert!(!response.has_errors);
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_rejected() {
        let request = AggregatedRequest::new(vec![
            CallDescriptor::get("a", "customer", "/200"),
            CallDescriptor::get("a", "customer", "/201"),
        ]);

        let err = aggregator(GraphPolicy::default())
            .aggregate(request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "duplicate call id: a");
    }
}
