// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Execution-order tests for the batch scheduler and aggregator.
//!
//! An instrumented executor stamps each call with a logical start and finish
//! tick and tracks how many calls are in flight, so the tests can assert:
//! - dependency order (a call starts after all of its dependencies finished)
//! - the global concurrency bound
//! - exactly-once execution of every reachable call

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crm_gateway_core::application::{BatchScheduler, CallExecutor, RequestAggregator};
use crm_gateway_core::domain::call::{AggregatedRequest, CallDescriptor, CallOutcome};
use crm_gateway_core::domain::graph::{DependencyGraph, GraphPolicy};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    finish: usize,
}

#[derive(Default)]
struct InstrumentedExecutor {
    clock: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    spans: Mutex<HashMap<String, Vec<Span>>>,
}

impl InstrumentedExecutor {
    fn tick(&self) -> usize {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    fn span(&self, id: &str) -> Span {
        let spans = self.spans.lock();
        let recorded = &spans[id];
        assert_eq!(recorded.len(), 1, "call {} ran {} times", id, recorded.len());
        recorded[0]
    }
}

#[async_trait]
impl CallExecutor for InstrumentedExecutor {
    async fn execute(&self, call: &CallDescriptor, _cancel: &CancellationToken) -> CallOutcome {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let start = self.tick();

        // Uneven latencies shuffle completion order
        let jitter = call.id.bytes().map(u64::from).sum::<u64>() % 7;
        tokio::time::sleep(Duration::from_millis(1 + jitter)).await;

        let finish = self.tick();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.spans
            .lock()
            .entry(call.id.clone())
            .or_default()
            .push(Span { start, finish });

        let mut outcome = CallOutcome::for_call(call);
        outcome.status_code = call.path.trim_start_matches("/status/").parse().unwrap_or(200);
        outcome
    }
}

fn call(id: &str, deps: &[&str]) -> CallDescriptor {
    CallDescriptor::get(id, "customer", format!("/{}", id)).depends_on(deps.iter().copied())
}

fn assert_dependency_order(executor: &InstrumentedExecutor, calls: &[CallDescriptor]) {
    for call in calls {
        let span = executor.span(&call.id);
        for dependency in &call.depends_on {
            let dependency_span = executor.span(dependency);
            assert!(
                span.start > dependency_span.finish,
                "{} started at {} before {} finished at {}",
                call.id,
                span.start,
                dependency,
                dependency_span.finish
            );
        }
    }
}

/// Layered graph: every node in layer n depends on two nodes of layer n-1.
fn layered_calls(layers: usize, width: usize) -> Vec<CallDescriptor> {
    let mut calls = Vec::new();
    for layer in 0..layers {
        for index in 0..width {
            let id = format!("l{}n{}", layer, index);
            let deps: Vec<String> = if layer == 0 {
                Vec::new()
            } else {
                vec![
                    format!("l{}n{}", layer - 1, index),
                    format!("l{}n{}", layer - 1, (index + 1) % width),
                ]
            };
            calls.push(CallDescriptor::get(id.clone(), "customer", format!("/{}", id)).depends_on(deps));
        }
    }
    calls
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fan_out_after_single_root() {
    let calls = vec![call("A", &[]), call("B", &["A"]), call("C", &["A"])];
    let executor = Arc::new(InstrumentedExecutor::default());

    let graph = DependencyGraph::build(calls.clone()).unwrap();
    let outcomes = BatchScheduler::new(10)
        .run(graph, executor.clone(), &CancellationToken::new())
        .await;

    assert_eq!(outcomes.len(), 3);
    assert_dependency_order(&executor, &calls);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_layered_graph_respects_dependency_order() {
    let calls = layered_calls(5, 6);
    let executor = Arc::new(InstrumentedExecutor::default());

    let graph = DependencyGraph::build(calls.clone()).unwrap();
    let outcomes = BatchScheduler::new(8)
        .run(graph, executor.clone(), &CancellationToken::new())
        .await;

    assert_eq!(outcomes.len(), calls.len());
    assert_dependency_order(&executor, &calls);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_bound_holds() {
    let calls: Vec<CallDescriptor> = (0..40).map(|i| call(&format!("c{}", i), &[])).collect();
    let executor = Arc::new(InstrumentedExecutor::default());

    let graph = DependencyGraph::build(calls).unwrap();
    let outcomes = BatchScheduler::new(3)
        .run(graph, executor.clone(), &CancellationToken::new())
        .await;

    assert_eq!(outcomes.len(), 40);
    let max = executor.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "observed {} concurrent calls", max);
    assert!(max >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_bound_spans_dependency_levels() {
    let calls = layered_calls(4, 10);
    let executor = Arc::new(InstrumentedExecutor::default());

    let graph = DependencyGraph::build(calls.clone()).unwrap();
    BatchScheduler::new(2)
        .run(graph, executor.clone(), &CancellationToken::new())
        .await;

    assert!(executor.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_dependency_order(&executor, &calls);
}

#[tokio::test]
async fn test_every_node_appears_exactly_once() {
    let calls = layered_calls(3, 4);
    let executor = Arc::new(InstrumentedExecutor::default());

    let graph = DependencyGraph::build(calls.clone()).unwrap();
    let outcomes = BatchScheduler::new(4)
        .run(graph, executor.clone(), &CancellationToken::new())
        .await;

    let mut ids: Vec<String> = outcomes.into_iter().map(|outcome| outcome.id).collect();
    ids.sort();
    let mut expected: Vec<String> = calls.into_iter().map(|call| call.id).collect();
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_dangling_dependency_runs_as_root() {
    let executor = Arc::new(InstrumentedExecutor::default());
    let aggregator = RequestAggregator::new(executor.clone(), BatchScheduler::new(4), GraphPolicy::default());
    let request = AggregatedRequest::new(vec![call("B", &["Z"])]);

    let response = aggregator.aggregate(request, &CancellationToken::new()).await.unwrap();

    assert_eq!(response.responses.len(), 1);
    assert_eq!(response.responses[0].id, "B");
    assert_eq!(response.responses[0].status_code, 200);
}

#[tokio::test]
async fn test_dangling_dependency_rejected_under_strict_policy() {
    let executor = Arc::new(InstrumentedExecutor::default());
    let strict = GraphPolicy {
        reject_cycles: true,
        reject_dangling: true,
    };
    let aggregator = RequestAggregator::new(executor.clone(), BatchScheduler::new(4), strict);
    let request = AggregatedRequest::new(vec![call("B", &["Z"]), call("C", &["Y"])]);

    let err = aggregator.aggregate(request, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.to_string(), "unknown dependencies: B -> Z, C -> Y");
    assert!(executor.spans.lock().is_empty());
}

#[tokio::test]
async fn test_failed_dependency_still_unblocks_dependents() {
    let executor = Arc::new(InstrumentedExecutor::default());
    let aggregator = RequestAggregator::new(executor.clone(), BatchScheduler::new(4), GraphPolicy::default());
    let request = AggregatedRequest::new(vec![
        CallDescriptor::get("parent", "customer", "/status/500"),
        CallDescriptor::get("child", "customer", "/status/200").depends_on(["parent"]),
    ]);

    let response = aggregator.aggregate(request, &CancellationToken::new()).await.unwrap();

    assert_eq!(response.responses.len(), 2);
    assert_eq!(response.outcome("parent").unwrap().status_code, 500);
    assert_eq!(response.outcome("child").unwrap().status_code, 200);
}

#[tokio::test]
async fn test_error_count_matches_failed_outcomes() {
    let executor = Arc::new(InstrumentedExecutor::default());
    let aggregator = RequestAggregator::new(executor, BatchScheduler::new(4), GraphPolicy::default());
    let request = AggregatedRequest::new(vec![
        CallDescriptor::get("a", "customer", "/status/200"),
        CallDescriptor::get("b", "customer", "/status/404"),
        CallDescriptor::get("c", "customer", "/status/503"),
        CallDescriptor::get("d", "customer", "/status/201"),
    ]);

    let response = aggregator.aggregate(request, &CancellationToken::new()).await.unwrap();

    let failed = response.responses.iter().filter(|o| !o.error.is_empty() || o.status_code >= 400).count();
    assert_eq!(response.error_count, failed);
    assert_eq!(response.error_count, 2);
    assert_eq!(response.has_errors, response.error_count > 0);
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancellation_stops_new_launches() {
    let executor = Arc::new(InstrumentedExecutor::default());
    let graph = DependencyGraph::build(vec![call("a", &[]), call("b", &["a"]), call("c", &["b"])]).unwrap();
    let cancel = CancellationToken::new();

    let scheduler = BatchScheduler::new(1);
    let cancel_soon = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2)).await;
        cancel_soon.cancel();
    });
    let outcomes = scheduler.run(graph, executor.clone(), &cancel).await;

    // "a" sleeps 7ms and does not observe the token; cancellation at 2ms
    // lets it finish but nothing downstream starts
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].id, "a");
}
