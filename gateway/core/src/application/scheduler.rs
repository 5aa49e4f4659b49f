// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bounded Concurrent Scheduler
//!
//! Runs every reachable node of a [`DependencyGraph`] exactly once, in
//! dependency order, with at most `max_concurrent` executor invocations in
//! flight across the batch.
//!
//! # Launch protocol
//!
//! Each node carries a countdown of unfinished dependencies. A finishing node
//! decrements the countdown of every dependent; the decrement that observes
//! the value `1` (the transition to zero) owns the launch. A second
//! `launched` flag claimed by compare-and-swap makes that launch idempotent,
//! so no interleaving of sibling completions can run a node twice.
//!
//! Nodes that never reach zero (cycles) are simply never launched; the run
//! still returns once every launched node has finished.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::application::call_executor::CallExecutor;
use crate::domain::call::CallOutcome;
use crate::domain::graph::{DependencyGraph, NodeIndex};

#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    max_concurrent: usize,
    deadline: Option<Duration>,
}

impl BatchScheduler {
    /// `max_concurrent` is clamped to at least one permit.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            deadline: None,
        }
    }

    /// Cancel whatever is still running once `deadline` has elapsed.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Execute the batch. Outcomes are returned in completion order and only
    /// for nodes that actually ran.
    pub async fn run(
        &self,
        graph: DependencyGraph,
        executor: Arc<dyn CallExecutor>,
        cancel: &CancellationToken,
    ) -> Vec<CallOutcome> {
        if graph.is_empty() {
            return Vec::new();
        }

        let run = Arc::new(BatchRun::new(
            graph,
            executor,
            self.max_concurrent,
            cancel.child_token(),
        ));

        let roots: Vec<NodeIndex> = run.graph.roots().collect();
        debug!(
            nodes = run.graph.len(),
            roots = roots.len(),
            max_concurrent = self.max_concurrent,
            "Starting batch execution"
        );
        for root in roots {
            run.launch(root);
        }

        // Every spawn after this point happens from inside a tracked task
        run.tracker.close();

        match self.deadline {
            Some(deadline) => {
                if tokio::time::timeout(deadline, run.tracker.wait()).await.is_err() {
                    warn!(
                        deadline_ms = deadline.as_millis() as u64,
                        "Batch deadline exceeded, cancelling in-flight calls"
                    );
                    run.cancel.cancel();
                    run.tracker.wait().await;
                }
            }
            None => run.tracker.wait().await,
        }

        let outcomes = std::mem::take(&mut *run.outcomes.lock());
        if outcomes.len() < run.graph.len() {
            debug!(
                executed = outcomes.len(),
                nodes = run.graph.len(),
                "Batch finished with unexecuted nodes"
            );
        }
        outcomes
    }
}

/// Shared state of one in-progress batch.
struct BatchRun {
    graph: DependencyGraph,
    pending: Vec<AtomicUsize>,
    launched: Vec<AtomicBool>,
    permits: Arc<Semaphore>,
    executor: Arc<dyn CallExecutor>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    outcomes: Mutex<Vec<CallOutcome>>,
}

impl BatchRun {
    fn new(
        graph: DependencyGraph,
        executor: Arc<dyn CallExecutor>,
        max_concurrent: usize,
        cancel: CancellationToken,
    ) -> Self {
        let pending = graph
            .nodes()
            .map(|node| AtomicUsize::new(node.dependencies().len()))
            .collect();
        let launched = graph.nodes().map(|_| AtomicBool::new(false)).collect();
        let capacity = graph.len();

        Self {
            graph,
            pending,
            launched,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            executor,
            cancel,
            tracker: TaskTracker::new(),
            outcomes: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    fn launch(self: &Arc<Self>, index: NodeIndex) {
        if self.launched[index]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if self.cancel.is_cancelled() {
            return;
        }

        let run = Arc::clone(self);
        self.tracker.spawn(async move {
            run.execute(index).await;
        });
    }

    async fn execute(self: Arc<Self>, index: NodeIndex) {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let node = self.graph.node(index);
        let outcome = self.executor.execute(node.call(), &self.cancel).await;
        drop(permit);

        debug!(
            call_id = %outcome.id,
            status = outcome.status_code,
            duration_ms = outcome.duration.as_millis() as u64,
            "Call completed"
        );
        self.outcomes.lock().push(outcome);

        for &dependent in node.dependents() {
            if self.pending[dependent].fetch_sub(1, Ordering::AcqRel) == 1 {
                self.launch(dependent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::CallDescriptor;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Counts executions per id and sleeps for a fixed time per call.
    #[derive(Default)]
    struct CountingExecutor {
        delay: Duration,
        runs: Mutex<HashMap<String, usize>>,
    }

    #[async_trait]
    impl CallExecutor for CountingExecutor {
        async fn execute(&self, call: &CallDescriptor, cancel: &CancellationToken) -> CallOutcome {
            *self.runs.lock().entry(call.id.clone()).or_default() += 1;

            let mut outcome = CallOutcome::for_call(call);
            tokio::select! {
                _ = cancel.cancelled() => {
                    outcome.status_code = 502;
                    outcome.error = "request cancelled".to_string();
                }
                _ = tokio::time::sleep(self.delay) => outcome.status_code = 200,
            }
            outcome
        }
    }

    fn call(id: &str, deps: &[&str]) -> CallDescriptor {
        CallDescriptor::get(id, "customer", format!("/{}", id)).depends_on(deps.iter().copied())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_dependent_launches_once() {
        let parents: Vec<String> = (0..16).map(|i| format!("p{}", i)).collect();
        for _ in 0..25 {
            let mut calls: Vec<CallDescriptor> = parents.iter().map(|id| call(id, &[])).collect();
            calls.push(CallDescriptor::get("join", "customer", "/join").depends_on(parents.iter().cloned()));

            let executor = Arc::new(CountingExecutor::default());
            let graph = DependencyGraph::build(calls).unwrap();
            let outcomes = BatchScheduler::new(16)
                .run(graph, executor.clone(), &CancellationToken::new())
                .await;

            assert_eq!(outcomes.len(), 17);
            assert_eq!(executor.runs.lock()["join"], 1);
        }
    }

    #[tokio::test]
    async fn test_empty_graph_returns_immediately() {
        let executor = Arc::new(CountingExecutor::default());
        let outcomes = BatchScheduler::new(4)
            .run(DependencyGraph::default(), executor, &CancellationToken::new())
            .await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_does_not_hang() {
        let graph = DependencyGraph::build(vec![call("a", &[]), call("x", &["y"]), call("y", &["x"])]).unwrap();
        let executor = Arc::new(CountingExecutor::default());

        let outcomes = BatchScheduler::new(2)
            .run(graph, executor, &CancellationToken::new())
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].id, "a");
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let graph = DependencyGraph::build(vec![call("a", &[]), call("b", &["a"])]).unwrap();
        let executor = Arc::new(CountingExecutor::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcomes = BatchScheduler::new(2).run(graph, executor.clone(), &cancel).await;

        assert!(outcomes.is_empty());
        assert!(executor.runs.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_in_flight_and_blocks_dependents() {
        let graph = DependencyGraph::build(vec![call("slow", &[]), call("after", &["slow"])]).unwrap();
        let executor = Arc::new(CountingExecutor {
            delay: Duration::from_secs(60),
            ..Default::default()
        });

        let outcomes = BatchScheduler::new(2)
            .with_deadline(Some(Duration::from_secs(1)))
            .run(graph, executor.clone(), &CancellationToken::new())
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].id, "slow");
        assert_eq!(outcomes[0].error, "request cancelled");
        assert!(!executor.runs.lock().contains_key("after"));
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        assert_eq!(BatchScheduler::new(0).max_concurrent(), 1);
    }
}
