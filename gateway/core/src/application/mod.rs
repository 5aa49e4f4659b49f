// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod call_executor;
pub mod scheduler;
pub mod aggregator;
pub mod query_projector;
pub mod health;

// Re-export use cases for convenience
pub use call_executor::{CallExecutor, HttpCallExecutor};
pub use scheduler::BatchScheduler;
pub use aggregator::{AggregateError, BatchStatus, RequestAggregator};
pub use query_projector::QueryProjector;
pub use health::{HealthMonitor, HealthReport, ServiceHealth};
