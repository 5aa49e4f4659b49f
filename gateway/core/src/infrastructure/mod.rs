// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod http_transport;
pub mod memory_cache;
pub mod service_registry;
pub mod telemetry;

pub use http_transport::ReqwestTransport;
pub use memory_cache::InMemoryResponseCache;
pub use service_registry::InMemoryServiceRegistry;
