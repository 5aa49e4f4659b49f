// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain types and collaborator contracts.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure data model of a batch, its dependency graph, and the
//!   narrow interfaces (transport, cache, registry) the engine consumes

pub mod payload;
pub mod call;
pub mod graph;
pub mod endpoint;
pub mod cache;
pub mod transport;
pub mod query;
pub mod gateway_config;
