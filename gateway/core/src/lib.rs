// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # CRM Gateway Core
//!
//! Request aggregation engine behind the CRM API gateway. A caller submits a
//! batch of logical service calls, some depending on others; the engine runs
//! them in dependency order under a global concurrency cap, applies per-call
//! caching and retry policy, and returns one aggregated result with
//! partial-failure semantics.
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | Call/outcome types, dependency graph, collaborator traits, configuration |
//! | [`application`] | Application | Call executor, batch scheduler, aggregator, query projector, health monitor |
//! | [`infrastructure`] | Infrastructure | In-memory cache, in-memory service registry, reqwest transport |
//! | [`presentation`] | Presentation | Axum HTTP boundary |

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
