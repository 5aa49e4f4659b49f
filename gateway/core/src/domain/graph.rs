// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-batch dependency graph.
//!
//! Nodes live in an owned arena indexed by position; dependency and dependent
//! edges are stored as index lists. The graph is built once at batch start,
//! read concurrently by the scheduler and discarded when the batch ends.
//!
//! Building never fails on graph shape: a `depends_on` id that is not part of
//! the batch is dropped (and remembered as a [`DanglingReference`]), and
//! cycles are representable. [`DependencyGraph::validate`] is the separate,
//! policy-driven pass that turns those shapes into errors.

use crate::domain::call::CallDescriptor;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use thiserror::Error;

pub type NodeIndex = usize;

#[derive(Debug, Clone)]
pub struct DependencyNode {
    call: CallDescriptor,
    dependencies: Vec<NodeIndex>,
    dependents: Vec<NodeIndex>,
}

impl DependencyNode {
    fn new(call: CallDescriptor) -> Self {
        Self {
            call,
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }

    pub fn call(&self) -> &CallDescriptor {
        &self.call
    }

    pub fn id(&self) -> &str {
        &self.call.id
    }

    pub fn dependencies(&self) -> &[NodeIndex] {
        &self.dependencies
    }

    pub fn dependents(&self) -> &[NodeIndex] {
        &self.dependents
    }

    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// A `depends_on` entry naming an id that is not part of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub call_id: String,
    pub missing: String,
}

impl fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.call_id, self.missing)
    }
}

/// Which graph shapes are rejected before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphPolicy {
    pub reject_cycles: bool,
    pub reject_dangling: bool,
}

impl Default for GraphPolicy {
    fn default() -> Self {
        Self {
            reject_cycles: true,
            reject_dangling: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("call at position {position} has an empty id")]
    EmptyId { position: usize },

    #[error("duplicate call id: {0}")]
    DuplicateId(String),

    #[error("dependency cycle: calls that can never run: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("unknown dependencies: {}", join_references(.0))]
    DanglingDependencies(Vec<DanglingReference>),
}

fn join_references(references: &[DanglingReference]) -> String {
    references
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    index: HashMap<String, NodeIndex>,
    dangling: Vec<DanglingReference>,
}

impl DependencyGraph {
    /// Build the graph for one batch. Ids must be non-empty and unique.
    pub fn build(calls: Vec<CallDescriptor>) -> Result<Self, GraphError> {
        let mut nodes = Vec::with_capacity(calls.len());
        let mut index = HashMap::with_capacity(calls.len());

        for (position, call) in calls.into_iter().enumerate() {
            if call.id.is_empty() {
                return Err(GraphError::EmptyId { position });
            }
            if index.insert(call.id.clone(), position).is_some() {
                return Err(GraphError::DuplicateId(call.id));
            }
            nodes.push(DependencyNode::new(call));
        }

        let mut edges = Vec::new();
        let mut dangling = Vec::new();
        for (node_index, node) in nodes.iter().enumerate() {
            for dependency_id in &node.call.depends_on {
                match index.get(dependency_id) {
                    Some(&dependency) => edges.push((node_index, dependency)),
                    None => dangling.push(DanglingReference {
                        call_id: node.call.id.clone(),
                        missing: dependency_id.clone(),
                    }),
                }
            }
        }

        for (node_index, dependency) in edges {
            // Repeated entries in depends_on collapse into one edge
            if nodes[node_index].dependencies.contains(&dependency) {
                continue;
            }
            nodes[node_index].dependencies.push(dependency);
            nodes[dependency].dependents.push(node_index);
        }

        Ok(Self {
            nodes,
            index,
            dangling,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: NodeIndex) -> &DependencyNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.iter()
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&DependencyNode> {
        self.index_of(id).map(|index| &self.nodes[index])
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_root())
            .map(|(index, _)| index)
    }

    pub fn dangling(&self) -> &[DanglingReference] {
        &self.dangling
    }

    /// Ids (in submission order) of nodes that can never become ready: members
    /// of a cycle and everything downstream of one.
    pub fn unreachable(&self) -> Vec<String> {
        let mut pending: Vec<usize> = self.nodes.iter().map(|node| node.dependencies.len()).collect();
        let mut ready: VecDeque<NodeIndex> = self.roots().collect();

        while let Some(index) = ready.pop_front() {
            for &dependent in &self.nodes[index].dependents {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        pending
            .iter()
            .enumerate()
            .filter(|(_, remaining)| **remaining > 0)
            .map(|(index, _)| self.nodes[index].call.id.clone())
            .collect()
    }

    pub fn validate(&self, policy: GraphPolicy) -> Result<(), GraphError> {
        if policy.reject_dangling && !self.dangling.is_empty() {
            return Err(GraphError::DanglingDependencies(self.dangling.clone()));
        }

        if policy.reject_cycles {
            let unreachable = self.unreachable();
            if !unreachable.is_empty() {
                return Err(GraphError::Cycle(unreachable));
            }
        }

        Ok(())
    }
}
