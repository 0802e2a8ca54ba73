// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Node liveness tracking.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Identifier of a cluster node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Source of truth for which nodes are alive.
pub trait NodeLiveness: Send + Sync {
    fn is_node_alive(&self, node: NodeId) -> bool;

    /// Reports that `reporter` could not reach `node`.
    fn report_node_failure(&self, node: NodeId, reporter: &str);
}

/// A record of one failure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub node: NodeId,
    pub reporter: String,
}

/// In-process node registry. A reported node is considered dead.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: Mutex<HashMap<NodeId, bool>>,
    reports: Mutex<Vec<FailureReport>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `node` alive.
    pub fn register(&self, node: NodeId) {
        self.nodes.lock().insert(node, true);
    }

    /// Marks `node` dead without recording a failure report.
    pub fn mark_dead(&self, node: NodeId) {
        self.nodes.lock().insert(node, false);
    }

    pub fn failure_reports(&self) -> Vec<FailureReport> {
        self.reports.lock().clone()
    }
}

impl NodeLiveness for NodeRegistry {
    fn is_node_alive(&self, node: NodeId) -> bool {
        self.nodes.lock().get(&node).copied().unwrap_or(false)
    }

    fn report_node_failure(&self, node: NodeId, reporter: &str) {
        warn!(%node, reporter, "node reported as failed");
        self.nodes.lock().insert(node, false);
        self.reports.lock().push(FailureReport {
            node,
            reporter: reporter.to_string(),
        });
    }
}
