use std::sync::Arc;
use serde::Serialize;
use tracing::{debug, info};
use crate::chain::node::{Node, Edge, NodePayload, Position, manual_node_id};
use crate::runtime::clock::Clock;

/// Vertical distance every existing node moves up when a new node arrives.
pub const DEFAULT_SHIFT: f64 = 100.0;

/// Result of a successful append.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Appended {
    pub node: Node,
    pub edge: Option<Edge>,
}

/// 链状态 (Chain State)
/// Append-only, single-path store of the nodes and edges built so far.
/// Every edge joins the previously last node to the newly inserted one.
#[derive(Debug)]
pub struct GraphState {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    last_mutation_ms: u64,
    shift: f64,
    clock: Arc<dyn Clock>,
}

impl GraphState {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_shift(clock, DEFAULT_SHIFT)
    }

    pub fn with_shift(clock: Arc<dyn Clock>, shift: f64) -> Self {
        let last_mutation_ms = clock.now_ms();
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            last_mutation_ms,
            shift,
            clock,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn last(&self) -> Option<&Node> {
        self.nodes.last()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn last_mutation_ms(&self) -> u64 {
        self.last_mutation_ms
    }

    /// Appends the node confirmed for `step_id`. The step id becomes the node id,
    /// so a repeated confirmation is a no-op and returns `None`.
    pub fn append_from_step(
        &mut self,
        step_id: &str,
        label: &str,
        payload: NodePayload,
        position: Position,
    ) -> Option<Appended> {
        let now = self.clock.now_ms();
        self.append(step_id.to_string(), label, payload, position, now)
    }

    /// Operator-triggered node outside the polling flow.
    pub fn append_manual(&mut self, label: &str, payload: NodePayload, position: Position) -> Option<Appended> {
        let now = self.clock.now_ms();
        let id = manual_node_id(now, self.nodes.len());
        self.append(id, label, payload, position, now)
    }

    fn append(
        &mut self,
        id: String,
        label: &str,
        payload: NodePayload,
        position: Position,
        timestamp: u64,
    ) -> Option<Appended> {
        if self.contains(&id) {
            debug!(node_id = %id, "Duplicate node id, append skipped");
            return None;
        }

        let edge = self.nodes.last().map(|prev| Edge::between(&prev.id, &id, timestamp));

        // Keep the active region anchored: everything already placed moves up.
        for node in &mut self.nodes {
            node.position.y -= self.shift;
        }

        let node = Node {
            id,
            label: label.to_string(),
            timestamp,
            position,
            payload,
        };

        self.nodes.push(node.clone());
        if let Some(e) = &edge {
            self.edges.push(e.clone());
        }
        self.last_mutation_ms = timestamp;

        info!(node_id = %node.id, label = %node.label, x = node.position.x, y = node.position.y, "Node appended");
        Some(Appended { node, edge })
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.last_mutation_ms = self.clock.now_ms();
    }
}
