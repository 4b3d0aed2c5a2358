use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 节点附带数据 (Node Payload)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_image_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub timestamp: u64,
    pub position: Position,
    pub payload: NodePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub timestamp: u64,
}

impl Edge {
    pub fn between(source: &str, target: &str, timestamp: u64) -> Self {
        Self {
            id: edge_id(source, target),
            source: source.to_string(),
            target: target.to_string(),
            timestamp,
        }
    }
}

pub fn edge_id(source: &str, target: &str) -> String {
    format!("edge-{}-{}", source, target)
}

pub fn manual_node_id(timestamp: u64, index: usize) -> String {
    format!("node-{}-{}", timestamp, index)
}
