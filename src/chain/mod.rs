pub mod node;
pub mod graph;

pub use node::{Node, Edge, NodePayload, Position};
pub use graph::{GraphState, Appended, DEFAULT_SHIFT};
