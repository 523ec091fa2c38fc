//! Graph document shapes as written by the editor

use crate::node::NodeProperties;
use serde::{Deserialize, Serialize};

/// A complete serialized node graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    /// All nodes in the graph
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    /// All directed data edges between node outputs and inputs
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

impl GraphDocument {
    /// True if the document carries no nodes at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// One saved node: which implementation to instantiate, and the durable
/// configuration to restore into it.
///
/// Older graphs may identify the implementation by display label only, or
/// store the type under `name`; resolution tries the type id first and the
/// label second. Unknown extra fields in a record are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Unique id within the graph
    pub id: String,
    /// Stable type identifier (legacy documents may use `name`)
    #[serde(rename = "type", alias = "name", default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
    /// Human-readable display label (legacy fallback identifier)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Saved durable properties, merged into defaults by `restore`
    #[serde(alias = "properties", default)]
    pub data: NodeProperties,
}

/// A directed data edge from one node's output to another node's input.
///
/// Several connections may target the same `(target, target_input)` pair;
/// the input then carries an ordered list of values. Records whose `source`
/// or `target` is missing from the document are tolerated and skipped at
/// tick time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub source: String,
    pub source_output: String,
    pub target: String,
    pub target_input: String,
}
