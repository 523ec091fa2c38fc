//! Error types for the graph engine

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the engine's own lifecycle operations.
///
/// Node-level and device-level failures never appear here; they are caught
/// and logged inside the tick loop so that nothing below the engine can stop
/// it.
#[derive(Error, Debug)]
pub enum EngineError {
    /// `start()` was called before any node was loaded
    #[error("Cannot start: no nodes loaded")]
    EmptyGraph,

    /// The graph file could not be read
    #[error("Failed to read graph file {path}: {source}")]
    GraphRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The graph file is not a valid graph document
    #[error("Malformed graph document: {0}")]
    GraphParse(#[from] serde_json::Error),
}

/// Errors a node may return from its execution step.
///
/// These are isolated per node per tick: the executor logs them and keeps
/// going.
#[derive(Error, Debug)]
pub enum NodeError {
    /// A device call at the collaborator boundary failed
    #[error("Device call failed: {0}")]
    Device(#[from] device_bridge::DeviceError),

    /// The node's saved configuration is unusable
    #[error("Invalid node configuration: {0}")]
    InvalidConfig(String),

    /// Anything else that went wrong inside the step
    #[error("{0}")]
    Failed(String),
}
