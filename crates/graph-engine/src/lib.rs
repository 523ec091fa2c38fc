//! Graph-driven automation engine
//!
//! Executes a node graph authored in a visual editor: nodes are restored from
//! a JSON document, stepped on a fixed interval in dependency order, and
//! wired to real devices through the `device-bridge` adapters. The engine is
//! headless; the HTTP/WebSocket surface lives in `hearth-api`.

pub mod arbitration;
pub mod audit;
pub mod buffer;
pub mod definition;
pub mod engine;
pub mod error;
pub mod model;
pub mod node;
pub mod nodes;
pub mod order;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_util;

pub use arbitration::FrontendArbiter;
pub use audit::{AuditConfig, AuditReport, IntendedState, Mismatch, StateAudit};
pub use buffer::{type_tag, typed_key, BufferEvent, SharedBuffer};
pub use definition::{ExecContext, ExecuteFn, NodeDefinition};
pub use engine::{EngineConfig, EngineEvent, EngineStatus, GraphEngine, LoadSummary};
pub use error::{EngineError, NodeError};
pub use model::{ConnectionRecord, GraphDocument, NodeRecord};
pub use node::{BufferRole, Clock, Node, NodeInputs, NodeOutputs, NodeProperties, NodeServices};
pub use nodes::register_builtins;
pub use registry::{NodeFactory, NodeRegistry, NodeTypeInfo};
