//! Table-driven nodes
//!
//! Logic and definition nodes (constants, comparisons, gates) share one shape:
//! default properties, an optional internal state blob, and a pure execute
//! function. Describing them as static `NodeDefinition` records keeps each one
//! to a handful of lines and gives the registry a uniform factory.

use chrono::{DateTime, Local};
use serde_json::Value;

use crate::error::NodeError;
use crate::node::{Clock, Node, NodeInputs, NodeOutputs, NodeProperties};

/// Per-tick context passed to definition execute functions
pub struct ExecContext {
    /// Wall-clock time of this tick (fed from the engine clock so tests can pin it)
    pub now: DateTime<Local>,
}

/// Pure step function of a table-driven node.
///
/// Receives the gathered inputs, the node's mutable properties, the tick
/// context, and the internal state blob; returns the outputs for this tick.
pub type ExecuteFn =
    fn(&NodeInputs, &mut NodeProperties, &ExecContext, &mut Value) -> NodeOutputs;

/// Static description of one table-driven node type
pub struct NodeDefinition {
    /// Stable machine identifier, e.g. `"threshold"`
    pub type_id: &'static str,
    /// Human-facing label this type was historically saved under
    pub label: &'static str,
    /// Fresh default properties for a new instance
    pub defaults: fn() -> NodeProperties,
    /// Initial internal state, when the node keeps any between ticks
    pub internal_state: Option<fn() -> Value>,
    pub execute: ExecuteFn,
}

/// Runtime instance of a [`NodeDefinition`]
pub struct DefinitionNode {
    def: &'static NodeDefinition,
    properties: NodeProperties,
    internal: Value,
    clock: Clock,
}

impl DefinitionNode {
    #[must_use]
    pub fn new(def: &'static NodeDefinition, clock: Clock) -> Self {
        Self {
            def,
            properties: (def.defaults)(),
            internal: def.internal_state.map(|init| init()).unwrap_or(Value::Null),
            clock,
        }
    }

    #[must_use]
    pub fn type_id(&self) -> &'static str {
        self.def.type_id
    }
}

#[async_trait::async_trait]
impl Node for DefinitionNode {
    fn restore(&mut self, saved: &NodeProperties) {
        self.properties = (self.def.defaults)();
        for (key, value) in saved {
            self.properties.insert(key.clone(), value.clone());
        }
        self.internal = self
            .def
            .internal_state
            .map(|init| init())
            .unwrap_or(Value::Null);
    }

    async fn step(&mut self, inputs: &NodeInputs) -> Result<NodeOutputs, NodeError> {
        let ctx = ExecContext {
            now: self.clock.now(),
        };
        Ok((self.def.execute)(
            inputs,
            &mut self.properties,
            &ctx,
            &mut self.internal,
        ))
    }

    fn serialize(&self) -> NodeProperties {
        self.properties.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static ECHO: NodeDefinition = NodeDefinition {
        type_id: "echo",
        label: "Echo",
        defaults: || {
            let mut props = NodeProperties::new();
            props.insert("value".into(), json!("default"));
            props
        },
        internal_state: None,
        execute: |_, props, _, _| {
            let mut out = NodeOutputs::new();
            out.insert(
                "out".into(),
                props.get("value").cloned().unwrap_or(Value::Null),
            );
            out
        },
    };

    #[tokio::test]
    async fn restore_overlays_saved_properties_onto_defaults() {
        let mut node = DefinitionNode::new(&ECHO, Clock::system());

        let out = node.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("out"), Some(&json!("default")));

        let mut saved = NodeProperties::new();
        saved.insert("value".into(), json!("configured"));
        saved.insert("editor_x".into(), json!(440));
        node.restore(&saved);

        let out = node.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("out"), Some(&json!("configured")));
        // Unknown keys ride along untouched
        assert_eq!(node.serialize().get("editor_x"), Some(&json!(440)));
    }

    #[tokio::test]
    async fn restore_resets_internal_state() {
        static COUNTER: NodeDefinition = NodeDefinition {
            type_id: "tick_counter",
            label: "Tick Counter",
            defaults: NodeProperties::new,
            internal_state: Some(|| json!({ "count": 0 })),
            execute: |_, _, _, state| {
                let next = state["count"].as_i64().unwrap_or(0) + 1;
                state["count"] = json!(next);
                let mut out = NodeOutputs::new();
                out.insert("count".into(), json!(next));
                out
            },
        };

        let mut node = DefinitionNode::new(&COUNTER, Clock::system());
        node.step(&NodeInputs::new()).await.unwrap();
        let out = node.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("count"), Some(&json!(2)));

        node.restore(&NodeProperties::new());
        let out = node.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("count"), Some(&json!(1)));
    }
}
