//! Wireless send/receive nodes
//!
//! The "wireless" pair moves values through the shared buffer instead of a
//! wire. The sender publishes its input under a typed key derived from the
//! configured channel name; receivers watch one exact key and report both the
//! value and whether it changed since their last look.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::buffer::typed_key;
use crate::error::NodeError;
use crate::node::{BufferRole, Node, NodeInputs, NodeOutputs, NodeProperties, NodeServices};

/// Publishes its input value into the shared buffer
pub struct WirelessSendNode {
    services: Arc<NodeServices>,
    properties: NodeProperties,
    name: String,
    last_key: Option<String>,
}

impl WirelessSendNode {
    #[must_use]
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self {
            services,
            properties: NodeProperties::new(),
            name: String::new(),
            last_key: None,
        }
    }
}

#[async_trait]
impl Node for WirelessSendNode {
    fn restore(&mut self, saved: &NodeProperties) {
        self.properties = saved.clone();
        self.name = saved
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.last_key = None;
    }

    async fn step(&mut self, inputs: &NodeInputs) -> Result<NodeOutputs, NodeError> {
        let outputs = NodeOutputs::new();
        if self.name.is_empty() {
            return Ok(outputs);
        }
        let Some(value) = inputs.first("in").cloned() else {
            return Ok(outputs);
        };

        let key = typed_key(&value, &self.name);
        // A type change moves the channel to a new key; drop the old one so
        // receivers do not keep reading a stale value
        if let Some(previous) = self.last_key.take() {
            if previous != key {
                self.services.buffer.remove(&previous);
            }
        }
        self.services.buffer.set(&key, value);
        self.last_key = Some(key);
        Ok(outputs)
    }

    fn serialize(&self) -> NodeProperties {
        let mut props = self.properties.clone();
        props.insert("name".into(), Value::String(self.name.clone()));
        props
    }

    fn buffer_role(&self) -> BufferRole {
        BufferRole::Writer
    }
}

/// Reads one buffer key and reports value plus change flag
pub struct WirelessReceiveNode {
    services: Arc<NodeServices>,
    properties: NodeProperties,
    /// Full key to watch, tag included, e.g. `"[Trigger]Lamp"`
    name: String,
    last: Option<Value>,
}

impl WirelessReceiveNode {
    #[must_use]
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self {
            services,
            properties: NodeProperties::new(),
            name: String::new(),
            last: None,
        }
    }
}

#[async_trait]
impl Node for WirelessReceiveNode {
    fn restore(&mut self, saved: &NodeProperties) {
        self.properties = saved.clone();
        self.name = saved
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.last = None;
    }

    async fn step(&mut self, _inputs: &NodeInputs) -> Result<NodeOutputs, NodeError> {
        let mut outputs = NodeOutputs::new();
        if self.name.is_empty() {
            return Ok(outputs);
        }
        let Some(value) = self.services.buffer.get(&self.name) else {
            // Absent key means no signal at all; a later reappearance counts
            // as a change again
            self.last = None;
            return Ok(outputs);
        };

        let changed = self.last.as_ref() != Some(&value);
        outputs.insert("out".into(), value.clone());
        outputs.insert("change".into(), Value::Bool(changed));
        self.last = Some(value);
        Ok(outputs)
    }

    fn serialize(&self) -> NodeProperties {
        let mut props = self.properties.clone();
        props.insert("name".into(), Value::String(self.name.clone()));
        props
    }

    fn buffer_role(&self) -> BufferRole {
        BufferRole::Reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;
    use serde_json::json;

    fn named(name: &str) -> NodeProperties {
        let mut props = NodeProperties::new();
        props.insert("name".into(), json!(name));
        props
    }

    fn input(value: Value) -> NodeInputs {
        let mut inputs = NodeInputs::new();
        inputs.push("in", Some(value));
        inputs
    }

    #[tokio::test]
    async fn sender_publishes_under_typed_key() {
        let (services, _) = test_util::services();
        let mut sender = WirelessSendNode::new(services.clone());
        sender.restore(&named("Lamp"));

        sender.step(&input(json!(true))).await.unwrap();
        assert_eq!(services.buffer.get("[Trigger]Lamp"), Some(json!(true)));
    }

    #[tokio::test]
    async fn type_change_retires_the_old_key() {
        let (services, _) = test_util::services();
        let mut sender = WirelessSendNode::new(services.clone());
        sender.restore(&named("Temp"));

        sender.step(&input(json!(true))).await.unwrap();
        sender.step(&input(json!(21.5))).await.unwrap();

        assert!(!services.buffer.has("[Trigger]Temp"));
        assert_eq!(services.buffer.get("[Number]Temp"), Some(json!(21.5)));
    }

    #[tokio::test]
    async fn sender_without_input_or_name_stays_quiet() {
        let (services, _) = test_util::services();
        let mut sender = WirelessSendNode::new(services.clone());
        sender.restore(&named("Lamp"));
        sender.step(&NodeInputs::new()).await.unwrap();

        let mut unnamed = WirelessSendNode::new(services.clone());
        unnamed.restore(&NodeProperties::new());
        unnamed.step(&input(json!(1))).await.unwrap();

        assert!(services.buffer.is_empty());
    }

    #[tokio::test]
    async fn receiver_reports_value_and_change_flag() {
        let (services, _) = test_util::services();
        services.buffer.set("[Trigger]Lamp", json!(true));

        let mut receiver = WirelessReceiveNode::new(services.clone());
        receiver.restore(&named("[Trigger]Lamp"));

        let out = receiver.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("out"), Some(&json!(true)));
        assert_eq!(out.get("change"), Some(&json!(true)));

        // Same value again: still delivered, no longer a change
        let out = receiver.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("out"), Some(&json!(true)));
        assert_eq!(out.get("change"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn receiver_emits_nothing_for_absent_key() {
        let (services, _) = test_util::services();
        let mut receiver = WirelessReceiveNode::new(services.clone());
        receiver.restore(&named("[Trigger]Lamp"));

        let out = receiver.step(&NodeInputs::new()).await.unwrap();
        assert!(out.is_empty());

        // Key appears, disappears, reappears: each arrival is a fresh change
        services.buffer.set("[Trigger]Lamp", json!(true));
        assert_eq!(
            receiver.step(&NodeInputs::new()).await.unwrap().get("change"),
            Some(&json!(true))
        );
        services.buffer.remove("[Trigger]Lamp");
        assert!(receiver.step(&NodeInputs::new()).await.unwrap().is_empty());
        services.buffer.set("[Trigger]Lamp", json!(true));
        assert_eq!(
            receiver.step(&NodeInputs::new()).await.unwrap().get("change"),
            Some(&json!(true))
        );
    }

    #[test]
    fn serialize_round_trips_editor_properties() {
        let (services, _) = test_util::services();
        let mut sender = WirelessSendNode::new(services);
        let mut saved = named("Lamp");
        saved.insert("x".into(), json!(120));
        sender.restore(&saved);

        let out = sender.serialize();
        assert_eq!(out.get("name"), Some(&json!("Lamp")));
        assert_eq!(out.get("x"), Some(&json!(120)));
    }
}
