//! Device-facing nodes
//!
//! These nodes bridge graph values to the device backend. Command nodes
//! accumulate an intended state from their inputs and only talk to the
//! backend when that intent actually changes, with frontend arbitration able
//! to hold commands back entirely. Every command is recorded with the state
//! audit before it goes out.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use device_bridge::DeviceState;
use serde_json::{json, Value};

use crate::error::NodeError;
use crate::node::{Node, NodeInputs, NodeOutputs, NodeProperties, NodeServices};

fn entity_from(saved: &NodeProperties) -> String {
    saved
        .get("entity_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Drives a light's power, brightness, and color
pub struct LightNode {
    services: Arc<NodeServices>,
    properties: NodeProperties,
    entity_id: String,
    current: DeviceState,
    last_sent: Option<DeviceState>,
}

impl LightNode {
    #[must_use]
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self {
            services,
            properties: NodeProperties::new(),
            entity_id: String::new(),
            current: DeviceState::default(),
            last_sent: None,
        }
    }

    fn patch_from(&self, inputs: &NodeInputs) -> DeviceState {
        let mut patch = DeviceState::default();
        if let Some(on) = inputs.bool("on") {
            patch.on = Some(on);
        }
        if let Some(level) = inputs.number("brightness") {
            patch.brightness = Some(level.clamp(0.0, 100.0));
        }
        if let Some(hue) = inputs.number("hue") {
            let saturation = inputs
                .number("saturation")
                .or(self.current.hue_saturation.map(|(_, s)| s))
                .unwrap_or(100.0);
            patch.hue_saturation = Some((hue.rem_euclid(360.0), saturation.clamp(0.0, 100.0)));
        }
        patch
    }
}

#[async_trait]
impl Node for LightNode {
    fn restore(&mut self, saved: &NodeProperties) {
        self.properties = saved.clone();
        self.entity_id = entity_from(saved);
        self.current = DeviceState::default();
        self.last_sent = None;
    }

    async fn step(&mut self, inputs: &NodeInputs) -> Result<NodeOutputs, NodeError> {
        let patch = self.patch_from(inputs);
        self.current.apply(&patch);

        if !self.entity_id.is_empty() {
            let dirty =
                !self.current.is_empty() && self.last_sent.as_ref() != Some(&self.current);
            if dirty {
                if self.services.arbiter.is_active() {
                    // Intent keeps accumulating; the unsent state stays dirty
                    // so control resumes with one command once the hold lifts
                    tracing::trace!(
                        entity_id = %self.entity_id,
                        "frontend active, holding device command"
                    );
                } else {
                    self.services
                        .audit
                        .record_command(&self.entity_id, &self.current);
                    if let Err(err) = self
                        .services
                        .devices
                        .set_state(&self.entity_id, &self.current)
                        .await
                    {
                        tracing::warn!(
                            entity_id = %self.entity_id,
                            error = %err,
                            "light command failed"
                        );
                    }
                    self.last_sent = Some(self.current.clone());
                }
            }
        }

        let mut outputs = NodeOutputs::new();
        outputs.insert("state".into(), json!(self.current.on.unwrap_or(false)));
        if let Some(level) = self.current.brightness {
            outputs.insert("brightness".into(), json!(level));
        }
        Ok(outputs)
    }

    fn serialize(&self) -> NodeProperties {
        let mut props = self.properties.clone();
        props.insert("entity_id".into(), Value::String(self.entity_id.clone()));
        props
    }
}

/// Switches a plain on/off plug
pub struct SmartPlugNode {
    services: Arc<NodeServices>,
    properties: NodeProperties,
    entity_id: String,
    current: Option<bool>,
    last_sent: Option<bool>,
}

impl SmartPlugNode {
    #[must_use]
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self {
            services,
            properties: NodeProperties::new(),
            entity_id: String::new(),
            current: None,
            last_sent: None,
        }
    }
}

#[async_trait]
impl Node for SmartPlugNode {
    fn restore(&mut self, saved: &NodeProperties) {
        self.properties = saved.clone();
        self.entity_id = entity_from(saved);
        self.current = None;
        self.last_sent = None;
    }

    async fn step(&mut self, inputs: &NodeInputs) -> Result<NodeOutputs, NodeError> {
        if let Some(on) = inputs.bool("on") {
            self.current = Some(on);
        }

        if !self.entity_id.is_empty() {
            if let Some(on) = self.current {
                if self.last_sent != Some(on) {
                    if self.services.arbiter.is_active() {
                        tracing::trace!(
                            entity_id = %self.entity_id,
                            "frontend active, holding plug command"
                        );
                    } else {
                        let command = DeviceState::power(on);
                        self.services.audit.record_command(&self.entity_id, &command);
                        if let Err(err) = self
                            .services
                            .devices
                            .set_state(&self.entity_id, &command)
                            .await
                        {
                            tracing::warn!(
                                entity_id = %self.entity_id,
                                error = %err,
                                "plug command failed"
                            );
                        }
                        self.last_sent = Some(on);
                    }
                }
            }
        }

        let mut outputs = NodeOutputs::new();
        outputs.insert("state".into(), json!(self.current.unwrap_or(false)));
        Ok(outputs)
    }

    fn serialize(&self) -> NodeProperties {
        let mut props = self.properties.clone();
        props.insert("entity_id".into(), Value::String(self.entity_id.clone()));
        props
    }
}

/// Polls a device's reported state into the graph
pub struct DeviceStateNode {
    services: Arc<NodeServices>,
    properties: NodeProperties,
    entity_id: String,
    /// Seconds between backend polls
    poll_interval: f64,
    cache: Option<DeviceState>,
    last_poll: Option<Instant>,
}

impl DeviceStateNode {
    #[must_use]
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self {
            services,
            properties: NodeProperties::new(),
            entity_id: String::new(),
            poll_interval: 5.0,
            cache: None,
            last_poll: None,
        }
    }
}

#[async_trait]
impl Node for DeviceStateNode {
    fn restore(&mut self, saved: &NodeProperties) {
        self.properties = saved.clone();
        self.entity_id = entity_from(saved);
        self.poll_interval = saved
            .get("poll_interval")
            .and_then(Value::as_f64)
            .unwrap_or(5.0);
        self.cache = None;
        self.last_poll = None;
    }

    async fn step(&mut self, _inputs: &NodeInputs) -> Result<NodeOutputs, NodeError> {
        let mut outputs = NodeOutputs::new();
        if self.entity_id.is_empty() {
            return Ok(outputs);
        }

        let due = self
            .last_poll
            .map_or(true, |at| at.elapsed().as_secs_f64() >= self.poll_interval);
        if due {
            self.last_poll = Some(Instant::now());
            match self.services.devices.get_state(&self.entity_id).await {
                Ok(state) => self.cache = Some(state),
                Err(err) => {
                    // Keep serving the stale cache rather than flapping outputs
                    tracing::debug!(
                        entity_id = %self.entity_id,
                        error = %err,
                        "device state poll failed"
                    );
                }
            }
        }

        if let Some(state) = &self.cache {
            outputs.insert("on".into(), json!(state.on.unwrap_or(false)));
            if let Some(level) = state.brightness {
                outputs.insert("brightness".into(), json!(level));
            }
        }
        Ok(outputs)
    }

    fn serialize(&self) -> NodeProperties {
        let mut props = self.properties.clone();
        props.insert("entity_id".into(), Value::String(self.entity_id.clone()));
        props.insert("poll_interval".into(), json!(self.poll_interval));
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitration::FrontendArbiter;
    use crate::node::Clock;
    use crate::test_util;
    use std::time::Duration;

    fn for_entity(entity_id: &str) -> NodeProperties {
        let mut props = NodeProperties::new();
        props.insert("entity_id".into(), json!(entity_id));
        props
    }

    fn on_input(on: bool) -> NodeInputs {
        let mut inputs = NodeInputs::new();
        inputs.push("on", Some(json!(on)));
        inputs
    }

    #[tokio::test]
    async fn light_commands_only_on_intent_change() {
        let (services, adapter) = test_util::services();
        adapter.seed("light.desk", DeviceState::default());

        let mut light = LightNode::new(services.clone());
        light.restore(&for_entity("light.desk"));

        let out = light.step(&on_input(true)).await.unwrap();
        assert_eq!(out.get("state"), Some(&json!(true)));
        assert_eq!(adapter.peek("light.desk").unwrap().on, Some(true));
        assert_eq!(
            services.audit.intended_for("light.desk").unwrap().state.on,
            Some(true)
        );

        // Flip the device behind the engine's back; an unchanged intent must
        // not re-command it
        adapter.seed("light.desk", DeviceState::power(false));
        light.step(&on_input(true)).await.unwrap();
        assert_eq!(adapter.peek("light.desk").unwrap().on, Some(false));
    }

    #[tokio::test]
    async fn light_merges_brightness_and_color_inputs() {
        let (services, adapter) = test_util::services();
        adapter.seed("light.strip", DeviceState::default());

        let mut light = LightNode::new(services);
        light.restore(&for_entity("light.strip"));

        let mut inputs = on_input(true);
        inputs.push("brightness", Some(json!(140.0)));
        inputs.push("hue", Some(json!(370.0)));
        let out = light.step(&inputs).await.unwrap();

        let sent = adapter.peek("light.strip").unwrap();
        assert_eq!(sent.on, Some(true));
        // Out-of-range values are normalized before they reach the device
        assert_eq!(sent.brightness, Some(100.0));
        assert_eq!(sent.hue_saturation, Some((10.0, 100.0)));
        assert_eq!(out.get("brightness"), Some(&json!(100.0)));
    }

    #[tokio::test]
    async fn light_holds_commands_while_frontend_is_active() {
        let arbiter = Arc::new(FrontendArbiter::with_timeout(Duration::from_millis(50)));
        let (services, adapter) = test_util::services_with(arbiter.clone(), Clock::system());
        adapter.seed("light.desk", DeviceState::default());

        let mut light = LightNode::new(services);
        light.restore(&for_entity("light.desk"));

        arbiter.set_active(true);
        light.step(&on_input(true)).await.unwrap();
        assert_eq!(adapter.peek("light.desk").unwrap().on, None);

        // Heartbeats stop; after the timeout the held intent goes out even
        // though the input no longer changes
        tokio::time::sleep(Duration::from_millis(120)).await;
        light.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(adapter.peek("light.desk").unwrap().on, Some(true));
    }

    #[tokio::test]
    async fn plug_switches_and_suppresses_repeats() {
        let (services, adapter) = test_util::services();
        adapter.seed("plug.heater", DeviceState::default());

        let mut plug = SmartPlugNode::new(services.clone());
        plug.restore(&for_entity("plug.heater"));

        plug.step(&on_input(true)).await.unwrap();
        assert_eq!(adapter.peek("plug.heater").unwrap().on, Some(true));

        adapter.seed("plug.heater", DeviceState::power(false));
        plug.step(&on_input(true)).await.unwrap();
        assert_eq!(adapter.peek("plug.heater").unwrap().on, Some(false));

        let out = plug.step(&on_input(false)).await.unwrap();
        assert_eq!(adapter.peek("plug.heater").unwrap().on, Some(false));
        assert_eq!(out.get("state"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn device_state_serves_cached_reads_between_polls() {
        let (services, adapter) = test_util::services();
        adapter.seed(
            "light.hall",
            DeviceState {
                on: Some(true),
                brightness: Some(60.0),
                hue_saturation: None,
            },
        );

        let mut probe = DeviceStateNode::new(services);
        let mut props = for_entity("light.hall");
        props.insert("poll_interval".into(), json!(30.0));
        probe.restore(&props);

        let out = probe.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("on"), Some(&json!(true)));
        assert_eq!(out.get("brightness"), Some(&json!(60.0)));

        // Backend changes, but the next step is inside the poll window
        adapter.seed("light.hall", DeviceState::power(false));
        let out = probe.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("on"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn device_state_repolls_when_interval_is_zero() {
        let (services, adapter) = test_util::services();
        adapter.seed("light.hall", DeviceState::power(true));

        let mut probe = DeviceStateNode::new(services);
        let mut props = for_entity("light.hall");
        props.insert("poll_interval".into(), json!(0.0));
        probe.restore(&props);

        probe.step(&NodeInputs::new()).await.unwrap();
        adapter.seed("light.hall", DeviceState::power(false));
        let out = probe.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("on"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn device_state_stays_silent_for_unknown_entity() {
        let (services, _) = test_util::services();
        let mut probe = DeviceStateNode::new(services);
        probe.restore(&for_entity("light.ghost"));

        let out = probe.step(&NodeInputs::new()).await.unwrap();
        assert!(out.is_empty());
    }
}
