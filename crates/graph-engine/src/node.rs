//! Node contract and the shared services handed to node instances

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use device_bridge::DeviceAdapter;
use serde_json::Value;

use crate::arbitration::FrontendArbiter;
use crate::audit::StateAudit;
use crate::buffer::SharedBuffer;
use crate::error::NodeError;

/// Persisted node configuration, keyed by property name
pub type NodeProperties = serde_json::Map<String, Value>;

/// Values a node produced this tick, keyed by output slot name
pub type NodeOutputs = HashMap<String, Value>;

/// Inputs gathered for one node before its step runs.
///
/// Each named slot holds one entry per incoming connection, in connection
/// order. `None` marks a connection whose source produced nothing this tick,
/// so fan-in nodes can tell "no signal" apart from "signal carrying null".
#[derive(Debug, Default, Clone)]
pub struct NodeInputs {
    slots: HashMap<String, Vec<Option<Value>>>,
}

impl NodeInputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, slot: &str, value: Option<Value>) {
        self.slots.entry(slot.to_string()).or_default().push(value);
    }

    /// Every entry wired into `slot`
    #[must_use]
    pub fn all(&self, slot: &str) -> &[Option<Value>] {
        self.slots.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First present value on `slot`, if any connection delivered one
    #[must_use]
    pub fn first(&self, slot: &str) -> Option<&Value> {
        self.slots
            .get(slot)?
            .iter()
            .find_map(|entry| entry.as_ref())
    }

    /// First present value on `slot`, coerced to bool
    #[must_use]
    pub fn bool(&self, slot: &str) -> Option<bool> {
        self.first(slot).and_then(Value::as_bool)
    }

    /// First present value on `slot`, coerced to f64
    #[must_use]
    pub fn number(&self, slot: &str) -> Option<f64> {
        self.first(slot).and_then(Value::as_f64)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.values().all(|entries| {
            entries.iter().all(Option::is_none)
        })
    }
}

/// How a node relates to the shared buffer, used to order execution so that
/// writers run before readers even without a wire between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    /// Does not touch the buffer
    None,
    /// Publishes values into the buffer
    Writer,
    /// Consumes values from the buffer
    Reader,
}

/// Time source for nodes with clock-dependent behavior.
///
/// Production uses the system clock; tests pin a fixed instant and advance it
/// explicitly between ticks.
#[derive(Clone)]
pub enum Clock {
    System,
    Fixed(Arc<Mutex<DateTime<Local>>>),
}

impl Default for Clock {
    fn default() -> Self {
        Self::System
    }
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Local>) -> Self {
        Self::Fixed(Arc::new(Mutex::new(at)))
    }

    /// Move a fixed clock; no-op on the system clock
    pub fn set(&self, at: DateTime<Local>) {
        if let Self::Fixed(slot) = self {
            if let Ok(mut guard) = slot.lock() {
                *guard = at;
            }
        }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Local> {
        match self {
            Self::System => Local::now(),
            Self::Fixed(slot) => slot.lock().map(|guard| *guard).unwrap_or_else(|poisoned| {
                *poisoned.into_inner()
            }),
        }
    }
}

/// Shared infrastructure a node factory closes over: the buffer, the device
/// backend, frontend arbitration, the state audit, and the clock.
pub struct NodeServices {
    pub buffer: Arc<SharedBuffer>,
    pub devices: Arc<dyn DeviceAdapter>,
    pub arbiter: Arc<FrontendArbiter>,
    pub audit: Arc<StateAudit>,
    pub clock: Clock,
}

/// The contract every executable node implements.
///
/// `restore` and `serialize` bracket the node's persisted configuration;
/// `step` runs once per engine tick. A step returning `Err` is logged and
/// isolated by the executor, it never stops the tick or the engine.
#[async_trait]
pub trait Node: Send {
    /// Overlay persisted properties onto this instance's defaults
    fn restore(&mut self, saved: &NodeProperties);

    /// Run one tick with the inputs gathered from upstream nodes
    async fn step(&mut self, inputs: &NodeInputs) -> Result<NodeOutputs, NodeError>;

    /// Snapshot the configuration that `restore` would need to rebuild this node
    fn serialize(&self) -> NodeProperties;

    /// Buffer relationship, used for virtual ordering edges
    fn buffer_role(&self) -> BufferRole {
        BufferRole::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn inputs_distinguish_missing_from_null() {
        let mut inputs = NodeInputs::new();
        inputs.push("in", None);
        inputs.push("in", Some(Value::Null));
        inputs.push("in", Some(json!(7)));

        assert_eq!(inputs.all("in").len(), 3);
        // First *present* value is the null, not the 7
        assert_eq!(inputs.first("in"), Some(&Value::Null));
        assert_eq!(inputs.number("in"), None);
        assert!(!inputs.is_empty());
    }

    #[test]
    fn inputs_with_only_absent_entries_count_as_empty() {
        let mut inputs = NodeInputs::new();
        inputs.push("in", None);
        assert!(inputs.is_empty());
        assert_eq!(inputs.first("in"), None);
        assert!(NodeInputs::new().is_empty());
    }

    #[test]
    fn fixed_clock_advances_on_demand() {
        let start = Local.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let clock = Clock::fixed(start);
        assert_eq!(clock.now(), start);

        let later = Local.with_ymd_and_hms(2024, 6, 1, 21, 30, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
