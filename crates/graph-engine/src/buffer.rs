//! Shared buffer for indirect ("wireless") node-to-node data flow
//!
//! A process-wide named key/value store that lets nodes exchange values by
//! convention instead of explicit wiring. The stored value doubles as the
//! "last value" for change suppression: writing a deep-equal value again is
//! a no-op and emits no notification, which keeps feedback loops between
//! dependent readers from amplifying.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;

/// Notifications emitted when buffer contents actually change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEvent {
    /// A key was created or its value changed
    Updated { key: String },
    /// A key was removed
    Removed { key: String },
    /// The whole buffer was wiped (graph reload)
    Cleared,
}

/// The named key/value store shared by all nodes of one engine instance.
///
/// Owned by the executor and handed to node instances at construction; tests
/// substitute an isolated instance per run.
pub struct SharedBuffer {
    entries: DashMap<String, Value>,
    event_tx: broadcast::Sender<BufferEvent>,
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            entries: DashMap::new(),
            event_tx,
        }
    }

    /// Subscribe to change notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.event_tx.subscribe()
    }

    /// Current value under `key`, if any
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    /// Store `value` under `key`.
    ///
    /// Returns `false` (and emits nothing) when the stored value is already
    /// deep-equal to `value`.
    pub fn set(&self, key: &str, value: Value) -> bool {
        let unchanged = self
            .entries
            .get(key)
            .map(|existing| *existing == value)
            .unwrap_or(false);
        if unchanged {
            return false;
        }
        self.entries.insert(key.to_string(), value);
        let _ = self.event_tx.send(BufferEvent::Updated {
            key: key.to_string(),
        });
        true
    }

    /// Remove a key; returns whether it existed
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            let _ = self.event_tx.send(BufferEvent::Removed {
                key: key.to_string(),
            });
        }
        removed
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All current key names
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wipe every key.
    ///
    /// The executor calls this exactly once per successful graph load, before
    /// any node is restored, so stale values never leak across reloads.
    pub fn clear(&self) {
        self.entries.clear();
        let _ = self.event_tx.send(BufferEvent::Cleared);
    }

    /// Snapshot of all entries (diagnostic surface)
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Map<String, Value> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

/// Tag describing the inferred type of a buffered value.
///
/// Booleans tag as `Trigger`: boolean channels act as triggers for the
/// receiving side, and existing graphs rely on that name.
#[must_use]
pub fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "Trigger",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
        Value::Null => "Unknown",
    }
}

/// Effective buffer key for a value on a user-chosen base name, e.g. a
/// boolean sent on `Lamp` lands under `"[Trigger]Lamp"`.
#[must_use]
pub fn typed_key(value: &Value, base: &str) -> String {
    format!("[{}]{}", type_tag(value), base)
}
