//! In-memory device adapter
//!
//! Keeps every entity's state in a process-local map. Used as the test
//! double for the engine and audit, and as the fallback back-end when no hub
//! is configured so a headless deployment still starts.

use crate::adapter::{DeviceAdapter, DeviceState};
use crate::error::DeviceError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

/// Adapter backed by an in-process map
#[derive(Default)]
pub struct MemoryAdapter {
    states: DashMap<String, DeviceState>,
}

impl MemoryAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entity with a known state (tests, demos)
    pub fn seed(&self, entity_id: impl Into<String>, state: DeviceState) {
        self.states.insert(entity_id.into(), state);
    }

    /// Snapshot of a single entity without going through the trait
    #[must_use]
    pub fn peek(&self, entity_id: &str) -> Option<DeviceState> {
        self.states.get(entity_id).map(|r| r.value().clone())
    }

    /// Number of known entities
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl DeviceAdapter for MemoryAdapter {
    async fn get_state(&self, entity_id: &str) -> Result<DeviceState, DeviceError> {
        self.states
            .get(entity_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| DeviceError::UnknownEntity(entity_id.to_string()))
    }

    async fn set_state(&self, entity_id: &str, patch: &DeviceState) -> Result<(), DeviceError> {
        let mut entry = self.states.entry(entity_id.to_string()).or_default();
        entry.apply(patch);
        tracing::debug!("Memory adapter applied patch to {}: {:?}", entity_id, patch);
        Ok(())
    }

    async fn get_states(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, DeviceState>, DeviceError> {
        Ok(entity_ids
            .iter()
            .filter_map(|id| self.states.get(id).map(|r| (id.clone(), r.value().clone())))
            .collect())
    }
}
