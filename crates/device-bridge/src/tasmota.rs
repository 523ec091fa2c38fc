//! Tasmota smart-plug client
//!
//! Drives Tasmota-flashed plugs over their plain HTTP command interface
//! (`/cm?cmnd=Power`). Plugs have no hub, so the client owns a static
//! entity-id → host table, typically parsed from the environment at boot.

use crate::adapter::{DeviceAdapter, DeviceState};
use crate::error::DeviceError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

/// Client for one or more Tasmota plugs
pub struct TasmotaClient {
    /// entity id -> host (e.g. "plug.desk" -> "192.168.1.40")
    hosts: DashMap<String, String>,
    http: reqwest::Client,
}

impl TasmotaClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hosts: DashMap::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Parse a route table of the form `entity=host,entity=host`
    #[must_use]
    pub fn from_route_spec(spec: &str) -> Self {
        let client = Self::new();
        for pair in spec.split(',').filter(|p| !p.trim().is_empty()) {
            match pair.split_once('=') {
                Some((entity, host)) => {
                    client.add_plug(entity.trim(), host.trim());
                }
                None => tracing::warn!("Ignoring malformed plug route: {}", pair),
            }
        }
        client
    }

    /// Register a plug under an entity id
    pub fn add_plug(&self, entity_id: impl Into<String>, host: impl Into<String>) {
        let entity_id = entity_id.into();
        let host = host.into();
        tracing::info!("Registered Tasmota plug {} at {}", entity_id, host);
        self.hosts.insert(entity_id, host);
    }

    /// Number of registered plugs
    #[must_use]
    pub fn plug_count(&self) -> usize {
        self.hosts.len()
    }

    fn host_for(&self, entity_id: &str) -> Result<String, DeviceError> {
        self.hosts
            .get(entity_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| DeviceError::UnknownEntity(entity_id.to_string()))
    }

    async fn command(&self, host: &str, cmnd: &str) -> Result<serde_json::Value, DeviceError> {
        let url = format!("http://{host}/cm");
        let response = self
            .http
            .get(&url)
            .query(&[("cmnd", cmnd)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeviceError::Backend {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    fn parse_power(payload: &serde_json::Value) -> Result<bool, DeviceError> {
        match payload.get("POWER").and_then(|v| v.as_str()) {
            Some("ON") => Ok(true),
            Some("OFF") => Ok(false),
            _ => Err(DeviceError::Payload(payload.to_string())),
        }
    }
}

impl Default for TasmotaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceAdapter for TasmotaClient {
    async fn get_state(&self, entity_id: &str) -> Result<DeviceState, DeviceError> {
        let host = self.host_for(entity_id)?;
        let payload = self.command(&host, "Power").await?;
        Ok(DeviceState::power(Self::parse_power(&payload)?))
    }

    async fn set_state(&self, entity_id: &str, patch: &DeviceState) -> Result<(), DeviceError> {
        let host = self.host_for(entity_id)?;
        // Plugs only understand power; brightness/color fields are ignored.
        let Some(on) = patch.on else {
            return Ok(());
        };
        let cmnd = if on { "Power On" } else { "Power Off" };
        let payload = self.command(&host, cmnd).await?;
        Self::parse_power(&payload)?;
        Ok(())
    }

    async fn get_states(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, DeviceState>, DeviceError> {
        let mut states = HashMap::new();
        for entity_id in entity_ids {
            match self.get_state(entity_id).await {
                Ok(state) => {
                    states.insert(entity_id.clone(), state);
                }
                Err(DeviceError::UnknownEntity(_)) => {}
                Err(e) => {
                    // One unreachable plug must not sink the whole sweep
                    tracing::warn!("Failed to read plug {}: {}", entity_id, e);
                }
            }
        }
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_spec_parses_pairs_and_skips_garbage() {
        let client =
            TasmotaClient::from_route_spec("plug.desk=192.168.1.40, plug.tv=192.168.1.41,,junk");
        assert_eq!(client.plug_count(), 2);
        assert_eq!(client.host_for("plug.desk").unwrap(), "192.168.1.40");
        assert!(client.host_for("plug.ghost").is_err());
    }

    #[test]
    fn power_payload_parses_both_states() {
        assert!(TasmotaClient::parse_power(&serde_json::json!({"POWER": "ON"})).unwrap());
        assert!(!TasmotaClient::parse_power(&serde_json::json!({"POWER": "OFF"})).unwrap());
        assert!(TasmotaClient::parse_power(&serde_json::json!({"Status": 1})).is_err());
    }
}
