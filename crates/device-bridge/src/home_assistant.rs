//! Home Assistant REST client
//!
//! Talks to a Home Assistant instance over its long-lived-token REST API.
//! Reads map `/api/states/<entity_id>` onto [`DeviceState`]; writes go
//! through `/api/services/<domain>/turn_on|turn_off`. The batched read used
//! by the state audit fetches `/api/states` once and filters locally.

use crate::adapter::{DeviceAdapter, DeviceState};
use crate::error::DeviceError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// One entity row as returned by the Home Assistant states API
#[derive(Debug, Deserialize)]
struct HassEntity {
    entity_id: String,
    state: String,
    #[serde(default)]
    attributes: HassAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct HassAttributes {
    /// Brightness on the hub scale (0-255)
    #[serde(default)]
    brightness: Option<f64>,
    /// Hue (degrees) and saturation (percent)
    #[serde(default)]
    hs_color: Option<(f64, f64)>,
}

impl HassEntity {
    fn into_device_state(self) -> DeviceState {
        let on = match self.state.as_str() {
            "on" => Some(true),
            "off" => Some(false),
            // "unavailable", "unknown" and sensor readings carry no on/off
            _ => None,
        };
        DeviceState {
            on,
            brightness: self.attributes.brightness.map(|b| b / 255.0 * 100.0),
            hue_saturation: self.attributes.hs_color,
        }
    }
}

/// Client for a Home Assistant hub
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl HomeAssistantClient {
    /// Create a client for the given base URL (e.g. `http://hass.local:8123`)
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    fn states_url(&self) -> String {
        format!("{}/api/states", self.base_url)
    }

    /// turn_on / turn_off service URL for an entity's domain
    fn service_url(&self, entity_id: &str, service: &str) -> String {
        // "light.kitchen" -> domain "light"; fall back to the generic domain
        // so unknown entity shapes still reach the hub.
        let domain = entity_id.split('.').next().filter(|d| !d.is_empty());
        format!(
            "{}/api/services/{}/{}",
            self.base_url,
            domain.unwrap_or("homeassistant"),
            service
        )
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, DeviceError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DeviceError::Backend {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl DeviceAdapter for HomeAssistantClient {
    async fn get_state(&self, entity_id: &str) -> Result<DeviceState, DeviceError> {
        let url = format!("{}/{}", self.states_url(), entity_id);
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;

        if response.status().as_u16() == 404 {
            return Err(DeviceError::UnknownEntity(entity_id.to_string()));
        }
        let response = Self::check(response).await?;
        let entity: HassEntity = response.json().await?;
        Ok(entity.into_device_state())
    }

    async fn set_state(&self, entity_id: &str, patch: &DeviceState) -> Result<(), DeviceError> {
        // Adjusting brightness/color implies turn_on; only an explicit
        // on=false selects turn_off.
        let service = if patch.on == Some(false) {
            "turn_off"
        } else {
            "turn_on"
        };

        let mut body = serde_json::json!({ "entity_id": entity_id });
        if service == "turn_on" {
            if let Some(brightness) = patch.brightness {
                let scaled = (brightness / 100.0 * 255.0).round().clamp(0.0, 255.0);
                body["brightness"] = serde_json::json!(scaled as u64);
            }
            if let Some((hue, sat)) = patch.hue_saturation {
                body["hs_color"] = serde_json::json!([hue, sat]);
            }
        }

        tracing::debug!("Calling {} for {}", service, entity_id);
        let response = self
            .http
            .post(self.service_url(entity_id, service))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_states(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, DeviceState>, DeviceError> {
        let response = self
            .http
            .get(self.states_url())
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let entities: Vec<HassEntity> = response.json().await?;

        let wanted: std::collections::HashSet<&str> =
            entity_ids.iter().map(String::as_str).collect();
        Ok(entities
            .into_iter()
            .filter(|e| wanted.contains(e.entity_id.as_str()))
            .map(|e| (e.entity_id.clone(), e.into_device_state()))
            .collect())
    }
}
