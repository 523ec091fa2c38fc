//! The adapter contract the graph engine depends on

use crate::error::DeviceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reported or desired state of a single device entity.
///
/// The same shape serves as a read-out (`get_state`) and as a patch
/// (`set_state`), where `None` means "leave this field alone". Brightness is
/// a percentage (0-100), hue is degrees (0-360), saturation a percentage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// On/off state
    #[serde(default)]
    pub on: Option<bool>,
    /// Brightness percentage (0-100)
    #[serde(default)]
    pub brightness: Option<f64>,
    /// Hue (degrees) and saturation (percent)
    #[serde(default)]
    pub hue_saturation: Option<(f64, f64)>,
}

impl DeviceState {
    /// A patch that only switches the device on or off
    #[must_use]
    pub fn power(on: bool) -> Self {
        Self {
            on: Some(on),
            ..Self::default()
        }
    }

    /// True if the patch carries no fields at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.on.is_none() && self.brightness.is_none() && self.hue_saturation.is_none()
    }

    /// Overwrite the fields present in `patch`, leaving the rest untouched
    pub fn apply(&mut self, patch: &DeviceState) {
        if let Some(on) = patch.on {
            self.on = Some(on);
        }
        if let Some(brightness) = patch.brightness {
            self.brightness = Some(brightness);
        }
        if let Some(hs) = patch.hue_saturation {
            self.hue_saturation = Some(hs);
        }
    }
}

/// Contract every device back-end must satisfy.
///
/// The engine only depends on this shape, never on a concrete protocol.
/// Implementations are expected to surface transport failures as
/// `DeviceError` rather than panic; callers at the node boundary catch and
/// log them.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Fetch the currently reported state of one entity
    async fn get_state(&self, entity_id: &str) -> Result<DeviceState, DeviceError>;

    /// Apply a state patch to one entity
    async fn set_state(&self, entity_id: &str, patch: &DeviceState) -> Result<(), DeviceError>;

    /// Fetch reported state for many entities in one batched round-trip.
    ///
    /// Entities the back-end does not know are simply absent from the result
    /// map; only transport-level failures error out.
    async fn get_states(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, DeviceState>, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_merges_only_present_fields() {
        let mut state = DeviceState {
            on: Some(true),
            brightness: Some(80.0),
            hue_saturation: Some((120.0, 50.0)),
        };
        state.apply(&DeviceState {
            brightness: Some(30.0),
            ..DeviceState::default()
        });
        assert_eq!(state.on, Some(true));
        assert_eq!(state.brightness, Some(30.0));
        assert_eq!(state.hue_saturation, Some((120.0, 50.0)));
    }

    #[test]
    fn power_patch_is_minimal() {
        let patch = DeviceState::power(false);
        assert_eq!(patch.on, Some(false));
        assert!(patch.brightness.is_none());
        assert!(!patch.is_empty());
        assert!(DeviceState::default().is_empty());
    }
}
