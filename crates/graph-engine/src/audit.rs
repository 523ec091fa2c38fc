//! State audit
//!
//! Every device command the engine issues is recorded as the intended state
//! for that entity. A background pass periodically fetches real states in one
//! batch and reports where reality drifted from intent, with tolerances wide
//! enough that device-side rounding does not page anyone.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use device_bridge::{DeviceAdapter, DeviceState};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

/// Tuning knobs for the reconciliation pass
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Gap between reconciliation passes
    pub interval: Duration,
    /// Grace period after startup before the first pass
    pub warmup: Duration,
    /// Brightness drift allowed before a mismatch, in percent points
    pub brightness_tolerance: f64,
    /// Hue drift allowed before a mismatch, in degrees on the color circle
    pub hue_tolerance: f64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            warmup: Duration::from_secs(30),
            brightness_tolerance: 10.0,
            hue_tolerance: 15.0,
        }
    }
}

/// What the engine last asked a device to be
#[derive(Debug, Clone, Serialize)]
pub struct IntendedState {
    #[serde(flatten)]
    pub state: DeviceState,
    /// RFC 3339 timestamp of the most recent command
    pub last_updated: String,
}

/// One field where a device disagrees with intent
#[derive(Debug, Clone, Serialize)]
pub struct Mismatch {
    pub entity_id: String,
    pub field: &'static str,
    pub expected: Value,
    pub reported: Value,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub generated_at: String,
    /// Entities with recorded intent that were compared
    pub checked: usize,
    pub mismatches: Vec<Mismatch>,
}

impl AuditReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

pub struct StateAudit {
    intended: DashMap<String, IntendedState>,
    devices: Arc<dyn DeviceAdapter>,
    config: AuditConfig,
    last_report: Mutex<Option<AuditReport>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StateAudit {
    #[must_use]
    pub fn new(devices: Arc<dyn DeviceAdapter>, config: AuditConfig) -> Self {
        Self {
            intended: DashMap::new(),
            devices,
            config,
            last_report: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Record a command about to be sent, merging the patch into prior intent
    pub fn record_command(&self, entity_id: &str, patch: &DeviceState) {
        let mut entry = self
            .intended
            .entry(entity_id.to_string())
            .or_insert_with(|| IntendedState {
                state: DeviceState::default(),
                last_updated: String::new(),
            });
        entry.state.apply(patch);
        entry.last_updated = Utc::now().to_rfc3339();
    }

    /// Recorded intent for one entity
    #[must_use]
    pub fn intended_for(&self, entity_id: &str) -> Option<IntendedState> {
        self.intended.get(entity_id).map(|r| r.value().clone())
    }

    /// Number of entities with recorded intent
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.intended.len()
    }

    /// The most recent report, if a pass has completed
    #[must_use]
    pub fn last_report(&self) -> Option<AuditReport> {
        self.last_report.lock().ok().and_then(|guard| guard.clone())
    }

    /// Run one reconciliation pass now and return the report.
    ///
    /// States come back in a single batched query; entities the backend could
    /// not report are flagged per-field against `null`. If the query itself
    /// fails, the pass reports zero entities checked and the stored report
    /// keeps the last pass that completed.
    pub async fn run_once(&self) -> AuditReport {
        let entity_ids: Vec<String> = self
            .intended
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut checked = 0;
        let mut fetched = true;
        let mut mismatches = Vec::new();
        if !entity_ids.is_empty() {
            match self.devices.get_states(&entity_ids).await {
                Ok(reported) => {
                    checked = entity_ids.len();
                    for entity_id in &entity_ids {
                        let Some(intent) = self.intended_for(entity_id) else {
                            continue;
                        };
                        let found = reported.get(entity_id);
                        self.compare(entity_id, &intent.state, found, &mut mismatches);
                    }
                }
                Err(err) => {
                    fetched = false;
                    tracing::warn!(error = %err, "state audit could not fetch device states");
                }
            }
        }

        for mismatch in &mismatches {
            tracing::warn!(
                entity_id = %mismatch.entity_id,
                field = mismatch.field,
                expected = %mismatch.expected,
                reported = %mismatch.reported,
                "device state drifted from intent"
            );
        }

        let report = AuditReport {
            generated_at: Utc::now().to_rfc3339(),
            checked,
            mismatches,
        };
        // A failed fetch must not shadow the last completed pass
        if fetched {
            if let Ok(mut guard) = self.last_report.lock() {
                *guard = Some(report.clone());
            }
        }
        report
    }

    fn compare(
        &self,
        entity_id: &str,
        intended: &DeviceState,
        reported: Option<&DeviceState>,
        out: &mut Vec<Mismatch>,
    ) {
        let reported = reported.cloned().unwrap_or_default();

        if let Some(want_on) = intended.on {
            match reported.on {
                Some(is_on) if is_on == want_on => {}
                other => out.push(Mismatch {
                    entity_id: entity_id.to_string(),
                    field: "on",
                    expected: json!(want_on),
                    reported: other.map(|v| json!(v)).unwrap_or(Value::Null),
                }),
            }
        }

        // Brightness and color only count while the device should be on;
        // many devices report stale levels when off.
        if intended.on != Some(true) {
            return;
        }

        if let Some(want_brightness) = intended.brightness {
            match reported.brightness {
                Some(level)
                    if (level - want_brightness).abs() <= self.config.brightness_tolerance => {}
                other => out.push(Mismatch {
                    entity_id: entity_id.to_string(),
                    field: "brightness",
                    expected: json!(want_brightness),
                    reported: other.map(|v| json!(v)).unwrap_or(Value::Null),
                }),
            }
        }

        if let Some((want_hue, _)) = intended.hue_saturation {
            match reported.hue_saturation {
                Some((hue, _)) if hue_distance(hue, want_hue) <= self.config.hue_tolerance => {}
                other => out.push(Mismatch {
                    entity_id: entity_id.to_string(),
                    field: "hue",
                    expected: json!(want_hue),
                    reported: other.map(|(h, _)| json!(h)).unwrap_or(Value::Null),
                }),
            }
        }
    }

    /// Spawn the periodic reconciliation task.
    ///
    /// The task holds only a weak reference, so dropping the audit (and the
    /// engine around it) ends the loop instead of leaking it.
    pub fn start(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let warmup = self.config.warmup;
        let interval = self.config.interval;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(warmup).await;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval fires immediately once; consume it so the first pass
            // happens after the warmup, not twice in a row
            ticker.tick().await;
            loop {
                let Some(audit) = weak.upgrade() else {
                    break;
                };
                let report = audit.run_once().await;
                if report.is_clean() {
                    tracing::debug!(checked = report.checked, "state audit pass clean");
                } else {
                    tracing::info!(
                        checked = report.checked,
                        mismatches = report.mismatches.len(),
                        "state audit pass found drift"
                    );
                }
                drop(audit);
                ticker.tick().await;
            }
        });

        if let Ok(mut slot) = self.task.lock() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
            }
        }
    }

    /// Stop the periodic task, if running
    pub fn stop(&self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for StateAudit {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// Shortest angular distance between two hues on the 360 degree circle
fn hue_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    diff.min(360.0 - diff)
}
