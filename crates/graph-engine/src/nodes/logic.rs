//! Logic and scheduling definitions
//!
//! Constants, comparisons, boolean gates, schedule windows, and edge
//! detection, all expressed as table-driven definitions.

use chrono::{Datelike, Timelike};
use serde_json::{json, Value};

use crate::definition::NodeDefinition;
use crate::node::{NodeOutputs, NodeProperties};

fn single(value: Value) -> NodeOutputs {
    let mut out = NodeOutputs::new();
    out.insert("out".into(), value);
    out
}

/// Constant boolean source
pub static BOOLEAN: NodeDefinition = NodeDefinition {
    type_id: "boolean",
    label: "Boolean",
    defaults: || {
        let mut props = NodeProperties::new();
        props.insert("value".into(), json!(false));
        props
    },
    internal_state: None,
    execute: |_, props, _, _| {
        let value = props.get("value").and_then(Value::as_bool).unwrap_or(false);
        single(json!(value))
    },
};

/// Constant number source
pub static NUMBER: NodeDefinition = NodeDefinition {
    type_id: "number",
    label: "Number",
    defaults: || {
        let mut props = NodeProperties::new();
        props.insert("value".into(), json!(0.0));
        props
    },
    internal_state: None,
    execute: |_, props, _, _| {
        let value = props.get("value").and_then(Value::as_f64).unwrap_or(0.0);
        single(json!(value))
    },
};

/// Compares the incoming number against a configured limit
pub static THRESHOLD: NodeDefinition = NodeDefinition {
    type_id: "threshold",
    label: "Threshold",
    defaults: || {
        let mut props = NodeProperties::new();
        props.insert("threshold".into(), json!(0.0));
        props.insert("operator".into(), json!(">"));
        props
    },
    internal_state: None,
    execute: |inputs, props, _, _| {
        let Some(value) = inputs.number("value") else {
            return NodeOutputs::new();
        };
        let limit = props
            .get("threshold")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let operator = props
            .get("operator")
            .and_then(Value::as_str)
            .unwrap_or(">");
        let pass = match operator {
            ">" => value > limit,
            ">=" => value >= limit,
            "<" => value < limit,
            "<=" => value <= limit,
            "==" => value == limit,
            "!=" => value != limit,
            other => {
                tracing::warn!(operator = other, "unknown threshold operator");
                false
            }
        };
        single(json!(pass))
    },
};

/// "HH:MM" to minutes past midnight
fn parse_hhmm(text: &str) -> Option<u32> {
    let (hours, minutes) = text.split_once(':')?;
    let hours: u32 = hours.trim().parse().ok()?;
    let minutes: u32 = minutes.trim().parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// True while the clock is inside a daily window, with optional day filter.
///
/// A window whose end precedes its start wraps past midnight, so
/// `22:00`-`06:00` covers late evening through early morning. `days` holds
/// weekday numbers with 0 = Sunday; empty means every day.
pub static TIME_WINDOW: NodeDefinition = NodeDefinition {
    type_id: "time_window",
    label: "Time Window",
    defaults: || {
        let mut props = NodeProperties::new();
        props.insert("start".into(), json!("08:00"));
        props.insert("end".into(), json!("20:00"));
        props.insert("days".into(), json!([]));
        props
    },
    internal_state: None,
    execute: |_, props, ctx, _| {
        let start = props
            .get("start")
            .and_then(Value::as_str)
            .and_then(parse_hhmm);
        let end = props.get("end").and_then(Value::as_str).and_then(parse_hhmm);
        let (Some(start), Some(end)) = (start, end) else {
            return single(json!(false));
        };

        let weekday = ctx.now.weekday().num_days_from_sunday();
        let day_allowed = match props.get("days").and_then(Value::as_array) {
            Some(days) if !days.is_empty() => days
                .iter()
                .filter_map(Value::as_u64)
                .any(|day| day as u32 == weekday),
            _ => true,
        };

        let minute = ctx.now.hour() * 60 + ctx.now.minute();
        let inside = if start <= end {
            minute >= start && minute < end
        } else {
            minute >= start || minute < end
        };
        single(json!(day_allowed && inside))
    },
};

/// All connected inputs true; an unwired input counts as false
pub static LOGIC_AND: NodeDefinition = NodeDefinition {
    type_id: "logic_and",
    label: "And",
    defaults: NodeProperties::new,
    internal_state: None,
    execute: |inputs, _, _, _| {
        let entries = inputs.all("in");
        if entries.is_empty() {
            return NodeOutputs::new();
        }
        let all = entries
            .iter()
            .all(|entry| entry.as_ref().and_then(Value::as_bool).unwrap_or(false));
        single(json!(all))
    },
};

/// Any connected input true
pub static LOGIC_OR: NodeDefinition = NodeDefinition {
    type_id: "logic_or",
    label: "Or",
    defaults: NodeProperties::new,
    internal_state: None,
    execute: |inputs, _, _, _| {
        let entries = inputs.all("in");
        if entries.is_empty() {
            return NodeOutputs::new();
        }
        let any = entries
            .iter()
            .any(|entry| entry.as_ref().and_then(Value::as_bool).unwrap_or(false));
        single(json!(any))
    },
};

/// Boolean inverse of the first input
pub static LOGIC_NOT: NodeDefinition = NodeDefinition {
    type_id: "logic_not",
    label: "Not",
    defaults: NodeProperties::new,
    internal_state: None,
    execute: |inputs, _, _, _| {
        if inputs.all("in").is_empty() {
            return NodeOutputs::new();
        }
        let value = inputs.bool("in").unwrap_or(false);
        single(json!(!value))
    },
};

/// True for exactly one tick when the input goes false to true
pub static EDGE_DETECT: NodeDefinition = NodeDefinition {
    type_id: "edge_detect",
    label: "Rising Edge",
    defaults: NodeProperties::new,
    internal_state: Some(|| json!({ "last": false })),
    execute: |inputs, _, _, state| {
        if inputs.all("in").is_empty() {
            return NodeOutputs::new();
        }
        let current = inputs.bool("in").unwrap_or(false);
        let last = state["last"].as_bool().unwrap_or(false);
        state["last"] = json!(current);
        single(json!(current && !last))
    },
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DefinitionNode;
    use crate::node::{Clock, Node, NodeInputs};
    use chrono::{Local, TimeZone};

    fn node(def: &'static NodeDefinition) -> DefinitionNode {
        DefinitionNode::new(def, Clock::system())
    }

    fn node_at(def: &'static NodeDefinition, hour: u32, minute: u32) -> DefinitionNode {
        // 2024-06-01 is a Saturday
        let at = Local.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap();
        DefinitionNode::new(def, Clock::fixed(at))
    }

    fn wired(slot: &str, values: &[Option<Value>]) -> NodeInputs {
        let mut inputs = NodeInputs::new();
        for value in values {
            inputs.push(slot, value.clone());
        }
        inputs
    }

    fn configured(def: &'static NodeDefinition, props: Value) -> DefinitionNode {
        let mut instance = node(def);
        let map = props.as_object().cloned().unwrap_or_default();
        instance.restore(&map);
        instance
    }

    #[tokio::test]
    async fn constants_emit_their_configured_value() {
        let mut flag = configured(&BOOLEAN, json!({ "value": true }));
        let out = flag.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("out"), Some(&json!(true)));

        let mut level = configured(&NUMBER, json!({ "value": 42.5 }));
        let out = level.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("out"), Some(&json!(42.5)));
    }

    #[tokio::test]
    async fn threshold_compares_with_configured_operator() {
        let mut above = configured(&THRESHOLD, json!({ "threshold": 21.0, "operator": ">" }));
        let out = above
            .step(&wired("value", &[Some(json!(23.5))]))
            .await
            .unwrap();
        assert_eq!(out.get("out"), Some(&json!(true)));

        let mut below = configured(&THRESHOLD, json!({ "threshold": 21.0, "operator": "<=" }));
        let out = below
            .step(&wired("value", &[Some(json!(23.5))]))
            .await
            .unwrap();
        assert_eq!(out.get("out"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn threshold_without_signal_emits_nothing() {
        let mut gate = node(&THRESHOLD);
        assert!(gate.step(&NodeInputs::new()).await.unwrap().is_empty());
        assert!(gate
            .step(&wired("value", &[None]))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn time_window_tracks_the_clock() {
        let mut inside = node_at(&TIME_WINDOW, 12, 0);
        let out = inside.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("out"), Some(&json!(true)));

        let mut outside = node_at(&TIME_WINDOW, 21, 30);
        let out = outside.step(&NodeInputs::new()).await.unwrap();
        assert_eq!(out.get("out"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn time_window_wraps_past_midnight() {
        let night = json!({ "start": "22:00", "end": "06:00" });

        let mut late = node_at(&TIME_WINDOW, 23, 15);
        late.restore(night.as_object().unwrap());
        assert_eq!(
            late.step(&NodeInputs::new()).await.unwrap().get("out"),
            Some(&json!(true))
        );

        let mut early = node_at(&TIME_WINDOW, 5, 0);
        early.restore(night.as_object().unwrap());
        assert_eq!(
            early.step(&NodeInputs::new()).await.unwrap().get("out"),
            Some(&json!(true))
        );

        let mut midday = node_at(&TIME_WINDOW, 12, 0);
        midday.restore(night.as_object().unwrap());
        assert_eq!(
            midday.step(&NodeInputs::new()).await.unwrap().get("out"),
            Some(&json!(false))
        );
    }

    #[tokio::test]
    async fn time_window_respects_day_filter() {
        // Fixed clock lands on Saturday (= 6 counting from Sunday)
        let mut weekend = node_at(&TIME_WINDOW, 12, 0);
        weekend.restore(json!({ "days": [0, 6] }).as_object().unwrap());
        assert_eq!(
            weekend.step(&NodeInputs::new()).await.unwrap().get("out"),
            Some(&json!(true))
        );

        let mut weekdays = node_at(&TIME_WINDOW, 12, 0);
        weekdays.restore(json!({ "days": [1, 2, 3, 4, 5] }).as_object().unwrap());
        assert_eq!(
            weekdays.step(&NodeInputs::new()).await.unwrap().get("out"),
            Some(&json!(false))
        );
    }

    #[tokio::test]
    async fn gates_treat_missing_signals_as_false() {
        let mut and = node(&LOGIC_AND);
        let out = and
            .step(&wired("in", &[Some(json!(true)), None]))
            .await
            .unwrap();
        assert_eq!(out.get("out"), Some(&json!(false)));

        let mut or = node(&LOGIC_OR);
        let out = or
            .step(&wired("in", &[Some(json!(true)), None]))
            .await
            .unwrap();
        assert_eq!(out.get("out"), Some(&json!(true)));

        // Unwired gates emit nothing at all
        assert!(and.step(&NodeInputs::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn not_inverts_first_signal() {
        let mut not = node(&LOGIC_NOT);
        let out = not.step(&wired("in", &[Some(json!(true))])).await.unwrap();
        assert_eq!(out.get("out"), Some(&json!(false)));
        let out = not.step(&wired("in", &[None])).await.unwrap();
        assert_eq!(out.get("out"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn edge_detect_fires_on_rising_transitions_only() {
        let mut edge = node(&EDGE_DETECT);
        let pulse = |on: bool| wired("in", &[Some(json!(on))]);

        assert_eq!(
            edge.step(&pulse(false)).await.unwrap().get("out"),
            Some(&json!(false))
        );
        assert_eq!(
            edge.step(&pulse(true)).await.unwrap().get("out"),
            Some(&json!(true))
        );
        // Held high: only the transition counts
        assert_eq!(
            edge.step(&pulse(true)).await.unwrap().get("out"),
            Some(&json!(false))
        );
        assert_eq!(
            edge.step(&pulse(false)).await.unwrap().get("out"),
            Some(&json!(false))
        );
        assert_eq!(
            edge.step(&pulse(true)).await.unwrap().get("out"),
            Some(&json!(true))
        );
    }

    #[test]
    fn hhmm_parser_rejects_out_of_range_values() {
        assert_eq!(parse_hhmm("08:30"), Some(510));
        assert_eq!(parse_hhmm("00:00"), Some(0));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("12:60"), None);
        assert_eq!(parse_hhmm("noon"), None);
    }
}
