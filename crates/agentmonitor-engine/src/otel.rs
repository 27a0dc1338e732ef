//! OTLP JSON adaptation: log records and cumulative metric series are
//! reduced to ordinary ingest payloads and fed through the same
//! contract as every other producer.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

/// Converts monotonic counter snapshots into per-interval deltas, keyed
/// by (metric, resource, model). State is process-local and resets on
/// restart; the first observation after a restart replays as one whole
/// delta.
#[derive(Debug, Default)]
pub struct DeltaTracker {
    last: HashMap<(String, String, String), u64>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta for the next cumulative observation. Always >= 0; a
    /// decreasing series is treated as a counter reset.
    pub fn delta(&mut self, metric: &str, resource: &str, model: &str, value: u64) -> u64 {
        let key = (metric.to_string(), resource.to_string(), model.to_string());
        let previous = self.last.insert(key, value).unwrap_or(0);
        if value >= previous { value - previous } else { value }
    }
}

/// Extract ingest payloads from an OTLP JSON logs envelope. Records
/// without the session attributes are skipped; the contract rejects
/// anything else that is malformed.
pub fn log_payloads(envelope: &Value) -> Vec<Value> {
    let mut payloads = Vec::new();

    for resource_logs in array(envelope.get("resourceLogs")) {
        let resource_attrs = attributes(resource_logs.get("resource").and_then(|r| r.get("attributes")));
        for scope_logs in array(resource_logs.get("scopeLogs")) {
            for record in array(scope_logs.get("logRecords")) {
                let attrs = attributes(record.get("attributes"));
                let lookup = |keys: &[&str]| -> Option<String> {
                    keys.iter()
                        .find_map(|k| attrs.get(*k).or_else(|| resource_attrs.get(*k)))
                        .cloned()
                };

                let Some(session_id) = lookup(&["session.id", "session_id"]) else {
                    continue;
                };
                let Some(event_type) = lookup(&["event.type", "event_type"]) else {
                    continue;
                };
                let agent_type =
                    lookup(&["agent.type", "agent_type", "service.name"]).unwrap_or_else(|| "otel".to_string());

                let mut payload = Map::new();
                payload.insert("session_id".to_string(), Value::String(session_id));
                payload.insert("agent_type".to_string(), Value::String(agent_type));
                payload.insert("event_type".to_string(), Value::String(event_type));
                payload.insert("source".to_string(), Value::String("otel".to_string()));

                if let Some(tool) = lookup(&["tool.name", "tool_name"]) {
                    payload.insert("tool_name".to_string(), Value::String(tool));
                }
                if let Some(model) = lookup(&["gen_ai.request.model", "gen_ai.response.model", "model"]) {
                    payload.insert("model".to_string(), Value::String(model));
                }
                for (field, keys) in [
                    ("tokens_in", ["gen_ai.usage.input_tokens", "tokens_in"]),
                    ("tokens_out", ["gen_ai.usage.output_tokens", "tokens_out"]),
                ] {
                    if let Some(value) = lookup(&keys)
                        && let Ok(count) = value.parse::<u64>()
                    {
                        payload.insert(field.to_string(), Value::Number(count.into()));
                    }
                }

                if let Some(body) = record.get("body").and_then(|b| b.get("stringValue")) {
                    payload.insert("metadata".to_string(), json!({"message": body.clone()}));
                }

                payloads.push(Value::Object(payload));
            }
        }
    }

    payloads
}

/// Extract ingest payloads from an OTLP JSON metrics envelope. Only
/// token-usage sums are mapped; cumulative series are converted to
/// deltas and emitted as synthetic llm_response events.
pub fn metric_payloads(tracker: &mut DeltaTracker, envelope: &Value) -> Vec<Value> {
    let mut payloads = Vec::new();

    for resource_metrics in array(envelope.get("resourceMetrics")) {
        let resource_attrs =
            attributes(resource_metrics.get("resource").and_then(|r| r.get("attributes")));
        let resource_key = resource_attrs
            .get("service.instance.id")
            .or_else(|| resource_attrs.get("service.name"))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());

        for scope_metrics in array(resource_metrics.get("scopeMetrics")) {
            for metric in array(scope_metrics.get("metrics")) {
                let Some(name) = metric.get("name").and_then(Value::as_str) else {
                    continue;
                };
                if !name.contains("token") {
                    continue;
                }

                let Some(sum) = metric.get("sum") else {
                    continue;
                };
                let cumulative = sum
                    .get("aggregationTemporality")
                    .and_then(Value::as_i64)
                    // AGGREGATION_TEMPORALITY_CUMULATIVE
                    .map(|t| t == 2)
                    .unwrap_or(true);

                for point in array(sum.get("dataPoints")) {
                    let attrs = attributes(point.get("attributes"));
                    let model = attrs
                        .get("gen_ai.request.model")
                        .or_else(|| attrs.get("model"))
                        .cloned()
                        .unwrap_or_default();
                    let direction = attrs
                        .get("gen_ai.token.type")
                        .or_else(|| attrs.get("type"))
                        .map(String::as_str)
                        .unwrap_or("output");

                    let Some(value) = point_value(point) else {
                        continue;
                    };
                    let amount = if cumulative {
                        tracker.delta(name, &resource_key, &format!("{model}/{direction}"), value)
                    } else {
                        value
                    };
                    if amount == 0 {
                        continue;
                    }

                    let mut payload = Map::new();
                    payload.insert(
                        "session_id".to_string(),
                        Value::String(format!("otel-{resource_key}")),
                    );
                    payload.insert(
                        "agent_type".to_string(),
                        Value::String(
                            resource_attrs
                                .get("agent.type")
                                .or_else(|| resource_attrs.get("service.name"))
                                .cloned()
                                .unwrap_or_else(|| "otel".to_string()),
                        ),
                    );
                    payload.insert(
                        "event_type".to_string(),
                        Value::String("llm_response".to_string()),
                    );
                    payload.insert("source".to_string(), Value::String("otel".to_string()));
                    if !model.is_empty() {
                        payload.insert("model".to_string(), Value::String(model));
                    }
                    let field = if direction == "input" {
                        "tokens_in"
                    } else {
                        "tokens_out"
                    };
                    payload.insert(field.to_string(), Value::Number(amount.into()));

                    payloads.push(Value::Object(payload));
                }
            }
        }
    }

    payloads
}

fn array(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value
        .and_then(Value::as_array)
        .map(|v| v.as_slice())
        .unwrap_or_default()
        .iter()
}

/// Flatten an OTLP attribute list into a string map.
fn attributes(value: Option<&Value>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for attr in array(value) {
        let Some(key) = attr.get("key").and_then(Value::as_str) else {
            continue;
        };
        let Some(value) = attr.get("value") else {
            continue;
        };
        let rendered = value
            .get("stringValue")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| {
                value
                    .get("intValue")
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
            })
            .or_else(|| value.get("doubleValue").map(|v| v.to_string()))
            .or_else(|| value.get("boolValue").map(|v| v.to_string()));
        if let Some(rendered) = rendered {
            map.insert(key.to_string(), rendered);
        }
    }
    map
}

/// OTLP encodes integers as either asInt (often a string) or asDouble.
fn point_value(point: &Value) -> Option<u64> {
    if let Some(v) = point.get("asInt") {
        return match v {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        };
    }
    point.get("asDouble").and_then(Value::as_f64).map(|f| f.max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cumulative_series_yields_non_negative_deltas() {
        let mut tracker = DeltaTracker::new();
        let series = [100u64, 250, 250, 400];
        let deltas: Vec<u64> = series
            .iter()
            .map(|v| tracker.delta("gen_ai.client.token.usage", "svc-1", "m/output", *v))
            .collect();
        assert_eq!(deltas, vec![100, 150, 0, 150]);
    }

    #[test]
    fn counter_reset_replays_as_whole_delta() {
        let mut tracker = DeltaTracker::new();
        tracker.delta("m", "r", "k", 500);
        // Process restart on the producer side
        assert_eq!(tracker.delta("m", "r", "k", 120), 120);
    }

    #[test]
    fn tracker_keys_are_independent() {
        let mut tracker = DeltaTracker::new();
        assert_eq!(tracker.delta("m", "r1", "k", 100), 100);
        assert_eq!(tracker.delta("m", "r2", "k", 100), 100);
        assert_eq!(tracker.delta("m", "r1", "other", 40), 40);
    }

    #[test]
    fn log_records_map_to_payloads() {
        let envelope = serde_json::json!({
            "resourceLogs": [{
                "resource": {"attributes": [
                    {"key": "service.name", "value": {"stringValue": "claude_code"}}
                ]},
                "scopeLogs": [{
                    "logRecords": [{
                        "attributes": [
                            {"key": "session.id", "value": {"stringValue": "s-9"}},
                            {"key": "event.type", "value": {"stringValue": "tool_use"}},
                            {"key": "tool.name", "value": {"stringValue": "Bash"}}
                        ],
                        "body": {"stringValue": "ran ls"}
                    }]
                }]
            }]
        });

        let payloads = log_payloads(&envelope);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["session_id"], "s-9");
        assert_eq!(payloads[0]["agent_type"], "claude_code");
        assert_eq!(payloads[0]["event_type"], "tool_use");
        assert_eq!(payloads[0]["tool_name"], "Bash");
        assert_eq!(payloads[0]["source"], "otel");
        assert_eq!(payloads[0]["metadata"]["message"], "ran ls");
    }

    #[test]
    fn log_records_without_session_are_skipped() {
        let envelope = serde_json::json!({
            "resourceLogs": [{
                "scopeLogs": [{"logRecords": [{"attributes": []}]}]
            }]
        });
        assert!(log_payloads(&envelope).is_empty());
    }

    #[test]
    fn cumulative_metrics_become_delta_events() {
        let mut tracker = DeltaTracker::new();
        let envelope = |value: u64| {
            serde_json::json!({
                "resourceMetrics": [{
                    "resource": {"attributes": [
                        {"key": "service.instance.id", "value": {"stringValue": "inst-1"}},
                        {"key": "agent.type", "value": {"stringValue": "codex"}}
                    ]},
                    "scopeMetrics": [{
                        "metrics": [{
                            "name": "gen_ai.client.token.usage",
                            "sum": {
                                "aggregationTemporality": 2,
                                "dataPoints": [{
                                    "asInt": value.to_string(),
                                    "attributes": [
                                        {"key": "gen_ai.request.model", "value": {"stringValue": "gpt-5"}},
                                        {"key": "gen_ai.token.type", "value": {"stringValue": "output"}}
                                    ]
                                }]
                            }
                        }]
                    }]
                }]
            })
        };

        let first = metric_payloads(&mut tracker, &envelope(1000));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0]["tokens_out"], 1000);
        assert_eq!(first[0]["event_type"], "llm_response");
        assert_eq!(first[0]["model"], "gpt-5");
        assert_eq!(first[0]["agent_type"], "codex");

        let second = metric_payloads(&mut tracker, &envelope(1600));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0]["tokens_out"], 600);

        // No growth, no event
        let third = metric_payloads(&mut tracker, &envelope(1600));
        assert!(third.is_empty());
    }
}
