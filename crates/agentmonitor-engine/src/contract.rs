//! Inbound payload contract: a pure function from a raw JSON body to a
//! normalized event or a list of field-level rejections. Rejection
//! never partially applies.

use agentmonitor_types::{EventStatus, EventType, FieldError, NormalizedEvent, SourceTag};
use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Value};

/// Priority keys preserved verbatim, in order, when an oversized
/// metadata object is reduced to its summary form.
const PRIORITY_KEYS: [&str; 9] = [
    "command", "file_path", "query", "pattern", "error", "message", "tool_name", "path", "type",
];

/// Some producers quote-wrap their JSON bodies, sometimes more than
/// once. Peel up to this many layers before giving up.
const MAX_UNWRAP_DEPTH: usize = 3;

/// Normalize one raw payload. `max_payload_bytes` caps the serialized
/// metadata size.
pub fn normalize(raw: Value, max_payload_bytes: usize) -> Result<NormalizedEvent, Vec<FieldError>> {
    let raw = unwrap_double_encoded(raw);

    let Value::Object(body) = raw else {
        return Err(vec![FieldError::new("body", "payload must be a JSON object")]);
    };

    let mut errors = Vec::new();

    let session_id = match required_string(&body, "session_id") {
        Ok(v) => v,
        Err(e) => {
            errors.push(e);
            String::new()
        }
    };
    let agent_type = match required_string(&body, "agent_type") {
        Ok(v) => v,
        Err(e) => {
            errors.push(e);
            String::new()
        }
    };

    let event_type = match body.get("event_type").and_then(Value::as_str) {
        Some(raw_type) => match EventType::parse(raw_type.trim()) {
            Some(t) => Some(t),
            None => {
                errors.push(FieldError::new(
                    "event_type",
                    format!("unknown event type: {raw_type}"),
                ));
                None
            }
        },
        None => {
            errors.push(FieldError::new("event_type", "missing required field"));
            None
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }
    let event_type = event_type.expect("validated above");

    let status = body
        .get("status")
        .and_then(Value::as_str)
        .and_then(EventStatus::parse)
        .unwrap_or(if event_type == EventType::Error {
            EventStatus::Error
        } else {
            EventStatus::Success
        });

    let (metadata, payload_truncated) = truncate_metadata(
        body.get("metadata").cloned().unwrap_or(Value::Null),
        max_payload_bytes,
    );

    Ok(NormalizedEvent {
        event_id: optional_string(&body, "event_id"),
        session_id,
        agent_type,
        event_type,
        tool_name: optional_string(&body, "tool_name"),
        status,
        tokens_in: non_negative(&body, "tokens_in"),
        tokens_out: non_negative(&body, "tokens_out"),
        cache_read_tokens: non_negative(&body, "cache_read_tokens"),
        cache_write_tokens: non_negative(&body, "cache_write_tokens"),
        duration_ms: duration(&body),
        model: optional_string(&body, "model"),
        cost_usd: body.get("cost_usd").and_then(Value::as_f64),
        project: optional_string(&body, "project"),
        branch: optional_string(&body, "branch"),
        source: optional_string(&body, "source")
            .as_deref()
            .and_then(SourceTag::parse),
        client_timestamp: client_timestamp(&body),
        metadata,
        payload_truncated,
    })
}

/// Peel quote-wrapped bodies: a JSON string whose trimmed contents look
/// like JSON is re-parsed, up to three levels deep.
pub fn unwrap_double_encoded(value: Value) -> Value {
    let mut current = value;
    for _ in 0..MAX_UNWRAP_DEPTH {
        match current {
            Value::String(s) => {
                let trimmed = s.trim();
                let looks_like_json = trimmed.starts_with('{')
                    || trimmed.starts_with('[')
                    || trimmed.starts_with('"');
                if !looks_like_json {
                    return Value::String(s);
                }
                match serde_json::from_str(trimmed) {
                    Ok(inner) => current = inner,
                    Err(_) => return Value::String(s),
                }
            }
            other => return other,
        }
    }
    current
}

fn required_string(body: &Map<String, Value>, field: &str) -> Result<String, FieldError> {
    match body.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(FieldError::new(field, "must be a non-empty string")),
        Some(_) => Err(FieldError::new(field, "must be a string")),
        None => Err(FieldError::new(field, "missing required field")),
    }
}

fn optional_string(body: &Map<String, Value>, field: &str) -> Option<String> {
    let trimmed = body.get(field)?.as_str()?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Missing, negative, or unparseable counts collapse to 0.
fn non_negative(body: &Map<String, Value>, field: &str) -> u64 {
    match body.get(field) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn duration(body: &Map<String, Value>) -> Option<u64> {
    match body.get("duration_ms") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Client timestamps arrive as ISO-8601 with an offset and are stored
/// re-rendered in UTC. Unparseable values are dropped rather than
/// rejected.
fn client_timestamp(body: &Map<String, Value>) -> Option<String> {
    let raw = body.get("client_timestamp")?.as_str()?;
    let parsed = DateTime::parse_from_rfc3339(raw.trim()).ok()?;
    Some(
        parsed
            .to_utc()
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// Reduce metadata to fit the byte cap. Returns the (possibly reduced)
/// value and whether truncation occurred.
pub fn truncate_metadata(metadata: Value, max_bytes: usize) -> (Value, bool) {
    if metadata.is_null() {
        return (metadata, false);
    }

    let serialized_len = match serde_json::to_string(&metadata) {
        Ok(s) => s.len(),
        Err(_) => return (Value::Null, true),
    };
    if serialized_len <= max_bytes {
        return (metadata, false);
    }

    match metadata {
        Value::Object(original) => {
            let mut summary = Map::new();
            summary.insert("_truncated".to_string(), Value::Bool(true));
            summary.insert(
                "_original_bytes".to_string(),
                Value::Number(serialized_len.into()),
            );

            for key in PRIORITY_KEYS {
                let Some(value) = original.get(key) else {
                    continue;
                };
                summary.insert(key.to_string(), value.clone());
                let size = serde_json::to_string(&Value::Object(summary.clone()))
                    .map(|s| s.len())
                    .unwrap_or(usize::MAX);
                if size > max_bytes {
                    summary.remove(key);
                    break;
                }
            }

            (Value::Object(summary), true)
        }
        Value::String(s) => (Value::String(utf8_prefix_fitting(&s, max_bytes)), true),
        _ => {
            let mut marker = Map::new();
            marker.insert("_truncated".to_string(), Value::Bool(true));
            marker.insert(
                "_original_bytes".to_string(),
                Value::Number(serialized_len.into()),
            );
            (Value::Object(marker), true)
        }
    }
}

/// Longest prefix of `s` whose JSON serialization fits in `max_bytes`,
/// never splitting a multi-byte character.
fn utf8_prefix_fitting(s: &str, max_bytes: usize) -> String {
    // Two bytes for the surrounding quotes; escapes may push the
    // serialized form over, so shrink until it fits.
    let mut end = max_bytes.saturating_sub(2).min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut prefix = &s[..end];
    while !prefix.is_empty() {
        let serialized = serde_json::to_string(prefix).map(|v| v.len()).unwrap_or(0);
        if serialized <= max_bytes {
            break;
        }
        let mut new_end = prefix.len() - 1;
        while new_end > 0 && !prefix.is_char_boundary(new_end) {
            new_end -= 1;
        }
        prefix = &prefix[..new_end];
    }
    prefix.to_string()
}
