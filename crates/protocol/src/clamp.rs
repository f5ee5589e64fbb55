//! Size clamps applied to everything that crosses the bridge.

use serde_json::{Value, json};

/// Largest serialized payload sent in one message.
pub const MAX_PAYLOAD_JSON: usize = 100_000;

/// Largest error message.
pub const MAX_ERROR_MESSAGE: usize = 2_000;

/// Truncates `s` to at most `max` characters, never splitting a character.
pub fn clamp_str(s: &str, max: usize) -> String {
	match s.char_indices().nth(max) {
		Some((idx, _)) => s[..idx].to_string(),
		None => s.to_string(),
	}
}

/// String form of an untrusted JSON value, clamped to `max` characters.
///
/// Strings pass through, `null`/absent become empty, anything else is rendered
/// as compact JSON. Handlers use this instead of rejecting odd shapes.
pub fn clamp_text(value: Option<&Value>, max: usize) -> String {
	match value {
		None | Some(Value::Null) => String::new(),
		Some(Value::String(s)) => clamp_str(s, max),
		Some(other) => clamp_str(&other.to_string(), max),
	}
}

/// Returns `value` unchanged when its JSON form fits in `max_json` characters,
/// or a truncation summary otherwise.
pub fn clamp_value(value: Value, max_json: usize) -> Value {
	match serde_json::to_string(&value) {
		Ok(json) => {
			let len = json.chars().count();
			if len <= max_json {
				value
			} else {
				json!({ "truncated": true, "reason": "too_large", "jsonLength": len })
			}
		}
		Err(_) => json!({ "truncated": true, "reason": "unserializable" }),
	}
}

/// True for a truncation summary produced by [`clamp_value`].
pub fn is_truncated(value: &Value) -> bool {
	value.get("truncated").and_then(Value::as_bool).unwrap_or(false)
}
