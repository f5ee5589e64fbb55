//! Message envelope shared by both directions of the bridge channel.
//!
//! ```text
//! { type: string,          // operation name, or "ok" / "err" / "bridge.ready"
//!   reqId: string | null,  // correlation id, generated by the Host
//!   token?: string,        // session secret, sent by the Host on every call
//!   payload?: object,      // operation-specific, plain object or absent
//!   v?: string, ts?: number }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::clamp::{MAX_PAYLOAD_JSON, clamp_value};
use crate::error::{ErrorCode, ErrorPayload};

/// Protocol version stamped on bridge-originated messages.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// `type` of a success reply.
pub const REPLY_OK: &str = "ok";

/// `type` of a failure reply.
pub const REPLY_ERR: &str = "err";

/// `type` of the broadcast sent once a bridge is serving.
pub const BRIDGE_READY: &str = "bridge.ready";

/// Wildcard target origin.
pub const ANY_ORIGIN: &str = "*";

/// Origin reported for a sandboxed context without `allow-same-origin`.
pub const OPAQUE_ORIGIN: &str = "null";

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub req_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payload: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub v: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ts: Option<u64>,
}

impl Envelope {
	/// Host → bridge request.
	pub fn request(kind: impl Into<String>, req_id: impl Into<String>, payload: Value, token: Option<String>) -> Self {
		Self {
			kind: kind.into(),
			req_id: Some(req_id.into()),
			token,
			payload: Some(payload),
			v: None,
			ts: None,
		}
	}

	/// Bridge → Host success reply. The payload is size-clamped.
	pub fn ok(req_id: Option<String>, payload: Value) -> Self {
		Self::bridge_message(REPLY_OK, req_id, payload)
	}

	/// Bridge → Host failure reply.
	pub fn err(req_id: Option<String>, error: ErrorPayload) -> Self {
		let ErrorPayload { code, message, extra } = error;
		let mut body = Map::new();
		body.insert("code".into(), Value::String(code.as_str().into()));
		body.insert("message".into(), Value::String(message));
		if let Some(extra) = extra {
			body.insert("extra".into(), clamp_value(extra, MAX_PAYLOAD_JSON / 2));
		}
		Self::bridge_message(REPLY_ERR, req_id, Value::Object(body))
	}

	/// Bridge → any listener, announcing it is ready for `init`.
	pub fn ready(payload: Value) -> Self {
		Self::bridge_message(BRIDGE_READY, None, payload)
	}

	fn bridge_message(kind: &str, req_id: Option<String>, payload: Value) -> Self {
		Self {
			kind: kind.to_string(),
			req_id,
			token: None,
			payload: Some(clamp_value(payload, MAX_PAYLOAD_JSON)),
			v: Some(PROTOCOL_VERSION.to_string()),
			ts: Some(now_millis()),
		}
	}

	pub fn to_value(&self) -> Value {
		serde_json::to_value(self).unwrap_or(Value::Null)
	}

	/// Parses an inbound message, rejecting anything that is not a well-formed envelope.
	pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
		let Value::Object(map) = &value else {
			return Err(EnvelopeError::NotAnObject);
		};
		if !map.get("type").is_some_and(Value::is_string) {
			return Err(EnvelopeError::MissingType);
		}
		match map.get("reqId") {
			None | Some(Value::Null) | Some(Value::String(_)) => {}
			Some(_) => return Err(EnvelopeError::BadRequestId),
		}
		match map.get("payload") {
			None | Some(Value::Null) | Some(Value::Object(_)) => {}
			Some(_) => return Err(EnvelopeError::BadPayload),
		}
		serde_json::from_value(value).map_err(|e| EnvelopeError::Malformed(e.to_string()))
	}
}

/// Why an inbound value is not an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
	#[error("message is not an object")]
	NotAnObject,
	#[error("message has no string `type`")]
	MissingType,
	#[error("`reqId` must be a string")]
	BadRequestId,
	#[error("`payload` must be a plain object")]
	BadPayload,
	#[error("malformed envelope: {0}")]
	Malformed(String),
}

/// Outcome of a Host call, as handed to the caller.
///
/// Serializes as `{ok: true, payload}` or `{ok: false, error: {code, message}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
	Ok(Value),
	Err(ErrorPayload),
}

impl Reply {
	pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
		Reply::Err(ErrorPayload::new(code, message))
	}

	pub fn is_ok(&self) -> bool {
		matches!(self, Reply::Ok(_))
	}

	pub fn payload(&self) -> Option<&Value> {
		match self {
			Reply::Ok(payload) => Some(payload),
			Reply::Err(_) => None,
		}
	}

	pub fn error_payload(&self) -> Option<&ErrorPayload> {
		match self {
			Reply::Ok(_) => None,
			Reply::Err(err) => Some(err),
		}
	}

	pub fn code(&self) -> Option<ErrorCode> {
		self.error_payload().map(|e| e.code)
	}

	pub fn into_result(self) -> Result<Value, ErrorPayload> {
		match self {
			Reply::Ok(payload) => Ok(payload),
			Reply::Err(err) => Err(err),
		}
	}

	/// Builds the reply carried by an `ok`/`err` envelope; other kinds yield `None`.
	pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
		let payload = envelope.payload.clone().unwrap_or_else(|| Value::Object(Map::new()));
		match envelope.kind.as_str() {
			REPLY_OK => Some(Reply::Ok(payload)),
			REPLY_ERR => Some(Reply::Err(ErrorPayload::from_untrusted(&payload))),
			_ => None,
		}
	}
}

#[derive(Serialize)]
struct ReplyView<'a> {
	ok: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	payload: Option<&'a Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<&'a ErrorPayload>,
}

impl Serialize for Reply {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		ReplyView {
			ok: self.is_ok(),
			payload: self.payload(),
			error: self.error_payload(),
		}
		.serialize(serializer)
	}
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn request_serializes_wire_names() {
		let env = Envelope::request("ping", "r1", json!({}), Some("secret".into()));
		let value = env.to_value();
		assert_eq!(value["type"], "ping");
		assert_eq!(value["reqId"], "r1");
		assert_eq!(value["token"], "secret");
		assert!(value.get("v").is_none());
	}

	#[test]
	fn ready_has_null_req_id() {
		let value = Envelope::ready(json!({"href": "about:blank"})).to_value();
		assert_eq!(value["type"], BRIDGE_READY);
		assert!(value["reqId"].is_null());
		assert_eq!(value["v"], PROTOCOL_VERSION);
	}

	#[test]
	fn err_reply_carries_code_and_message() {
		let env = Envelope::err(Some("r9".into()), ErrorPayload::deny("capability_required:dom_write"));
		let reply = Reply::from_envelope(&env).unwrap();
		assert_eq!(reply.code(), Some(ErrorCode::Deny));
		assert_eq!(reply.error_payload().unwrap().message, "capability_required:dom_write");
	}

	#[test]
	fn from_value_rejects_bad_shapes() {
		assert_eq!(Envelope::from_value(json!("ok")), Err(EnvelopeError::NotAnObject));
		assert_eq!(Envelope::from_value(json!({"type": 3})), Err(EnvelopeError::MissingType));
		assert_eq!(Envelope::from_value(json!({"type": "ok", "reqId": 7})), Err(EnvelopeError::BadRequestId));
		assert_eq!(Envelope::from_value(json!({"type": "ok", "payload": [1]})), Err(EnvelopeError::BadPayload));
	}

	#[test]
	fn reply_serializes_ok_shape() {
		let ok = serde_json::to_value(Reply::Ok(json!({"pong": true}))).unwrap();
		assert_eq!(ok, json!({"ok": true, "payload": {"pong": true}}));

		let err = serde_json::to_value(Reply::error(ErrorCode::Timeout, "No response")).unwrap();
		assert_eq!(err, json!({"ok": false, "error": {"code": "TIMEOUT", "message": "No response"}}));
	}

	#[test]
	fn other_kinds_are_not_replies() {
		let env = Envelope::ready(json!({}));
		assert!(Reply::from_envelope(&env).is_none());
	}
}
