//! Error taxonomy carried by `err` replies.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clamp::{MAX_ERROR_MESSAGE, clamp_str};

/// Machine-readable error code.
///
/// The UI layer renders from these codes; messages are for humans only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Policy refusal: unknown operation, missing capability, denied attribute or style.
	Deny,
	BadUrl,
	BadMethod,
	BadBody,
	BadSelector,
	BadMode,
	BadAttr,
	BadStyle,
	BadScript,
	NoNode,
	NoScript,
	FetchFail,
	ScriptFail,
	/// Host-side: no reply within the deadline.
	Timeout,
	/// Host-side: no child surface to talk to.
	NoIframe,
	/// Host-side: the transport refused the message.
	PostFail,
	/// Host-side: no active session.
	NoSession,
	/// A bridge handler panicked.
	Internal,
	/// Code not recognized by this build.
	#[serde(other)]
	Unknown,
}

impl ErrorCode {
	pub fn as_str(self) -> &'static str {
		match self {
			ErrorCode::Deny => "DENY",
			ErrorCode::BadUrl => "BAD_URL",
			ErrorCode::BadMethod => "BAD_METHOD",
			ErrorCode::BadBody => "BAD_BODY",
			ErrorCode::BadSelector => "BAD_SELECTOR",
			ErrorCode::BadMode => "BAD_MODE",
			ErrorCode::BadAttr => "BAD_ATTR",
			ErrorCode::BadStyle => "BAD_STYLE",
			ErrorCode::BadScript => "BAD_SCRIPT",
			ErrorCode::NoNode => "NO_NODE",
			ErrorCode::NoScript => "NO_SCRIPT",
			ErrorCode::FetchFail => "FETCH_FAIL",
			ErrorCode::ScriptFail => "SCRIPT_FAIL",
			ErrorCode::Timeout => "TIMEOUT",
			ErrorCode::NoIframe => "NO_IFRAME",
			ErrorCode::PostFail => "POST_FAIL",
			ErrorCode::NoSession => "NO_SESSION",
			ErrorCode::Internal => "INTERNAL",
			ErrorCode::Unknown => "UNKNOWN",
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Body of an `err` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub code: ErrorCode,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub extra: Option<Value>,
}

impl ErrorPayload {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: clamp_str(&message.into(), MAX_ERROR_MESSAGE),
			extra: None,
		}
	}

	pub fn with_extra(mut self, extra: Value) -> Self {
		self.extra = Some(extra);
		self
	}

	/// Policy denial with a machine-readable reason such as `capability_required:dom_write`.
	pub fn deny(reason: impl Into<String>) -> Self {
		Self::new(ErrorCode::Deny, reason)
	}

	/// Reads an error payload sent by the other side without trusting its shape.
	pub fn from_untrusted(value: &Value) -> Self {
		let code = value
			.get("code")
			.cloned()
			.and_then(|c| serde_json::from_value(c).ok())
			.unwrap_or(ErrorCode::Unknown);
		let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
		let mut payload = Self::new(code, message);
		payload.extra = value.get("extra").filter(|e| !e.is_null()).cloned();
		payload
	}
}

impl fmt::Display for ErrorPayload {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.code, self.message)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn codes_serialize_screaming_snake() {
		assert_eq!(serde_json::to_value(ErrorCode::NoIframe).unwrap(), json!("NO_IFRAME"));
		assert_eq!(serde_json::to_value(ErrorCode::BadSelector).unwrap(), json!("BAD_SELECTOR"));
		for code in [ErrorCode::Deny, ErrorCode::FetchFail, ErrorCode::PostFail] {
			assert_eq!(serde_json::to_value(code).unwrap(), json!(code.as_str()));
		}
	}

	#[test]
	fn unknown_codes_deserialize_as_unknown() {
		let payload = ErrorPayload::from_untrusted(&json!({"code": "SOMETHING_NEW", "message": "hm"}));
		assert_eq!(payload.code, ErrorCode::Unknown);
		assert_eq!(payload.message, "hm");
	}

	#[test]
	fn untrusted_payload_tolerates_garbage() {
		let payload = ErrorPayload::from_untrusted(&json!(42));
		assert_eq!(payload.code, ErrorCode::Unknown);
		assert!(payload.message.is_empty());
		assert!(payload.extra.is_none());
	}

	#[test]
	fn message_is_clamped() {
		let payload = ErrorPayload::new(ErrorCode::FetchFail, "x".repeat(5000));
		assert_eq!(payload.message.chars().count(), MAX_ERROR_MESSAGE);
	}
}
