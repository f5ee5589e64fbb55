//! Structured output envelope for all `canvas` commands.
//!
//! Every command writes one result envelope to stdout:
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "ok": true,
//!   "command": "open",
//!   "data": { ... },
//!   "status": "canvas active",
//!   "timings": { "durationMs": 412 }
//! }
//! ```
//!
//! On failure `data` is replaced by `error`:
//!
//! ```json
//! {
//!   "ok": false,
//!   "command": "call",
//!   "error": {
//!     "code": "BRIDGE_ERROR",
//!     "message": "dom.query failed: DENY: capability_required:dom_read",
//!     "details": { "code": "DENY", "message": "capability_required:dom_read" }
//!   }
//! }
//! ```


use std::io::{self, Write};
use std::time::{Duration, Instant};

use canvas::{Capabilities, SessionSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bumped on breaking changes to the envelope.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Pretty-printed JSON (default)
	#[default]
	Json,
	/// One JSON object per line
	Ndjson,
	/// Human-readable text
	Text,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schema_version: Option<u32>,

	pub ok: bool,

	/// Subcommand name (`open`, `call`, ...)
	pub command: String,

	/// Inputs used for this command, for traceability
	#[serde(skip_serializing_if = "Option::is_none")]
	pub inputs: Option<Value>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,

	/// Host status line after the command ran
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub timings: Option<Timings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

/// Error codes for the CLI envelope.
///
/// Bridge replies keep their own protocol code under `details.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Arguments or inline JSON could not be used
	InvalidInput,
	/// URL did not normalize to http, https or about
	BadUrl,
	/// No session to act on
	NoSession,
	/// The surface failed to load, signal ready, or accept `init`
	InitFailed,
	/// The bridge answered with an `err` reply
	BridgeError,
	/// Config file unreadable or malformed
	ConfigError,
	IoError,
	InternalError,
}

impl ErrorCode {
	/// Same spelling as the serialized form.
	pub fn as_str(self) -> &'static str {
		match self {
			ErrorCode::InvalidInput => "INVALID_INPUT",
			ErrorCode::BadUrl => "BAD_URL",
			ErrorCode::NoSession => "NO_SESSION",
			ErrorCode::InitFailed => "INIT_FAILED",
			ErrorCode::BridgeError => "BRIDGE_ERROR",
			ErrorCode::ConfigError => "CONFIG_ERROR",
			ErrorCode::IoError => "IO_ERROR",
			ErrorCode::InternalError => "INTERNAL_ERROR",
		}
	}
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
	pub duration_ms: u64,
}

impl From<Duration> for Timings {
	fn from(duration: Duration) -> Self {
		Timings {
			duration_ms: duration.as_millis() as u64,
		}
	}
}

pub struct ResultBuilder<T: Serialize> {
	schema_version: Option<u32>,
	command: String,
	inputs: Option<Value>,
	data: Option<T>,
	error: Option<CommandError>,
	status: Option<String>,
	start_time: Instant,
}

impl<T: Serialize> ResultBuilder<T> {
	/// Starts timing `command`; the schema version defaults to [`SCHEMA_VERSION`].
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			schema_version: Some(SCHEMA_VERSION),
			command: command.into(),
			inputs: None,
			data: None,
			error: None,
			status: None,
			start_time: Instant::now(),
		}
	}

	pub fn inputs(mut self, inputs: Value) -> Self {
		self.inputs = Some(inputs);
		self
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn status(mut self, status: impl Into<String>) -> Self {
		self.status = Some(status.into());
		self
	}

	pub fn error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
		self.error = Some(CommandError {
			code,
			message: message.into(),
			details: None,
		});
		self
	}

	pub fn command_error(mut self, error: CommandError) -> Self {
		self.error = Some(error);
		self
	}

	pub fn build(self) -> CommandResult<T> {
		let ok = self.error.is_none() && self.data.is_some();
		CommandResult {
			schema_version: self.schema_version,
			ok,
			command: self.command,
			inputs: self.inputs,
			data: self.data,
			error: self.error,
			status: self.status,
			timings: Some(Timings::from(self.start_time.elapsed())),
		}
	}
}

pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	let rendered = match format {
		OutputFormat::Json => serde_json::to_string_pretty(result),
		OutputFormat::Ndjson => serde_json::to_string(result),
		OutputFormat::Text => return print_result_text(result),
	};
	match rendered {
		Ok(line) => println!("{line}"),
		Err(e) => tracing::error!(target = "canvas::cli", error = %e, "unserializable result"),
	}
}

/// Status line first, then the payload or the error.
fn print_result_text<T: Serialize>(result: &CommandResult<T>) {
	let mut out = io::stdout().lock();
	if let Some(status) = &result.status {
		let _ = writeln!(out, "{status}");
	}
	let body = match (&result.data, &result.error) {
		(Some(data), None) => serde_json::to_string_pretty(data).ok(),
		(_, Some(error)) => Some(match &error.details {
			Some(details) => format!("{}: {}\n{details:#}", error.code, error.message),
			None => format!("{}: {}", error.code, error.message),
		}),
		(None, None) => None,
	};
	if let Some(body) = body {
		let _ = writeln!(out, "{body}");
	}
}

pub fn print_error_stderr(error: &CommandError) {
	eprintln!("error[{}]: {}", error.code, error.message);
}

/// Where a session stands after a lifecycle command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	pub open: bool,
	pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsData {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub active_id: Option<String>,
	pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallData {
	pub operation: String,
	pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsData {
	pub session_id: String,
	pub caps: Capabilities,
	pub ceiling: Capabilities,
}
