//! Console passthrough.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
	Log,
	Warn,
	Error,
}

/// Where `console.*` operations end up.
pub trait ConsoleSink: Send + Sync {
	fn emit(&self, level: ConsoleLevel, payload: &Value);
}

/// Emits console payloads as `tracing` events under `canvas::console`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsole;

impl ConsoleSink for TracingConsole {
	fn emit(&self, level: ConsoleLevel, payload: &Value) {
		match level {
			ConsoleLevel::Log => tracing::info!(target: "canvas::console", %payload),
			ConsoleLevel::Warn => tracing::warn!(target: "canvas::console", %payload),
			ConsoleLevel::Error => tracing::error!(target: "canvas::console", %payload),
		}
	}
}

/// Keeps every payload in memory. Used by tests and embedders that want to
/// show the canvas console themselves.
#[derive(Debug, Default)]
pub struct RecordingConsole {
	entries: Mutex<Vec<(ConsoleLevel, Value)>>,
}

impl RecordingConsole {
	pub fn entries(&self) -> Vec<(ConsoleLevel, Value)> {
		self.entries.lock().clone()
	}
}

impl ConsoleSink for RecordingConsole {
	fn emit(&self, level: ConsoleLevel, payload: &Value) {
		self.entries.lock().push((level, payload.clone()));
	}
}
