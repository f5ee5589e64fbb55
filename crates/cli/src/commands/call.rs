use std::time::Duration;

use canvas::{BridgeHost, CallOptions, Capability, CapabilityPatch};
use serde_json::{Value, json};

use super::{check_init, emit};
use crate::error::{CliError, Result};
use crate::output::{CallData, CapsData, OutputFormat};

/// Restores the last open session, then sends one operation to it.
pub async fn call(
	host: &BridgeHost,
	operation: String,
	input: &str,
	timeout_ms: Option<u64>,
	format: OutputFormat,
) -> Result<()> {
	let payload: Value = serde_json::from_str(input)?;
	if !payload.is_object() {
		return Err(CliError::InvalidInput("--input must be a JSON object".into()));
	}

	if !host.restore().await {
		return Err(CliError::NoSession);
	}
	check_init(host)?;

	let options = timeout_ms
		.map(|ms| CallOptions::timeout(Duration::from_millis(ms)))
		.unwrap_or_default();
	let inputs = json!({ "operation": operation, "input": payload, "timeoutMs": timeout_ms });
	match host.call(&operation, payload, options).await.into_result() {
		Ok(result) => {
			emit("call", inputs, CallData { operation, result }, host, format);
			Ok(())
		}
		Err(error) => Err(CliError::Bridge { operation, error }),
	}
}

/// Shows the active session's grant, applying `assignments` first.
pub async fn caps(host: &BridgeHost, assignments: &[(Capability, bool)], format: OutputFormat) -> Result<()> {
	if !assignments.is_empty() {
		let patch = assignments
			.iter()
			.fold(CapabilityPatch::default(), |patch, (cap, granted)| patch.with(*cap, *granted));
		if !host.set_capabilities(&patch).await {
			return Err(CliError::NoSession);
		}
	}

	let session = host.active_session().ok_or(CliError::NoSession)?;
	let inputs: serde_json::Map<String, Value> = assignments
		.iter()
		.map(|(cap, granted)| (cap.as_str().to_string(), Value::Bool(*granted)))
		.collect();
	let data = CapsData {
		session_id: session.id.clone(),
		caps: session.caps,
		ceiling: session.ceiling(),
	};
	emit("caps", Value::Object(inputs), data, host, format);
	Ok(())
}
