//! Host configuration.

use std::time::Duration;

use canvas_protocol::Capabilities;
use canvas_runtime::{DEFAULT_CALL_TIMEOUT, INIT_TIMEOUT};
use serde::{Deserialize, Serialize};

/// Origin the Host posts from when nothing else is configured.
pub const DEFAULT_HOST_ORIGIN: &str = "app://canvas-host";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
	pub host_origin: String,
	/// Grant for new sessions; also their ceiling.
	pub default_caps: Capabilities,
	/// Ask the bridge to accept messages from `host_origin` only. When off the
	/// bridge is initialized with `*` and the token is the only check.
	pub pin_origin: bool,
	/// How long `open` waits for the ready broadcast, and for the `init` reply.
	pub init_timeout_ms: u64,
	pub call_timeout_ms: u64,
}

impl Default for HostConfig {
	fn default() -> Self {
		Self {
			host_origin: DEFAULT_HOST_ORIGIN.to_string(),
			default_caps: Capabilities::session_default(),
			pin_origin: true,
			init_timeout_ms: INIT_TIMEOUT.as_millis() as u64,
			call_timeout_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
		}
	}
}

impl HostConfig {
	pub fn init_timeout(&self) -> Duration {
		canvas_runtime::clamp_timeout(Duration::from_millis(self.init_timeout_ms))
	}

	pub fn call_timeout(&self) -> Duration {
		canvas_runtime::clamp_timeout(Duration::from_millis(self.call_timeout_ms))
	}
}
