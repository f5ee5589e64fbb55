//! Per-bridge configuration and fixed size limits.

use std::path::Path;
use std::time::Duration;

use canvas_protocol::Capabilities;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest selector accepted, after trimming.
pub const MAX_SELECTOR: usize = 512;
/// Most nodes returned by `dom.query` with `all: true`.
pub const MAX_QUERY_NODES: usize = 100;
/// Text, markup, and value strings read from or written to the document.
pub const MAX_DOM_TEXT: usize = 200_000;
pub const MAX_ATTR_NAME: usize = 128;
pub const MAX_ATTR_VALUE: usize = 2_000;
pub const MAX_CLASS_INPUT: usize = 256;
pub const MAX_CLASS_TOKENS: usize = 8;
/// Class attribute as reported in a node snapshot.
pub const MAX_SNAPSHOT_CLASS: usize = 512;
pub const MAX_STYLE_NAME: usize = 128;
pub const MAX_STYLE_VALUE: usize = 512;
pub const MAX_STORAGE_KEY: usize = 256;
pub const MAX_STORAGE_VALUE: usize = 200_000;
pub const MAX_FETCH_URL: usize = 4_096;
pub const MAX_HEADER_VALUE: usize = 1_024;
pub const MAX_FETCH_BODY: usize = 500_000;
pub const MAX_FETCH_TEXT: usize = 600_000;
pub const MAX_SCRIPT_ID: usize = 128;
/// Accepted `parentOrigin` and `token` lengths in `init`.
pub const MAX_INIT_FIELD: usize = 256;

pub const MIN_FETCH_TIMEOUT_MS: u64 = 1_000;
pub const MAX_FETCH_TIMEOUT_MS: u64 = 60_000;

/// Sliding-window rate limit applied before any other validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimit {
	pub window_ms: u64,
	pub max: usize,
	pub cooldown_ms: u64,
}

impl Default for RateLimit {
	fn default() -> Self {
		Self {
			window_ms: 1_000,
			max: 120,
			cooldown_ms: 1_500,
		}
	}
}

impl RateLimit {
	pub fn window(&self) -> Duration {
		Duration::from_millis(self.window_ms)
	}

	pub fn cooldown(&self) -> Duration {
		Duration::from_millis(self.cooldown_ms)
	}
}

/// Configuration for one [`SandboxBridge`](crate::SandboxBridge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
	/// Grant in effect before `init`.
	pub initial_caps: Capabilities,
	/// Upper bound on anything `init` can grant.
	pub ceiling: Capabilities,
	pub rate: RateLimit,
	/// Answer unknown operation types with `DENY unknown_operation` instead of
	/// dropping them.
	pub reply_unknown_operations: bool,
	pub default_fetch_timeout_ms: u64,
	/// Strip dynamic-code and high-risk globals on load.
	pub harden: bool,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			initial_caps: Capabilities::baseline(),
			ceiling: Capabilities::all(),
			rate: RateLimit::default(),
			reply_unknown_operations: true,
			default_fetch_timeout_ms: 12_000,
			harden: true,
		}
	}
}

impl BridgeConfig {
	/// Reads a JSON config file. Missing fields take their defaults.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
			path: path.to_path_buf(),
			source,
		})?;
		serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
			path: path.to_path_buf(),
			source,
		})
	}

	/// Fetch timeout for a request that asked for `requested_ms` (0 = default).
	pub fn fetch_timeout(&self, requested_ms: i64) -> Duration {
		// Negative requests clamp to the floor rather than the default.
		let ms = match requested_ms {
			0 => self.default_fetch_timeout_ms,
			ms => u64::try_from(ms).unwrap_or(0),
		};
		Duration::from_millis(ms.clamp(MIN_FETCH_TIMEOUT_MS, MAX_FETCH_TIMEOUT_MS))
	}
}
