//! CLI configuration file and state locations.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use canvas::HostConfig;
use canvas_bridge::BridgeConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

/// `config.json`: Host settings plus the bridge settings handed to every
/// surface the CLI loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CanvasConfig {
	pub host: HostConfig,
	pub bridge: BridgeConfig,
}

impl CanvasConfig {
	/// Reads `path`; a missing file yields the defaults.
	pub fn load(path: &Path) -> Result<Self> {
		let content = match fs::read_to_string(path) {
			Ok(content) => content,
			Err(e) if e.kind() == ErrorKind::NotFound => {
				tracing::debug!(target = "canvas::cli", path = %path.display(), "no config file, using defaults");
				return Ok(Self::default());
			}
			Err(e) => {
				return Err(CliError::Config {
					path: path.to_path_buf(),
					message: e.to_string(),
				});
			}
		};
		serde_json::from_str(&content).map_err(|e| CliError::Config {
			path: path.to_path_buf(),
			message: e.to_string(),
		})
	}
}

/// Global paths under the XDG config home (`~/.config/canvas/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
	pub config: PathBuf,
	pub sessions: PathBuf,
}

impl StatePaths {
	pub fn new() -> Self {
		let config_home = std::env::var_os("XDG_CONFIG_HOME")
			.map(PathBuf::from)
			.or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
			.unwrap_or_else(|| PathBuf::from("."));
		Self::from_config_home(&config_home)
	}

	pub fn from_config_home(config_home: &Path) -> Self {
		let dir = config_home.join("canvas");
		Self {
			config: dir.join("config.json"),
			sessions: dir.join("sessions.json"),
		}
	}

	/// Applies `--config` and `--state` overrides.
	pub fn with_overrides(mut self, config: Option<PathBuf>, sessions: Option<PathBuf>) -> Self {
		if let Some(config) = config {
			self.config = config;
		}
		if let Some(sessions) = sessions {
			self.sessions = sessions;
		}
		self
	}
}

impl Default for StatePaths {
	fn default() -> Self {
		Self::new()
	}
}
