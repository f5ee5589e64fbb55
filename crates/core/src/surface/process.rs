use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use canvas_runtime::{BridgeProcess, TransportParts, get_bridge_executable};
use parking_lot::Mutex;

use super::Surface;
use crate::error::{Error, Result};

/// Runs `canvas-bridge` as a child process and talks to it over stdio.
///
/// The child cannot be pointed at a new URL while running; navigation
/// always reloads.
#[derive(Debug)]
pub struct ProcessSurface {
	executable: PathBuf,
	extra_args: Vec<String>,
	process: Mutex<Option<BridgeProcess>>,
	visible: AtomicBool,
}

impl ProcessSurface {
	pub fn new(executable: impl Into<PathBuf>) -> Self {
		Self {
			executable: executable.into(),
			extra_args: Vec::new(),
			process: Mutex::new(None),
			visible: AtomicBool::new(false),
		}
	}

	/// Locates the bridge binary (explicit path, `CANVAS_BRIDGE_BIN`, next to
	/// this executable, then `PATH`).
	pub fn discover(explicit: Option<&Path>) -> Result<Self> {
		Ok(Self::new(get_bridge_executable(explicit)?))
	}

	/// Extra arguments passed to every launch, e.g. `--config`.
	pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
		self.extra_args.extend(args);
		self
	}

	pub fn executable(&self) -> &Path {
		&self.executable
	}

	async fn stop(&self) {
		let previous = self.process.lock().take();
		if let Some(process) = previous {
			if let Err(e) = process.shutdown().await {
				tracing::debug!(target = "canvas::surface", error = %e, "bridge process shutdown");
			}
		}
	}
}

#[async_trait]
impl Surface for ProcessSurface {
	async fn load(&self, url: &str, host_origin: &str) -> Result<TransportParts> {
		self.stop().await;
		let mut args = vec!["--href".to_string(), url.to_string()];
		args.extend(self.extra_args.iter().cloned());
		let (process, parts) = BridgeProcess::launch(&self.executable, host_origin, &args)?;
		tracing::debug!(target = "canvas::surface", %url, pid = ?process.process.id(), "bridge process loaded");
		*self.process.lock() = Some(process);
		Ok(parts)
	}

	async fn unload(&self) {
		self.stop().await;
	}

	fn show(&self) {
		self.visible.store(true, Ordering::SeqCst);
	}

	fn hide(&self) {
		self.visible.store(false, Ordering::SeqCst);
	}

	fn is_visible(&self) -> bool {
		self.visible.load(Ordering::SeqCst)
	}

	fn navigate_in_place(&self, _url: &str) -> Result<()> {
		Err(Error::NavigationUnsupported)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn missing_binary_fails_to_load() {
		let surface = ProcessSurface::new("/nonexistent/canvas-bridge");
		let err = surface.load("https://example.com/", "app://test").await.unwrap_err();
		assert!(matches!(err, Error::Runtime(canvas_runtime::Error::LaunchFailed(_))));
	}

	#[test]
	fn navigation_requires_reload() {
		let surface = ProcessSurface::new("canvas-bridge");
		assert!(matches!(
			surface.navigate_in_place("https://example.com/"),
			Err(Error::NavigationUnsupported)
		));
	}
}
