use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use canvas_bridge::{BridgeConfig, Document, MemoryDocument, MemoryStore, SandboxBridge, ScriptRegistry};
use canvas_protocol::OPAQUE_ORIGIN;
use canvas_runtime::{TransportParts, channel_pair};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::Surface;
use crate::error::{Error, Result};

struct Loaded {
	document: Arc<Mutex<MemoryDocument>>,
	task: JoinHandle<()>,
}

impl Drop for Loaded {
	fn drop(&mut self) {
		self.task.abort();
	}
}

/// Runs the bridge as a task in this process over an in-memory channel.
///
/// Content is a [`MemoryDocument`] placeholder for the target URL. Storage
/// survives reloads, like a browser's local storage does.
pub struct InProcessSurface {
	config: BridgeConfig,
	scripts: ScriptRegistry,
	storage: Arc<MemoryStore>,
	loaded: Mutex<Option<Loaded>>,
	visible: AtomicBool,
}

impl std::fmt::Debug for InProcessSurface {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InProcessSurface")
			.field("config", &self.config)
			.field("loaded", &self.loaded.lock().is_some())
			.field("visible", &self.is_visible())
			.finish()
	}
}

impl Default for InProcessSurface {
	fn default() -> Self {
		Self::new(BridgeConfig::default())
	}
}

impl InProcessSurface {
	pub fn new(config: BridgeConfig) -> Self {
		Self {
			config,
			scripts: ScriptRegistry::default(),
			storage: Arc::new(MemoryStore::new()),
			loaded: Mutex::new(None),
			visible: AtomicBool::new(false),
		}
	}

	/// Scripts every loaded bridge registers.
	pub fn with_scripts(mut self, scripts: ScriptRegistry) -> Self {
		self.scripts = scripts;
		self
	}

	/// Document of the loaded bridge.
	pub fn document(&self) -> Option<Arc<Mutex<MemoryDocument>>> {
		self.loaded.lock().as_ref().map(|l| Arc::clone(&l.document))
	}

	pub fn is_loaded(&self) -> bool {
		self.loaded.lock().is_some()
	}
}

#[async_trait]
impl Surface for InProcessSurface {
	async fn load(&self, url: &str, host_origin: &str) -> Result<TransportParts> {
		let document = Arc::new(Mutex::new(MemoryDocument::for_url(url)));
		let bridge = SandboxBridge::builder()
			.config(self.config.clone())
			.document(document.clone())
			.storage(self.storage.clone())
			.scripts(self.scripts.clone())
			.build();

		let (host, child) = channel_pair(host_origin, OPAQUE_ORIGIN);
		let task = tokio::spawn(Arc::new(bridge).serve(child));
		tracing::debug!(target = "canvas::surface", %url, "in-process bridge loaded");

		*self.loaded.lock() = Some(Loaded { document, task });
		Ok(host)
	}

	async fn unload(&self) {
		self.loaded.lock().take();
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

	fn navigate_in_place(&self, url: &str) -> Result<()> {
		let loaded = self.loaded.lock();
		let loaded = loaded.as_ref().ok_or(Error::NotLoaded)?;
		loaded.document.lock().navigate(url);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[tokio::test]
	async fn load_serves_a_bridge_on_the_url() {
		let surface = InProcessSurface::default();
		assert!(!surface.is_loaded());
		let mut parts = surface.load("https://example.com/", "app://test").await.unwrap();

		let ready = parts.inbox.recv().await.unwrap();
		assert_eq!(ready.origin, OPAQUE_ORIGIN);
		assert_eq!(ready.data["payload"]["href"], "https://example.com/");

		surface.navigate_in_place("https://other.example/").unwrap();
		assert_eq!(surface.document().unwrap().lock().href(), "https://other.example/");

		parts.sender.post(json!({ "type": "ping", "reqId": "p" }), "*").unwrap();
		let pong = parts.inbox.recv().await.unwrap();
		assert_eq!(pong.data["payload"]["href"], "https://other.example/");
	}

	#[tokio::test]
	async fn unload_stops_the_bridge() {
		let surface = InProcessSurface::default();
		let mut parts = surface.load("https://example.com/", "app://test").await.unwrap();
		parts.inbox.recv().await.unwrap();

		surface.unload().await;
		assert!(parts.inbox.recv().await.is_none());
		assert!(matches!(surface.navigate_in_place("https://x.example/"), Err(Error::NotLoaded)));
	}

	#[test]
	fn visibility_toggles() {
		let surface = InProcessSurface::default();
		assert!(!surface.is_visible());
		surface.show();
		assert!(surface.is_visible());
		surface.hide();
		assert!(!surface.is_visible());
	}
}
