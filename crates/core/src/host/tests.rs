use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canvas_bridge::Document;
use canvas_protocol::{Capability, CapabilityPatch, OPAQUE_ORIGIN};
use canvas_runtime::{TransportParts, channel_pair};
use serde_json::json;

use super::*;
use crate::store::MemoryStateStore;
use crate::surface::{InProcessSurface, ProcessSurface};

fn host_over(store: Arc<MemoryStateStore>) -> (BridgeHost, Arc<InProcessSurface>) {
	let surface = Arc::new(InProcessSurface::default());
	let host = BridgeHost::new(HostConfig::default(), store, surface.clone());
	(host, surface)
}

fn host() -> (BridgeHost, Arc<InProcessSurface>) {
	host_over(Arc::new(MemoryStateStore::default()))
}

fn deny_message(reply: &Reply) -> Option<&str> {
	reply
		.error_payload()
		.filter(|e| e.code == ErrorCode::Deny)
		.map(|e| e.message.as_str())
}

/// Loads a channel whose bridge end never answers.
#[derive(Default)]
struct SilentSurface {
	held: Mutex<Option<TransportParts>>,
}

#[async_trait]
impl Surface for SilentSurface {
	async fn load(&self, _url: &str, host_origin: &str) -> crate::Result<TransportParts> {
		let (host, child) = channel_pair(host_origin, OPAQUE_ORIGIN);
		*self.held.lock() = Some(child);
		Ok(host)
	}

	async fn unload(&self) {
		self.held.lock().take();
	}

	fn show(&self) {}
	fn hide(&self) {}

	fn is_visible(&self) -> bool {
		true
	}

	fn navigate_in_place(&self, _url: &str) -> crate::Result<()> {
		Ok(())
	}
}

#[tokio::test]
async fn open_bare_host_ends_active_with_default_grant() {
	let (host, surface) = host();
	let id = host.open("example.com", OpenOptions::default()).await.expect("session id");

	assert_eq!(host.status(), status::ACTIVE);
	assert!(host.is_ready());
	assert!(surface.is_visible());

	let session = host.active_session().expect("active session");
	assert_eq!(session.id, id);
	assert_eq!(session.url, "https://example.com/");
	assert!(session.open);

	let caps = host.call("capabilities", json!({}), CallOptions::default()).await.into_result().unwrap();
	assert_eq!(caps["caps"]["net_fetch"], true);
	assert_eq!(caps["caps"]["storage"], true);
	assert_eq!(caps["caps"]["dom_read"], false);
	assert_eq!(caps["caps"]["script_run"], false);

	let dom = host.call("dom.query", json!({ "selector": "h1" }), CallOptions::default()).await;
	assert_eq!(deny_message(&dom), Some("capability_required:dom_read"));
	let script = host
		.call("script.run", json!({ "id": "canvas.echo" }), CallOptions::default())
		.await;
	assert_eq!(deny_message(&script), Some("capability_required:script_run"));

	assert!(host.storage_set("k", "v").await.is_ok());
	assert_eq!(host.storage_get("k").await.into_result().unwrap()["value"], "v");
}

#[tokio::test]
async fn bad_url_reports_status_and_creates_nothing() {
	let (host, _) = host();
	assert_eq!(host.open("", OpenOptions::default()).await, None);
	assert_eq!(host.status(), status::BAD_URL);
	assert_eq!(host.open("ftp://example.com", OpenOptions::default()).await, None);
	assert!(!host.navigate("   ").await);
	assert!(host.list_sessions().is_empty());
}

#[tokio::test]
async fn close_is_idempotent_and_persisted() {
	let store = Arc::new(MemoryStateStore::default());
	let (host, surface) = host_over(store.clone());
	let id = host.open("https://example.com", OpenOptions::default()).await.unwrap();

	host.close();
	host.close();
	assert_eq!(host.status(), status::CLOSED);
	assert!(!surface.is_visible());

	let saved = store.snapshot();
	assert!(!saved.get(&id).unwrap().open);
	assert_eq!(saved.last_active_id.as_deref(), Some(id.as_str()));
	assert_eq!(saved.sessions.len(), 1);
}

#[tokio::test]
async fn close_without_session_is_harmless() {
	let (host, _) = host();
	host.close();
	assert_eq!(host.status(), status::CLOSED);
	assert!(host.list_sessions().is_empty());
}

#[tokio::test]
async fn open_then_restore_round_trip() {
	let store = Arc::new(MemoryStateStore::default());
	let (first, _) = host_over(store.clone());
	let id = first.open("example.com/app", OpenOptions::default()).await.unwrap();
	let original = first.active_session().unwrap();
	first.shutdown().await;

	let (second, _) = host_over(store.clone());
	assert!(second.restore().await);
	assert_eq!(second.status(), status::ACTIVE);
	let restored = second.active_session().unwrap();
	assert_eq!(restored.id, id);
	assert_eq!(restored.url, original.url);
	assert_eq!(restored.caps, original.caps);
	assert_eq!(restored.token, original.token);
	assert_eq!(second.list_sessions().len(), 1);
}

#[tokio::test]
async fn restore_skips_closed_sessions() {
	let store = Arc::new(MemoryStateStore::default());
	let (first, _) = host_over(store.clone());
	first.open("example.com", OpenOptions::default()).await.unwrap();
	first.close();

	let (second, surface) = host_over(store);
	assert!(!second.restore().await);
	assert!(!surface.is_loaded());
}

#[tokio::test]
async fn reopen_shows_without_reload() {
	let (host, surface) = host();
	assert!(!host.reopen().await);

	host.open("example.com", OpenOptions::default()).await.unwrap();
	host.storage_set("kept", "1").await;
	let document = surface.document().unwrap();

	host.close();
	assert!(host.reopen().await);
	assert_eq!(host.status(), status::OPEN);
	assert!(surface.is_visible());
	assert!(Arc::ptr_eq(&document, &surface.document().unwrap()));
	assert!(host.active_session().unwrap().open);
}

#[tokio::test]
async fn toggle_flips_visibility() {
	let (host, surface) = host();
	host.open("example.com", OpenOptions::default()).await.unwrap();
	assert!(!host.toggle().await);
	assert!(!surface.is_visible());
	assert!(host.toggle().await);
	assert!(surface.is_visible());
}

#[tokio::test]
async fn navigate_in_place_when_ready() {
	let (host, surface) = host();
	let id = host.open("example.com", OpenOptions::default()).await.unwrap();

	assert!(host.navigate("other.example/page").await);
	assert_eq!(host.status(), status::NAVIGATED);
	let session = host.active_session().unwrap();
	assert_eq!(session.id, id);
	assert_eq!(session.url, "https://other.example/page");

	let href = surface.document().unwrap().lock().href();
	assert_eq!(href, "https://other.example/page");
	let pong = host.call("ping", json!({}), CallOptions::default()).await.into_result().unwrap();
	assert_eq!(pong["href"], "https://other.example/page");
}

#[tokio::test]
async fn navigate_without_session_creates_and_loads() {
	let (host, surface) = host();
	assert!(host.navigate("example.com").await);
	assert_eq!(host.status(), status::ACTIVE);
	assert_eq!(host.list_sessions().len(), 1);
	assert!(surface.is_loaded());
}

#[tokio::test]
async fn navigate_on_process_surface_reports_failure() {
	struct NoNavSurface(InProcessSurface);

	#[async_trait]
	impl Surface for NoNavSurface {
		async fn load(&self, url: &str, host_origin: &str) -> crate::Result<TransportParts> {
			self.0.load(url, host_origin).await
		}
		async fn unload(&self) {
			self.0.unload().await;
		}
		fn show(&self) {
			self.0.show();
		}
		fn hide(&self) {
			self.0.hide();
		}
		fn is_visible(&self) -> bool {
			self.0.is_visible()
		}
		fn navigate_in_place(&self, _url: &str) -> crate::Result<()> {
			Err(crate::Error::NavigationUnsupported)
		}
	}

	let surface = Arc::new(NoNavSurface(InProcessSurface::default()));
	let host = BridgeHost::new(HostConfig::default(), Arc::new(MemoryStateStore::default()), surface);
	host.open("example.com", OpenOptions::default()).await.unwrap();
	assert!(host.navigate("other.example").await);
	assert_eq!(host.status(), status::NAV_FAILED);
	// The new URL is kept for the next load.
	assert_eq!(host.active_session().unwrap().url, "https://other.example/");
}

#[tokio::test]
async fn capabilities_only_narrow() {
	let (host, _) = host();
	assert!(!host.set_capabilities(&CapabilityPatch::default()).await);
	host.open("example.com", OpenOptions::default()).await.unwrap();

	let widen = CapabilityPatch::default().with(Capability::DomWrite, true);
	assert!(host.set_capabilities(&widen).await);
	assert_eq!(host.status(), "capability denied: dom_write");
	assert!(!host.active_session().unwrap().caps.dom_write);

	let narrow = CapabilityPatch::default().with(Capability::NetFetch, false);
	assert!(host.set_capabilities(&narrow).await);
	assert_eq!(host.status(), status::CAPABILITIES_UPDATED);

	let fetch = host.fetch("https://example.com/", json!({})).await;
	assert_eq!(deny_message(&fetch), Some("capability_required:net_fetch"));

	// The bridge was re-initialized with the narrowed grant.
	let caps = host.call("capabilities", json!({}), CallOptions::default()).await.into_result().unwrap();
	assert_eq!(caps["caps"]["net_fetch"], false);
	assert_eq!(caps["caps"]["dom_write"], false);
}

#[tokio::test]
async fn call_without_session_or_surface() {
	let store = Arc::new(MemoryStateStore::default());
	let (host, _) = host_over(store.clone());
	let reply = host.call("ping", json!({}), CallOptions::default()).await;
	assert_eq!(reply.code(), Some(ErrorCode::NoSession));

	host.open("example.com", OpenOptions::default()).await.unwrap();
	host.shutdown().await;

	// A fresh Host knows the session but has loaded nothing.
	let (fresh, _) = host_over(store);
	let reply = fresh.call("ping", json!({}), CallOptions::default()).await;
	assert_eq!(reply.code(), Some(ErrorCode::NoIframe));
}

#[tokio::test]
async fn unloadable_surface_reports_no_iframe() {
	let surface = Arc::new(ProcessSurface::new("/nonexistent/canvas-bridge"));
	let host = BridgeHost::new(HostConfig::default(), Arc::new(MemoryStateStore::default()), surface);
	let id = host.open("example.com", OpenOptions::default()).await;
	assert!(id.is_some());
	assert_eq!(host.status(), "canvas init error: NO_IFRAME");
	assert_eq!(
		host.call("ping", json!({}), CallOptions::default()).await.code(),
		Some(ErrorCode::NoIframe)
	);
}

#[tokio::test(start_paused = true)]
async fn silent_bridge_times_out() {
	let surface = Arc::new(SilentSurface::default());
	let host = BridgeHost::new(HostConfig::default(), Arc::new(MemoryStateStore::default()), surface);
	let mut statuses = host.subscribe();

	host.open("example.com", OpenOptions::default()).await.unwrap();
	assert_eq!(host.status(), "canvas init error: TIMEOUT");
	assert!(statuses.has_changed().unwrap());
	assert!(!host.is_ready());

	let reply = host
		.call("ping", json!({}), CallOptions::timeout(Duration::from_millis(750)))
		.await;
	assert_eq!(reply.code(), Some(ErrorCode::Timeout));
}

#[tokio::test]
async fn status_changes_are_broadcast() {
	let (host, _) = host();
	let mut statuses = host.subscribe();
	host.open("example.com", OpenOptions::default()).await.unwrap();
	statuses.changed().await.unwrap();
	assert_eq!(&*statuses.borrow_and_update(), status::ACTIVE);
}
