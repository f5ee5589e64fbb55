//! The Bridge Host: session lifecycle and capability-scoped calls.
//!
//! A [`BridgeHost`] owns one [`Surface`] and at most one live bridge
//! connection, bound to the active session. Every public operation either
//! reports through [`BridgeHost::status`] or returns a [`Reply`]; none of them
//! fail on bad input or a misbehaving bridge.

pub mod status;

use std::sync::Arc;
use std::time::Duration;

use canvas_protocol::clamp::clamp_str;
use canvas_protocol::{ANY_ORIGIN, CapabilityPatch, ErrorCode, Operation, Reply};
use canvas_runtime::{Connection, clamp_timeout};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::HostConfig;
use crate::session::{Session, SessionStore, SessionSummary};
use crate::store::StateStore;
use crate::surface::Surface;
use crate::url::normalize_url;

/// Options for [`BridgeHost::open`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
	/// Reopen this stored session instead of creating one.
	pub session_id: Option<String>,
}

impl OpenOptions {
	pub fn reuse(session_id: impl Into<String>) -> Self {
		Self {
			session_id: Some(session_id.into()),
		}
	}
}

/// Options for [`BridgeHost::call`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
	/// Reply deadline; the configured default when absent. Clamped.
	pub timeout: Option<Duration>,
}

impl CallOptions {
	pub fn timeout(timeout: Duration) -> Self {
		Self { timeout: Some(timeout) }
	}
}

/// The connection to a loaded bridge.
struct Link {
	session_id: String,
	conn: Arc<Connection>,
	reader: JoinHandle<()>,
}

impl Drop for Link {
	fn drop(&mut self) {
		self.reader.abort();
	}
}

impl Link {
	fn is_ready(&self) -> bool {
		self.conn.is_ready() && !self.conn.is_closed()
	}
}

pub struct BridgeHost {
	config: HostConfig,
	store: Arc<dyn StateStore>,
	surface: Arc<dyn Surface>,
	state: Mutex<SessionStore>,
	link: Mutex<Option<Arc<Link>>>,
	status: watch::Sender<String>,
}

impl std::fmt::Debug for BridgeHost {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BridgeHost")
			.field("config", &self.config)
			.field("active", &self.state.lock().last_active_id)
			.field("status", &*self.status.borrow())
			.finish_non_exhaustive()
	}
}

impl BridgeHost {
	/// Creates a Host over previously saved state.
	///
	/// Unreadable state is logged and replaced with an empty store.
	pub fn new(config: HostConfig, store: Arc<dyn StateStore>, surface: Arc<dyn Surface>) -> Self {
		let sessions = store.load().unwrap_or_else(|e| {
			tracing::warn!(target = "canvas::host", error = %e, "starting with empty session state");
			SessionStore::default()
		});
		let (status, _) = watch::channel(String::new());
		Self {
			config,
			store,
			surface,
			state: Mutex::new(sessions),
			link: Mutex::new(None),
			status,
		}
	}

	pub fn config(&self) -> &HostConfig {
		&self.config
	}

	pub fn surface(&self) -> &Arc<dyn Surface> {
		&self.surface
	}

	/// Latest status line.
	pub fn status(&self) -> String {
		self.status.borrow().clone()
	}

	/// Watches status changes.
	pub fn subscribe(&self) -> watch::Receiver<String> {
		self.status.subscribe()
	}

	pub fn active_session(&self) -> Option<Session> {
		self.state.lock().last_active().cloned()
	}

	/// Whether a bridge for the active session has announced readiness.
	pub fn is_ready(&self) -> bool {
		self.active_session()
			.is_some_and(|s| self.ready_link(&s.id).is_some())
	}

	pub fn list_sessions(&self) -> Vec<SessionSummary> {
		self.state.lock().summaries()
	}

	/// Opens `url` in the surface and initializes its bridge.
	///
	/// Returns the session id, or `None` (status `bad url`) if `url` does not
	/// normalize. Load, readiness and init failures are reported through
	/// status; the session exists either way.
	pub async fn open(&self, url: &str, options: OpenOptions) -> Option<String> {
		let Some(url) = normalize_url(url) else {
			self.set_status(status::BAD_URL);
			return None;
		};

		let session = {
			let mut state = self.state.lock();
			let reused = options
				.session_id
				.as_deref()
				.and_then(|id| state.get_mut(id))
				.map(|s| {
					s.url = url.clone();
					s.open = true;
					s.touch();
					s.clone()
				});
			match reused {
				Some(session) => {
					state.last_active_id = Some(session.id.clone());
					session
				}
				None => state
					.insert_active(Session::new(url, self.config.default_caps))
					.clone(),
			}
		};
		tracing::info!(target = "canvas::host", session = %session.id, url = %session.url, "opening canvas");

		self.surface.show();
		self.persist();
		self.load(&session).await;
		Some(session.id)
	}

	/// Hides the surface and marks the active session closed. Idempotent.
	pub fn close(&self) {
		self.surface.hide();
		self.with_active(|s| {
			s.open = false;
			s.touch();
		});
		self.persist();
		self.set_status(status::CLOSED);
	}

	/// Shows the active session again, loading it only if nothing is loaded
	/// for it. Returns `false` when there is no active session.
	pub async fn reopen(&self) -> bool {
		let Some(session) = self.with_active(|s| {
			s.open = true;
			s.touch();
			s.clone()
		}) else {
			return false;
		};

		self.surface.show();
		self.persist();
		self.set_status(status::OPEN);

		let loaded = self.link.lock().as_ref().is_some_and(|l| l.session_id == session.id);
		if !loaded {
			self.load(&session).await;
		}
		true
	}

	/// Closes when visible, reopens otherwise. Returns whether the surface is
	/// now visible.
	pub async fn toggle(&self) -> bool {
		if self.surface.is_visible() {
			self.close();
			false
		} else {
			self.reopen().await
		}
	}

	/// Points the active session (created if needed) at `url`.
	///
	/// A ready bridge is navigated in place; anything else reloads.
	pub async fn navigate(&self, url: &str) -> bool {
		let Some(url) = normalize_url(url) else {
			self.set_status(status::BAD_URL);
			return false;
		};

		let session = {
			let mut state = self.state.lock();
			if state.last_active().is_none() {
				state.insert_active(Session::new(url.clone(), self.config.default_caps));
			}
			state.last_active_mut().map(|s| {
				s.url = url.clone();
				s.open = true;
				s.touch();
				s.clone()
			})
		};
		let Some(session) = session else {
			return false;
		};

		self.persist();
		self.surface.show();

		if self.ready_link(&session.id).is_some() {
			match self.surface.navigate_in_place(&session.url) {
				Ok(()) => self.set_status(status::NAVIGATED),
				Err(e) => {
					tracing::debug!(target = "canvas::host", error = %e, "in-place navigation failed");
					self.set_status(status::NAV_FAILED);
				}
			}
		} else {
			self.load(&session).await;
		}
		true
	}

	/// Reopens the last active session if it was left open.
	pub async fn restore(&self) -> bool {
		let target = self
			.state
			.lock()
			.last_active()
			.filter(|s| s.open)
			.map(|s| (s.id.clone(), s.url.clone()));
		let Some((id, url)) = target else {
			return false;
		};
		tracing::info!(target = "canvas::host", session = %id, "restoring session");
		self.open(&url, OpenOptions::reuse(id)).await.is_some()
	}

	/// Applies `patch` to the active session within its ceiling, then
	/// re-initializes a ready bridge with the result.
	///
	/// Returns `false` when there is no active session.
	pub async fn set_capabilities(&self, patch: &CapabilityPatch) -> bool {
		let Some((session, refused)) = self.with_active(|s| {
			let refused = s.apply_caps(patch);
			(s.clone(), refused)
		}) else {
			return false;
		};
		self.persist();

		if let Some(link) = self.ready_link(&session.id) {
			let reply = self.send_init(&link, &session).await;
			if let Some(code) = reply.code() {
				tracing::warn!(target = "canvas::host", %code, "re-initialization failed");
				self.set_status(status::init_error(code));
				return true;
			}
		}

		match refused.first() {
			Some(cap) => {
				tracing::info!(target = "canvas::host", ?refused, "capabilities above session ceiling refused");
				self.set_status(status::capability_denied(*cap));
			}
			None => self.set_status(status::CAPABILITIES_UPDATED),
		}
		true
	}

	/// Sends `operation` to the active session's bridge. Never fails.
	pub async fn call(&self, operation: &str, payload: Value, options: CallOptions) -> Reply {
		let Some(session) = self.active_session() else {
			return Reply::error(ErrorCode::NoSession, "No active session");
		};
		let link = self.link.lock().clone().filter(|l| l.session_id == session.id);
		let Some(link) = link else {
			return Reply::error(ErrorCode::NoIframe, "Canvas surface is not loaded");
		};
		let timeout = options
			.timeout
			.map(clamp_timeout)
			.unwrap_or_else(|| self.config.call_timeout());
		link.conn.call(operation, payload, Some(&session.token), timeout).await
	}

	pub async fn storage_get(&self, key: &str) -> Reply {
		self.call(Operation::StorageGet.name(), json!({ "key": key }), CallOptions::default())
			.await
	}

	pub async fn storage_set(&self, key: &str, value: &str) -> Reply {
		self.call(
			Operation::StorageSet.name(),
			json!({ "key": key, "value": value }),
			CallOptions::default(),
		)
		.await
	}

	/// `net.fetch` with `url` merged into `options` (method, headers, body,
	/// timeoutMs).
	pub async fn fetch(&self, url: &str, options: Value) -> Reply {
		let mut payload = match options {
			Value::Object(map) => map,
			_ => Map::new(),
		};
		payload.insert("url".into(), Value::String(url.to_string()));
		self.call(Operation::NetFetch.name(), Value::Object(payload), CallOptions::default())
			.await
	}

	/// Drops the bridge connection and unloads the surface. Sessions are
	/// left as they are.
	pub async fn shutdown(&self) {
		self.link.lock().take();
		self.surface.unload().await;
	}

	/// Loads a bridge for `session`, waits for readiness and initializes it.
	async fn load(&self, session: &Session) {
		self.set_status(status::LOADING);
		self.link.lock().take();

		let parts = match self.surface.load(&session.url, &self.config.host_origin).await {
			Ok(parts) => parts,
			Err(e) => {
				tracing::warn!(target = "canvas::host", error = %e, "surface failed to load");
				self.set_status(status::init_error(ErrorCode::NoIframe));
				return;
			}
		};

		let conn = Arc::new(Connection::new(parts).with_bridge_origin(self.surface.bridge_origin()));
		let runner = Arc::clone(&conn);
		let reader = tokio::spawn(async move { runner.run().await });
		let link = Arc::new(Link {
			session_id: session.id.clone(),
			conn,
			reader,
		});
		*self.link.lock() = Some(Arc::clone(&link));

		let Some(ready) = link.conn.wait_ready(self.config.init_timeout()).await else {
			tracing::warn!(target = "canvas::host", session = %session.id, "bridge never announced readiness");
			self.set_status(status::init_error(ErrorCode::Timeout));
			return;
		};
		let href = ready.get("href").and_then(Value::as_str).unwrap_or_default();
		self.set_status(status::bridge_ready(href));

		// Capabilities may have changed while loading.
		let Some(current) = self.state.lock().get(&session.id).cloned() else {
			return;
		};
		let reply = self.send_init(&link, &current).await;
		match reply.code() {
			None => self.set_status(status::ACTIVE),
			Some(code) => self.set_status(status::init_error(code)),
		}
	}

	async fn send_init(&self, link: &Link, session: &Session) -> Reply {
		let parent_origin = if self.config.pin_origin {
			self.config.host_origin.as_str()
		} else {
			ANY_ORIGIN
		};
		let payload = json!({
			"parentOrigin": parent_origin,
			"token": session.token,
			"caps": session.caps,
		});
		link.conn
			.call(
				Operation::Init.name(),
				payload,
				Some(&session.token),
				self.config.init_timeout(),
			)
			.await
	}

	fn ready_link(&self, session_id: &str) -> Option<Arc<Link>> {
		self.link
			.lock()
			.clone()
			.filter(|l| l.session_id == session_id && l.is_ready())
	}

	fn with_active<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
		self.state.lock().last_active_mut().map(f)
	}

	fn persist(&self) {
		let snapshot = self.state.lock().clone();
		if let Err(e) = self.store.save(&snapshot) {
			tracing::warn!(target = "canvas::host", error = %e, "failed to persist session state");
		}
	}

	fn set_status(&self, text: impl AsRef<str>) {
		let text = clamp_str(text.as_ref(), status::MAX_STATUS);
		tracing::info!(target = "canvas::host", status = %text);
		self.status.send_replace(text);
	}
}

#[cfg(test)]
mod tests;
