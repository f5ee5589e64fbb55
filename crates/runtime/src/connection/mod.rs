//! Host-side request correlation over a bridge transport.
//!
//! Every call gets a fresh id and a oneshot slot in the pending table. The
//! reader loop resolves slots as replies arrive; the per-call timer resolves
//! them otherwise. Whichever side removes the slot first decides the outcome,
//! so a reply that shows up after its timeout is ignored and a timeout that
//! fires after its reply changes nothing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use canvas_protocol::{ANY_ORIGIN, BRIDGE_READY, Envelope, ErrorCode, Reply};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use crate::transport::{Delivery, Transport, TransportParts};

/// Timeout used when a caller does not pick one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(8_000);

/// Timeout for the `init` handshake.
pub const INIT_TIMEOUT: Duration = Duration::from_millis(6_000);

pub const MIN_CALL_TIMEOUT: Duration = Duration::from_millis(500);
pub const MAX_CALL_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Clamps a caller-supplied timeout into the accepted range.
pub fn clamp_timeout(timeout: Duration) -> Duration {
	timeout.clamp(MIN_CALL_TIMEOUT, MAX_CALL_TIMEOUT)
}

type PendingMap = Arc<DashMap<String, oneshot::Sender<Reply>>>;

/// Removes a pending slot when the call future is dropped before completing.
struct CancelGuard {
	id: String,
	pending: PendingMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: String, pending: PendingMap) -> Self {
		Self {
			id,
			pending,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.pending.remove(&self.id).is_some() {
			tracing::debug!(target = "canvas::connection", id = %self.id, "removed orphaned pending call");
		}
	}
}

/// Correlates Host requests with bridge replies.
pub struct Connection {
	sender: Arc<dyn Transport>,
	target_origin: String,
	bridge_origin: Option<String>,
	pending: PendingMap,
	ready: watch::Sender<Option<Value>>,
	inbox: Mutex<Option<mpsc::UnboundedReceiver<Delivery>>>,
	closed: AtomicBool,
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("target_origin", &self.target_origin)
			.field("bridge_origin", &self.bridge_origin)
			.field("pending", &self.pending.len())
			.finish_non_exhaustive()
	}
}

impl Connection {
	/// Wraps the Host endpoint of a transport. Requests are posted to `*`
	/// and replies are accepted from any origin until configured otherwise.
	pub fn new(parts: TransportParts) -> Self {
		let TransportParts { sender, inbox } = parts;
		let (ready, _) = watch::channel(None);
		Self {
			sender,
			target_origin: ANY_ORIGIN.to_string(),
			bridge_origin: None,
			pending: Arc::new(DashMap::new()),
			ready,
			inbox: Mutex::new(Some(inbox)),
			closed: AtomicBool::new(false),
		}
	}

	/// Origin requests are addressed to.
	pub fn with_target_origin(mut self, origin: impl Into<String>) -> Self {
		self.target_origin = origin.into();
		self
	}

	/// Only accept messages whose sender origin is `origin`.
	pub fn with_bridge_origin(mut self, origin: impl Into<String>) -> Self {
		self.bridge_origin = Some(origin.into());
		self
	}

	/// Sends one request and waits for its reply.
	///
	/// Never fails: transport problems become `POST_FAIL`, silence becomes
	/// `TIMEOUT`. The timeout is clamped to [`MIN_CALL_TIMEOUT`, `MAX_CALL_TIMEOUT`].
	pub async fn call(&self, operation: &str, payload: Value, token: Option<&str>, timeout: Duration) -> Reply {
		if self.closed.load(Ordering::Acquire) {
			return Reply::error(ErrorCode::PostFail, "bridge connection closed");
		}

		let timeout = clamp_timeout(timeout);
		let id = uuid::Uuid::new_v4().to_string();
		let (tx, mut rx) = oneshot::channel();
		self.pending.insert(id.clone(), tx);
		let mut guard = CancelGuard::new(id.clone(), Arc::clone(&self.pending));

		let request = Envelope::request(operation, id.clone(), payload, token.map(str::to_string));
		tracing::debug!(target = "canvas::connection", %id, operation, "posting request");

		if let Err(e) = self.sender.post(request.to_value(), &self.target_origin) {
			self.pending.remove(&id);
			guard.complete();
			tracing::warn!(target = "canvas::connection", %id, operation, error = %e, "post failed");
			return Reply::error(ErrorCode::PostFail, e.to_string());
		}

		let reply = match tokio::time::timeout(timeout, &mut rx).await {
			Ok(Ok(reply)) => reply,
			Ok(Err(_)) => Reply::error(ErrorCode::PostFail, "bridge connection closed"),
			Err(_) => {
				if self.pending.remove(&id).is_some() {
					tracing::debug!(target = "canvas::connection", %id, operation, ?timeout, "request timed out");
					Reply::error(
						ErrorCode::Timeout,
						format!("No response for {operation} within {}ms", timeout.as_millis()),
					)
				} else {
					// Whoever claimed the slot is about to send on it.
					rx.await
						.unwrap_or_else(|_| Reply::error(ErrorCode::PostFail, "bridge connection closed"))
				}
			}
		};

		guard.complete();
		reply
	}

	/// Reads the inbox until the transport closes, then fails every call
	/// still waiting with `POST_FAIL`.
	///
	/// Only the first call does anything; later calls return immediately.
	pub async fn run(self: &Arc<Self>) {
		let Some(mut inbox) = self.inbox.lock().take() else {
			tracing::warn!(target = "canvas::connection", "run() called twice");
			return;
		};

		while let Some(delivery) = inbox.recv().await {
			self.dispatch(delivery);
		}

		self.closed.store(true, Ordering::Release);
		let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
		for id in ids {
			if let Some((_, tx)) = self.pending.remove(&id) {
				let _ = tx.send(Reply::error(ErrorCode::PostFail, "bridge connection closed"));
			}
		}
		tracing::debug!(target = "canvas::connection", "inbox closed");
	}

	/// Routes one inbound message.
	///
	/// Messages from an unexpected origin, malformed envelopes, and replies
	/// whose `reqId` is not pending are dropped.
	pub fn dispatch(&self, delivery: Delivery) {
		if self.bridge_origin.as_ref().is_some_and(|expected| delivery.origin != *expected) {
			tracing::debug!(target = "canvas::connection", origin = %delivery.origin, "ignoring message from unexpected origin");
			return;
		}

		let envelope = match Envelope::from_value(delivery.data) {
			Ok(envelope) => envelope,
			Err(e) => {
				tracing::debug!(target = "canvas::connection", error = %e, "ignoring malformed message");
				return;
			}
		};

		if envelope.kind == BRIDGE_READY {
			let payload = envelope.payload.unwrap_or(Value::Null);
			tracing::debug!(target = "canvas::connection", href = ?payload.get("href"), "bridge ready");
			self.ready.send_replace(Some(payload));
			return;
		}

		let Some(reply) = Reply::from_envelope(&envelope) else {
			tracing::debug!(target = "canvas::connection", kind = %envelope.kind, "ignoring non-reply message");
			return;
		};
		let Some(id) = envelope.req_id else {
			return;
		};
		match self.pending.remove(&id) {
			Some((_, tx)) => {
				let _ = tx.send(reply);
			}
			None => tracing::debug!(target = "canvas::connection", %id, "ignoring reply for unknown request"),
		}
	}

	/// Waits for the `bridge.ready` broadcast and returns its payload.
	pub async fn wait_ready(&self, timeout: Duration) -> Option<Value> {
		let mut rx = self.ready.subscribe();
		match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
			Ok(Ok(payload)) => payload.clone(),
			_ => None,
		}
	}

	pub fn is_ready(&self) -> bool {
		self.ready.borrow().is_some()
	}

	/// Payload of the most recent `bridge.ready` broadcast.
	pub fn ready_payload(&self) -> Option<Value> {
		self.ready.borrow().clone()
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	pub fn pending_count(&self) -> usize {
		self.pending.len()
	}
}
