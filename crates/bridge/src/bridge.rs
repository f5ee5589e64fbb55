//! The Sandbox Bridge: admission, state, and the serving loop.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use canvas_protocol::clamp::clamp_str;
use canvas_protocol::{
	ANY_ORIGIN, Capabilities, CapabilityPatch, Envelope, ErrorCode, ErrorPayload, Operation, PROTOCOL_VERSION,
	now_millis,
};
use canvas_runtime::{Delivery, TransportParts};
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::time::Instant;

use crate::config::{BridgeConfig, MAX_INIT_FIELD};
use crate::console::{ConsoleSink, TracingConsole};
use crate::dom::{MemoryDocument, SharedDocument};
use crate::fetch::{Fetcher, ReqwestFetcher};
use crate::hardening::{GlobalScope, HardeningReport, MemoryScope, harden};
use crate::rate::RateLimiter;
use crate::scripts::ScriptRegistry;
use crate::storage::{KeyValueStore, MemoryStore};

/// Note sent with the ready broadcast.
pub const READY_NOTE: &str = "Sandbox bridge active. Send init to set origin/token/caps.";

pub(crate) type HandlerResult = Result<Value, ErrorPayload>;
pub(crate) type HandlerFuture<'a> = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>>;

/// How a handler produced its result.
pub(crate) enum Outcome<'a> {
	Ready(HandlerResult),
	Pending(HandlerFuture<'a>),
}

/// Mutable bridge state, changed only by `init`.
#[derive(Debug, Clone)]
pub(crate) struct BridgeState {
	pub initialized: bool,
	pub parent_origin: String,
	pub token: Option<String>,
	pub caps: Capabilities,
	/// Grant established by the first `init`; later inits stay within it.
	pub session_ceiling: Option<Capabilities>,
}

/// A message that passed validation and is about to run.
#[derive(Debug)]
pub struct Admitted {
	pub operation: Operation,
	pub req_id: String,
	pub payload: Value,
}

/// Result of validating one inbound delivery.
#[derive(Debug)]
pub enum Admission {
	/// Silently dropped.
	Drop,
	/// Answered without running a handler.
	Reply(Envelope),
	Run(Admitted),
}

/// Child-side endpoint that executes capability-gated operations.
pub struct SandboxBridge {
	pub(crate) config: BridgeConfig,
	pub(crate) state: Mutex<BridgeState>,
	rate: Mutex<RateLimiter>,
	pub(crate) document: SharedDocument,
	pub(crate) storage: Arc<dyn KeyValueStore>,
	pub(crate) fetcher: Arc<dyn Fetcher>,
	pub(crate) scripts: ScriptRegistry,
	pub(crate) console: Arc<dyn ConsoleSink>,
	hardening: HardeningReport,
}

impl std::fmt::Debug for SandboxBridge {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SandboxBridge")
			.field("config", &self.config)
			.field("state", &*self.state.lock())
			.field("scripts", &self.scripts)
			.finish_non_exhaustive()
	}
}

/// Builder for [`SandboxBridge`].
pub struct BridgeBuilder {
	config: BridgeConfig,
	document: SharedDocument,
	storage: Arc<dyn KeyValueStore>,
	fetcher: Option<Arc<dyn Fetcher>>,
	scripts: ScriptRegistry,
	console: Arc<dyn ConsoleSink>,
	scope: Box<dyn GlobalScope>,
}

impl BridgeBuilder {
	pub fn config(mut self, config: BridgeConfig) -> Self {
		self.config = config;
		self
	}

	pub fn document(mut self, document: SharedDocument) -> Self {
		self.document = document;
		self
	}

	pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
		self.storage = storage;
		self
	}

	pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
		self.fetcher = Some(fetcher);
		self
	}

	pub fn scripts(mut self, scripts: ScriptRegistry) -> Self {
		self.scripts = scripts;
		self
	}

	pub fn console(mut self, console: Arc<dyn ConsoleSink>) -> Self {
		self.console = console;
		self
	}

	pub fn scope(mut self, scope: Box<dyn GlobalScope>) -> Self {
		self.scope = scope;
		self
	}

	/// Hardens the global scope (unless disabled) and returns the bridge.
	pub fn build(mut self) -> SandboxBridge {
		let hardening = if self.config.harden {
			harden(self.scope.as_mut())
		} else {
			HardeningReport::default()
		};
		let caps = self.config.initial_caps.intersect(&self.config.ceiling);
		SandboxBridge {
			state: Mutex::new(BridgeState {
				initialized: false,
				parent_origin: ANY_ORIGIN.to_string(),
				token: None,
				caps,
				session_ceiling: None,
			}),
			rate: Mutex::new(RateLimiter::new(self.config.rate.clone())),
			config: self.config,
			document: self.document,
			storage: self.storage,
			fetcher: self.fetcher.unwrap_or_else(|| Arc::new(ReqwestFetcher::default())),
			scripts: self.scripts,
			console: self.console,
			hardening,
		}
	}
}

impl SandboxBridge {
	/// Starts a builder over a blank in-memory document.
	pub fn builder() -> BridgeBuilder {
		let document: SharedDocument = Arc::new(Mutex::new(MemoryDocument::new("about:blank")));
		BridgeBuilder {
			config: BridgeConfig::default(),
			document,
			storage: Arc::new(MemoryStore::new()),
			fetcher: None,
			scripts: ScriptRegistry::default(),
			console: Arc::new(TracingConsole),
			scope: Box::new(MemoryScope::browser_like()),
		}
	}

	pub fn config(&self) -> &BridgeConfig {
		&self.config
	}

	pub fn hardening(&self) -> &HardeningReport {
		&self.hardening
	}

	pub fn capabilities(&self) -> Capabilities {
		self.state.lock().caps
	}

	pub fn is_initialized(&self) -> bool {
		self.state.lock().initialized
	}

	pub fn document(&self) -> &SharedDocument {
		&self.document
	}

	/// Origin replies are addressed to: the pinned parent origin, or `*`.
	pub fn reply_origin(&self) -> String {
		self.state.lock().parent_origin.clone()
	}

	/// The `bridge.ready` broadcast.
	pub fn ready_message(&self) -> Envelope {
		Envelope::ready(json!({
			"v": PROTOCOL_VERSION,
			"href": self.document.lock().href(),
			"hardened": self.hardening.removed,
			"note": READY_NOTE,
		}))
	}

	/// Runs the validation pipeline over one delivery.
	///
	/// Lifecycle operations are executed here, in arrival order, so an `init`
	/// is in effect before the next message is validated.
	pub fn admit(&self, delivery: Delivery) -> Admission {
		let Delivery { origin, data } = delivery;
		let (pinned, token) = {
			let state = self.state.lock();
			(state.parent_origin.clone(), state.token.clone())
		};

		// Every delivery counts against the window, whatever its origin or shape.
		if !self.rate.lock().check(Instant::now()) {
			tracing::debug!(target = "canvas::bridge", %origin, "rate limited");
			return Admission::Drop;
		}

		if pinned != ANY_ORIGIN && origin != pinned {
			tracing::debug!(target = "canvas::bridge", %origin, "dropping message from unpinned origin");
			return Admission::Drop;
		}

		let Value::Object(mut map) = data else {
			return Admission::Drop;
		};
		let Some(kind) = map.get("type").and_then(Value::as_str).map(str::to_string) else {
			return Admission::Drop;
		};

		let Some(operation) = Operation::lookup(&kind) else {
			tracing::warn!(target = "canvas::bridge", kind = %clamp_str(&kind, 64), "unknown operation");
			if !self.config.reply_unknown_operations {
				return Admission::Drop;
			}
			let req_id = map.get("reqId").and_then(Value::as_str).map(str::to_string);
			return Admission::Reply(Envelope::err(req_id, ErrorPayload::deny("unknown_operation")));
		};

		if let Some(expected) = &token {
			if map.get("token").and_then(Value::as_str) != Some(expected.as_str()) {
				tracing::warn!(target = "canvas::bridge", operation = %operation, "dropping message with bad token");
				return Admission::Drop;
			}
		}

		let req_id = match map.remove("reqId") {
			None | Some(Value::Null) => uuid::Uuid::new_v4().to_string(),
			Some(Value::String(id)) => id,
			Some(_) => return Admission::Drop,
		};

		let payload = match map.remove("payload") {
			None | Some(Value::Null) => Value::Object(Map::new()),
			Some(Value::Object(p)) => Value::Object(p),
			Some(_) => return Admission::Drop,
		};

		let admitted = Admitted {
			operation,
			req_id,
			payload,
		};

		if let Some(denied) = self.gate(&admitted) {
			return Admission::Reply(denied);
		}

		if operation.is_lifecycle() {
			let result = self.run_sync(&admitted);
			return Admission::Reply(reply(admitted.req_id, result));
		}

		Admission::Run(admitted)
	}

	fn gate(&self, admitted: &Admitted) -> Option<Envelope> {
		let state = self.state.lock();
		if !state.initialized && !admitted.operation.is_lifecycle() {
			return Some(Envelope::err(
				Some(admitted.req_id.clone()),
				ErrorPayload::deny("bridge_not_initialized"),
			));
		}
		let cap = admitted.operation.capability()?;
		if state.caps.get(cap) {
			return None;
		}
		Some(Envelope::err(
			Some(admitted.req_id.clone()),
			ErrorPayload::deny(format!("capability_required:{cap}")),
		))
	}

	fn run_sync(&self, admitted: &Admitted) -> HandlerResult {
		match std::panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(admitted.operation, &admitted.payload))) {
			Ok(Outcome::Ready(result)) => result,
			Ok(Outcome::Pending(_)) => Err(ErrorPayload::new(ErrorCode::Internal, "lifecycle handler did not complete")),
			Err(_) => Err(panicked(admitted.operation)),
		}
	}

	/// Runs an admitted request to completion. Never panics.
	pub async fn execute(&self, admitted: Admitted) -> Envelope {
		let Admitted {
			operation,
			req_id,
			payload,
		} = admitted;
		let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(operation, &payload)));
		let result = match outcome {
			Ok(Outcome::Ready(result)) => result,
			Ok(Outcome::Pending(fut)) => match AssertUnwindSafe(fut).catch_unwind().await {
				Ok(result) => result,
				Err(_) => Err(panicked(operation)),
			},
			Err(_) => Err(panicked(operation)),
		};
		reply(req_id, result)
	}

	/// Validates and executes one delivery, returning the reply to post.
	pub async fn handle(&self, delivery: Delivery) -> Option<Value> {
		match self.admit(delivery) {
			Admission::Drop => None,
			Admission::Reply(envelope) => Some(envelope.to_value()),
			Admission::Run(admitted) => Some(self.execute(admitted).await.to_value()),
		}
	}

	/// Announces readiness, then serves the transport until its inbox closes.
	///
	/// Messages are validated in arrival order; handlers that wait on I/O run
	/// concurrently and reply as they finish.
	pub async fn serve(self: Arc<Self>, parts: TransportParts) {
		let TransportParts { sender, mut inbox } = parts;
		let post = |envelope: Envelope| {
			let target = self.reply_origin();
			if let Err(e) = sender.post(envelope.to_value(), &target) {
				tracing::debug!(target = "canvas::bridge", error = %e, "post failed");
			}
		};

		let ready = self.ready_message();
		if let Err(e) = sender.post(ready.to_value(), ANY_ORIGIN) {
			tracing::warn!(target = "canvas::bridge", error = %e, "could not announce readiness");
		}
		tracing::info!(target = "canvas::bridge", href = %self.document.lock().href(), "bridge serving");

		let bridge = &*self;
		let mut running = FuturesUnordered::new();
		loop {
			tokio::select! {
				delivery = inbox.recv() => {
					let Some(delivery) = delivery else { break };
					match bridge.admit(delivery) {
						Admission::Drop => {}
						Admission::Reply(envelope) => post(envelope),
						Admission::Run(admitted) => running.push(bridge.execute(admitted)),
					}
				}
				Some(envelope) = running.next(), if !running.is_empty() => post(envelope),
			}
		}

		while let Some(envelope) = running.next().await {
			post(envelope);
		}
		tracing::info!(target = "canvas::bridge", "bridge stopped");
	}

	pub(crate) fn apply_init(&self, payload: &Value) -> Value {
		let mut state = self.state.lock();
		if let Some(origin) = payload.get("parentOrigin").and_then(Value::as_str) {
			if origin.chars().count() <= MAX_INIT_FIELD {
				state.parent_origin = origin.to_string();
			}
		}
		if let Some(token) = payload.get("token").and_then(Value::as_str) {
			if token.chars().count() <= MAX_INIT_FIELD {
				state.token = Some(token.to_string());
			}
		}
		if let Some(caps) = payload.get("caps").filter(|c| c.is_object()) {
			let patch = CapabilityPatch::from_untrusted(caps);
			let ceiling = match state.session_ceiling {
				Some(session) => session.intersect(&self.config.ceiling),
				None => self.config.ceiling,
			};
			let refused = state.caps.apply(&patch, &ceiling);
			if !refused.is_empty() {
				tracing::info!(target = "canvas::bridge", ?refused, "capabilities above ceiling refused");
			}
		}
		if state.session_ceiling.is_none() {
			state.session_ceiling = Some(state.caps);
		}
		state.initialized = true;
		tracing::debug!(target = "canvas::bridge", caps = ?state.caps.granted(), origin = %state.parent_origin, "initialized");

		json!({
			"v": PROTOCOL_VERSION,
			"parentOrigin": state.parent_origin,
			"token": if state.token.is_some() { "set" } else { "none" },
			"caps": state.caps,
			"ready": true,
		})
	}

	pub(crate) fn ping(&self) -> Value {
		json!({ "pong": true, "ts": now_millis(), "href": self.document.lock().href() })
	}
}

fn reply(req_id: String, result: HandlerResult) -> Envelope {
	match result {
		Ok(payload) => Envelope::ok(Some(req_id), payload),
		Err(error) => Envelope::err(Some(req_id), error),
	}
}

fn panicked(operation: Operation) -> ErrorPayload {
	tracing::error!(target = "canvas::bridge", %operation, "handler panicked");
	ErrorPayload::new(ErrorCode::Internal, format!("{operation} handler failed"))
}
