//! Operation handlers.
//!
//! [`SandboxBridge::dispatch`] is an exhaustive match over [`Operation`], so
//! adding an operation to the registry without a handler does not compile.
//! Capability checks have already happened by the time a handler runs.

use std::sync::LazyLock;

use canvas_protocol::clamp::{MAX_PAYLOAD_JSON, clamp_str, clamp_text, clamp_value};
use canvas_protocol::{ErrorCode, ErrorPayload, Operation};
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::bridge::{HandlerResult, Outcome, SandboxBridge};
use crate::config::{
	MAX_ATTR_NAME, MAX_ATTR_VALUE, MAX_CLASS_INPUT, MAX_CLASS_TOKENS, MAX_DOM_TEXT, MAX_FETCH_TEXT, MAX_QUERY_NODES,
	MAX_SCRIPT_ID, MAX_SELECTOR, MAX_STORAGE_KEY, MAX_STORAGE_VALUE, MAX_STYLE_NAME, MAX_STYLE_VALUE,
};
use crate::console::ConsoleLevel;
use crate::dom::{Document, NodeId, Selector};
use crate::fetch::{FetchError, FetchRequest};

static STYLE_URL_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?i)url\s*\(").expect("style url pattern is valid"));

fn no_node() -> ErrorPayload {
	ErrorPayload::new(ErrorCode::NoNode, "No node for selector")
}

/// Trimmed selector string and its parse.
fn parse_selector(payload: &Value) -> Result<(String, Selector), ErrorPayload> {
	let Some(raw) = payload.get("selector").and_then(Value::as_str) else {
		return Err(ErrorPayload::new(ErrorCode::BadSelector, "Selector must be a string"));
	};
	let trimmed = raw.trim();
	if trimmed.is_empty() || trimmed.chars().count() > MAX_SELECTOR {
		return Err(ErrorPayload::new(
			ErrorCode::BadSelector,
			format!("Selector must be 1-{MAX_SELECTOR} characters"),
		));
	}
	let selector = Selector::parse(trimmed)
		.map_err(|e| ErrorPayload::new(ErrorCode::BadSelector, format!("Invalid selector: {e}")))?;
	Ok((trimmed.to_string(), selector))
}

fn class_tokens(payload: &Value) -> Vec<String> {
	clamp_text(payload.get("class"), MAX_CLASS_INPUT)
		.split_whitespace()
		.take(MAX_CLASS_TOKENS)
		.map(str::to_string)
		.collect()
}

fn is_valid_attr_name(name: &str) -> bool {
	!name
		.chars()
		.any(|c| c.is_whitespace() || c.is_control() || matches!(c, '"' | '\'' | '>' | '/' | '=' | '<'))
}

impl SandboxBridge {
	pub(crate) fn dispatch<'a>(&'a self, operation: Operation, payload: &Value) -> Outcome<'a> {
		match operation {
			Operation::Init => Outcome::Ready(Ok(self.apply_init(payload))),
			Operation::Ping => Outcome::Ready(Ok(self.ping())),
			Operation::Capabilities => Outcome::Ready(Ok(json!({ "caps": self.capabilities() }))),
			Operation::DomQuery => Outcome::Ready(self.dom_query(payload)),
			Operation::DomGet => Outcome::Ready(self.dom_get(payload)),
			Operation::DomSetText => Outcome::Ready(self.with_node(payload, |doc, node| {
				doc.set_text(node, &clamp_text(payload.get("text"), MAX_DOM_TEXT));
				Ok(json!({ "ok": true, "node": doc.snapshot(node) }))
			})),
			Operation::DomSetHtml => Outcome::Ready(self.with_node(payload, |doc, node| {
				doc.set_html(node, &clamp_text(payload.get("html"), MAX_DOM_TEXT));
				Ok(json!({ "ok": true, "node": doc.snapshot(node) }))
			})),
			Operation::DomSetAttr => Outcome::Ready(self.dom_set_attr(payload)),
			Operation::DomAddClass => Outcome::Ready(self.with_node(payload, |doc, node| {
				let classes = class_tokens(payload);
				for class in &classes {
					doc.add_class(node, class);
				}
				Ok(json!({ "ok": true, "node": doc.snapshot(node), "added": classes }))
			})),
			Operation::DomRemoveClass => Outcome::Ready(self.with_node(payload, |doc, node| {
				let classes = class_tokens(payload);
				for class in &classes {
					doc.remove_class(node, class);
				}
				Ok(json!({ "ok": true, "node": doc.snapshot(node), "removed": classes }))
			})),
			Operation::DomStyle => Outcome::Ready(self.dom_style(payload)),
			Operation::NetFetch => match FetchRequest::from_payload(payload) {
				Ok(request) => Outcome::Pending(Box::pin(self.net_fetch(request))),
				Err(e) => Outcome::Ready(Err(e)),
			},
			Operation::StorageGet => {
				let key = clamp_text(payload.get("key"), MAX_STORAGE_KEY);
				let value = self.storage.get(&key);
				Outcome::Ready(Ok(json!({ "key": key, "value": value })))
			}
			Operation::StorageSet => {
				let key = clamp_text(payload.get("key"), MAX_STORAGE_KEY);
				let value = clamp_text(payload.get("value"), MAX_STORAGE_VALUE);
				let ok = self.storage.set(&key, &value);
				Outcome::Ready(Ok(json!({ "key": key, "ok": ok })))
			}
			Operation::StorageDel => {
				let key = clamp_text(payload.get("key"), MAX_STORAGE_KEY);
				let ok = self.storage.remove(&key);
				Outcome::Ready(Ok(json!({ "key": key, "ok": ok })))
			}
			Operation::ScriptRun => self.script_run(payload),
			Operation::ConsoleLog => Outcome::Ready(self.console_emit(ConsoleLevel::Log, payload)),
			Operation::ConsoleWarn => Outcome::Ready(self.console_emit(ConsoleLevel::Warn, payload)),
			Operation::ConsoleError => Outcome::Ready(self.console_emit(ConsoleLevel::Error, payload)),
		}
	}

	/// Resolves the payload's selector to one element and runs `f` on it
	/// with the document locked.
	fn with_node<F>(&self, payload: &Value, f: F) -> HandlerResult
	where
		F: FnOnce(&mut dyn Document, NodeId) -> HandlerResult,
	{
		let (_, selector) = parse_selector(payload)?;
		let mut doc = self.document.lock();
		let node = doc.query(&selector).ok_or_else(no_node)?;
		f(&mut *doc, node)
	}

	fn dom_query(&self, payload: &Value) -> HandlerResult {
		let (text, selector) = parse_selector(payload)?;
		let all = payload.get("all").is_some_and(truthy);
		let doc = self.document.lock();
		if all {
			let nodes: Vec<_> = doc
				.query_all(&selector, MAX_QUERY_NODES)
				.into_iter()
				.map(|n| doc.snapshot(n))
				.collect();
			Ok(json!({ "selector": text, "count": nodes.len(), "nodes": nodes }))
		} else {
			let node = doc.query(&selector).map(|n| doc.snapshot(n));
			Ok(json!({ "selector": text, "node": node }))
		}
	}

	fn dom_get(&self, payload: &Value) -> HandlerResult {
		self.with_node(payload, |doc, node| {
			let mode = match payload.get("mode") {
				Some(m) if truthy(m) => clamp_text(Some(m), 16),
				_ => "text".to_string(),
			};
			let snapshot = doc.snapshot(node);
			match mode.as_str() {
				"text" => Ok(json!({ "text": clamp_str(&doc.text(node), MAX_DOM_TEXT), "node": snapshot })),
				"html" => Ok(json!({ "html": clamp_str(&doc.inner_html(node), MAX_DOM_TEXT), "node": snapshot })),
				"value" => Ok(json!({ "value": clamp_str(&doc.value(node), MAX_DOM_TEXT), "node": snapshot })),
				_ => Err(ErrorPayload::new(ErrorCode::BadMode, "mode must be text|html|value")),
			}
		})
	}

	fn dom_set_attr(&self, payload: &Value) -> HandlerResult {
		self.with_node(payload, |doc, node| {
			let name = clamp_text(payload.get("name"), MAX_ATTR_NAME);
			let value = clamp_text(payload.get("value"), MAX_ATTR_VALUE);
			if name.is_empty() {
				return Err(ErrorPayload::new(ErrorCode::BadAttr, "Missing attr name"));
			}
			if name.to_ascii_lowercase().starts_with("on") {
				return Err(ErrorPayload::deny("event_attrs_denied"));
			}
			if !is_valid_attr_name(&name) {
				return Err(ErrorPayload::new(ErrorCode::BadAttr, "Invalid attr name"));
			}
			doc.set_attr(node, &name, &value);
			Ok(json!({ "ok": true, "node": doc.snapshot(node), "name": name }))
		})
	}

	fn dom_style(&self, payload: &Value) -> HandlerResult {
		self.with_node(payload, |doc, node| {
			let name = clamp_text(payload.get("name"), MAX_STYLE_NAME);
			let value = clamp_text(payload.get("value"), MAX_STYLE_VALUE);
			if name.is_empty() {
				return Err(ErrorPayload::new(ErrorCode::BadStyle, "Missing style name"));
			}
			if STYLE_URL_RE.is_match(&value) {
				return Err(ErrorPayload::deny("style_url_denied"));
			}
			doc.set_style(node, &name, &value);
			Ok(json!({ "ok": true, "node": doc.snapshot(node), "name": name }))
		})
	}

	async fn net_fetch(&self, request: FetchRequest) -> HandlerResult {
		let timeout = self.config.fetch_timeout(request.timeout_ms);
		let url = request.url.to_string();
		tracing::debug!(target = "canvas::bridge", %url, method = request.method.as_str(), ?timeout, "fetch");

		let result = match tokio::time::timeout(timeout, self.fetcher.fetch(request)).await {
			Ok(result) => result,
			Err(_) => Err(FetchError::timeout()),
		};
		match result {
			Ok(mut response) => {
				response.text = clamp_str(&response.text, MAX_FETCH_TEXT);
				serde_json::to_value(response).map_err(|e| ErrorPayload::new(ErrorCode::Internal, e.to_string()))
			}
			Err(e) => {
				tracing::debug!(target = "canvas::bridge", %url, error = %e, "fetch failed");
				Err(ErrorPayload::new(ErrorCode::FetchFail, "Fetch failed")
					.with_extra(json!({ "name": e.name, "message": e.message })))
			}
		}
	}

	fn script_run<'a>(&'a self, payload: &Value) -> Outcome<'a> {
		let id = clamp_text(payload.get("id"), MAX_SCRIPT_ID);
		if id.is_empty() {
			return Outcome::Ready(Err(ErrorPayload::new(ErrorCode::BadScript, "Missing script id")));
		}
		let Some(script) = self.scripts.get(&id) else {
			return Outcome::Ready(Err(ErrorPayload::new(
				ErrorCode::NoScript,
				format!("No such script: {id}"),
			)));
		};
		let args = match payload.get("args") {
			Some(Value::Object(args)) => Value::Object(args.clone()),
			_ => Value::Object(Map::new()),
		};
		Outcome::Pending(Box::pin(async move {
			match script(args).await {
				Ok(out) => Ok(json!({ "id": id, "out": clamp_value(out, MAX_PAYLOAD_JSON) })),
				Err(message) => Err(ErrorPayload::new(ErrorCode::ScriptFail, "Script execution failed")
					.with_extra(json!({ "id": id, "message": message }))),
			}
		}))
	}

	fn console_emit(&self, level: ConsoleLevel, payload: &Value) -> HandlerResult {
		let payload = clamp_value(payload.clone(), MAX_PAYLOAD_JSON);
		self.console.emit(level, &payload);
		Ok(json!({ "ok": true }))
	}
}

/// JavaScript-style truthiness for loosely typed flags.
fn truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
		Value::String(s) => !s.is_empty(),
		Value::Array(_) | Value::Object(_) => true,
	}
}
