//! End-to-end bridge operations over an in-memory channel, driven through a
//! Host-side `Connection`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canvas_bridge::config::MAX_FETCH_TEXT;
use canvas_bridge::{
	BridgeConfig, ConsoleLevel, FetchError, FetchRequest, FetchResponse, Fetcher, MemoryDocument, RateLimit,
	RecordingConsole, SandboxBridge, ScriptRegistry,
};
use canvas_protocol::{ErrorCode, OPAQUE_ORIGIN};
use canvas_runtime::{Connection, DEFAULT_CALL_TIMEOUT, channel_pair};
use parking_lot::Mutex;
use serde_json::{Value, json};

const HOST: &str = "app://canvas-host";
const TOKEN: &str = "tok-123";

/// Records every request and answers with a fixed body.
#[derive(Default)]
struct RecordingFetcher {
	requests: Mutex<Vec<FetchRequest>>,
	delay: Option<Duration>,
	body: Option<String>,
}

#[async_trait]
impl Fetcher for RecordingFetcher {
	async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
		self.requests.lock().push(request.clone());
		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}
		Ok(FetchResponse {
			status: 200,
			ok: true,
			content_type: "text/plain".into(),
			url: request.url.to_string(),
			text: self.body.clone().unwrap_or_else(|| "hello".into()),
		})
	}
}

struct Harness {
	conn: Arc<Connection>,
	document: Arc<Mutex<MemoryDocument>>,
	fetcher: Arc<RecordingFetcher>,
	console: Arc<RecordingConsole>,
}

impl Harness {
	async fn call(&self, op: &str, payload: Value) -> canvas_protocol::Reply {
		self.conn.call(op, payload, Some(TOKEN), DEFAULT_CALL_TIMEOUT).await
	}
}

async fn start(config: BridgeConfig, fetcher: RecordingFetcher, caps: Value) -> Harness {
	let mut doc = MemoryDocument::new("https://example.com/");
	let body = doc.body();
	let main = doc.append_element(body, "main", &[("id", "content")]);
	let title = doc.append_element(main, "h1", &[("class", "title big")]);
	doc.append_text(title, "Hello");
	let item = doc.append_element(main, "p", &[("class", "item")]);
	doc.append_text(item, "one");
	let item = doc.append_element(main, "p", &[("class", "item")]);
	doc.append_text(item, "two");
	doc.append_element(main, "input", &[("name", "q"), ("value", "query")]);
	let document = Arc::new(Mutex::new(doc));

	let fetcher = Arc::new(fetcher);
	let console = Arc::new(RecordingConsole::default());
	let mut scripts = ScriptRegistry::default();
	scripts.register_fn("test.fail", |_| Err("nope".to_string()));

	let bridge = SandboxBridge::builder()
		.config(config)
		.document(document.clone())
		.fetcher(fetcher.clone())
		.console(console.clone())
		.scripts(scripts)
		.build();

	let (host, child) = channel_pair(HOST, OPAQUE_ORIGIN);
	tokio::spawn(Arc::new(bridge).serve(child));

	let conn = Arc::new(Connection::new(host));
	let runner = conn.clone();
	tokio::spawn(async move { runner.run().await });

	assert!(conn.wait_ready(Duration::from_secs(2)).await.is_some(), "bridge never announced readiness");
	let init = conn
		.call(
			"init",
			json!({ "parentOrigin": HOST, "token": TOKEN, "caps": caps }),
			None,
			DEFAULT_CALL_TIMEOUT,
		)
		.await;
	assert!(init.is_ok(), "init failed: {init:?}");

	Harness {
		conn,
		document,
		fetcher,
		console,
	}
}

fn all_caps() -> Value {
	json!({ "dom_read": true, "dom_write": true, "net_fetch": true, "storage": true, "script_run": true, "console": true })
}

async fn full() -> Harness {
	start(BridgeConfig::default(), RecordingFetcher::default(), all_caps()).await
}

#[tokio::test]
async fn dom_query_single_and_all() {
	let h = full().await;

	let one = h.call("dom.query", json!({ "selector": "main > h1" })).await.into_result().unwrap();
	assert_eq!(one["node"], json!({ "tag": "h1", "id": "", "class": "title big" }));

	let many = h.call("dom.query", json!({ "selector": "p.item", "all": true })).await.into_result().unwrap();
	assert_eq!(many["count"], 2);

	let none = h.call("dom.query", json!({ "selector": "table" })).await.into_result().unwrap();
	assert_eq!(none["node"], Value::Null);
}

#[tokio::test]
async fn bad_selectors_and_missing_nodes() {
	let h = full().await;
	assert_eq!(h.call("dom.get", json!({ "selector": "   " })).await.code(), Some(ErrorCode::BadSelector));
	assert_eq!(h.call("dom.get", json!({ "selector": "p[" })).await.code(), Some(ErrorCode::BadSelector));
	assert_eq!(h.call("dom.get", json!({ "selector": "table" })).await.code(), Some(ErrorCode::NoNode));
}

#[tokio::test]
async fn dom_get_modes() {
	let h = full().await;
	let text = h.call("dom.get", json!({ "selector": "h1" })).await.into_result().unwrap();
	assert_eq!(text["text"], "Hello");
	let value = h.call("dom.get", json!({ "selector": "input", "mode": "value" })).await.into_result().unwrap();
	assert_eq!(value["value"], "query");
	assert_eq!(
		h.call("dom.get", json!({ "selector": "h1", "mode": "outer" })).await.code(),
		Some(ErrorCode::BadMode)
	);
	for falsy in [json!(""), json!(0), json!(false)] {
		let reply = h.call("dom.get", json!({ "selector": "h1", "mode": falsy })).await.into_result().unwrap();
		assert_eq!(reply["text"], "Hello", "mode {falsy} should read text");
	}
}

#[tokio::test]
async fn set_html_without_capability_leaves_document_untouched() {
	let caps = json!({ "dom_read": true });
	let h = start(BridgeConfig::default(), RecordingFetcher::default(), caps).await;

	let reply = h.call("dom.setHTML", json!({ "selector": "h1", "html": "<b>pwned</b>" })).await;
	let err = reply.error_payload().expect("denied");
	assert_eq!(err.code, ErrorCode::Deny);
	assert_eq!(err.message, "capability_required:dom_write");

	let text = h.call("dom.get", json!({ "selector": "h1" })).await.into_result().unwrap();
	assert_eq!(text["text"], "Hello");
}

#[tokio::test]
async fn dom_writes_apply() {
	let h = full().await;
	h.call("dom.setText", json!({ "selector": "h1", "text": "Bye" })).await.into_result().unwrap();
	h.call("dom.addClass", json!({ "selector": "h1", "class": "a b" })).await.into_result().unwrap();
	let removed = h
		.call("dom.removeClass", json!({ "selector": "h1", "class": "big" }))
		.await
		.into_result()
		.unwrap();
	assert_eq!(removed["node"]["class"], "title a b");

	let attr = h
		.call("dom.setAttr", json!({ "selector": "h1", "name": "data-x", "value": "1" }))
		.await
		.into_result()
		.unwrap();
	assert_eq!(attr["name"], "data-x");
	h.call("dom.style", json!({ "selector": "h1", "name": "color", "value": "red" }))
		.await
		.into_result()
		.unwrap();

	let doc = h.document.lock();
	let selector = canvas_bridge::Selector::parse("h1").unwrap();
	let node = canvas_bridge::Document::query(&*doc, &selector).unwrap();
	assert_eq!(canvas_bridge::Document::text(&*doc, node), "Bye");
	assert_eq!(doc.attr(node, "data-x"), Some("1"));
	assert_eq!(doc.style(node, "color"), Some("red"));
}

#[tokio::test]
async fn event_attributes_and_style_urls_are_denied() {
	let h = full().await;
	let onclick = h.call("dom.setAttr", json!({ "selector": "h1", "name": "OnClick", "value": "x()" })).await;
	assert_eq!(onclick.error_payload().map(|e| e.message.as_str()), Some("event_attrs_denied"));

	let url = h
		.call(
			"dom.style",
			json!({ "selector": "h1", "name": "background", "value": "URL (http://x)" }),
		)
		.await;
	assert_eq!(url.error_payload().map(|e| e.message.as_str()), Some("style_url_denied"));

	assert_eq!(
		h.call("dom.setAttr", json!({ "selector": "h1", "name": "a b" })).await.code(),
		Some(ErrorCode::BadAttr)
	);
}

#[tokio::test]
async fn fetch_forwards_only_allowlisted_headers() {
	let h = full().await;
	let reply = h
		.call(
			"net.fetch",
			json!({
				"url": "https://api.example.com/data",
				"headers": { "Accept": "text/plain", "X-Evil": "1", "Authorization": "Bearer x" }
			}),
		)
		.await
		.into_result()
		.unwrap();
	assert_eq!(reply["status"], 200);
	assert_eq!(reply["contentType"], "text/plain");
	assert_eq!(reply["text"], "hello");

	let requests = h.fetcher.requests.lock();
	assert_eq!(requests.len(), 1);
	assert_eq!(requests[0].headers, vec![("accept".to_string(), "text/plain".to_string())]);
}

#[tokio::test]
async fn oversized_fetch_text_is_clamped() {
	let fetcher = RecordingFetcher {
		body: Some("x".repeat(MAX_FETCH_TEXT + 100_000)),
		..RecordingFetcher::default()
	};
	let h = start(BridgeConfig::default(), fetcher, all_caps()).await;

	let reply = h
		.call("net.fetch", json!({ "url": "https://big.example.com/" }))
		.await
		.into_result()
		.unwrap();
	assert_eq!(reply["text"].as_str().unwrap().len(), MAX_FETCH_TEXT);
}

#[tokio::test(start_paused = true)]
async fn fetch_timeout_reports_abort() {
	let fetcher = RecordingFetcher {
		delay: Some(Duration::from_secs(30)),
		..RecordingFetcher::default()
	};
	let h = start(BridgeConfig::default(), fetcher, all_caps()).await;

	let reply = h
		.call("net.fetch", json!({ "url": "https://slow.example.com/", "timeoutMs": 1000 }))
		.await;
	let err = reply.error_payload().expect("fetch should fail");
	assert_eq!(err.code, ErrorCode::FetchFail);
	assert_eq!(err.extra.as_ref().unwrap()["name"], "AbortError");
	assert_eq!(err.extra.as_ref().unwrap()["message"], "timeout");
}

#[tokio::test]
async fn storage_round_trip() {
	let h = full().await;
	let set = h.call("storage.set", json!({ "key": "k", "value": "v" })).await.into_result().unwrap();
	assert_eq!(set["ok"], true);
	let got = h.call("storage.get", json!({ "key": "k" })).await.into_result().unwrap();
	assert_eq!(got["value"], "v");
	h.call("storage.del", json!({ "key": "k" })).await.into_result().unwrap();
	let gone = h.call("storage.get", json!({ "key": "k" })).await.into_result().unwrap();
	assert_eq!(gone["value"], Value::Null);
}

#[tokio::test]
async fn scripts_run_by_id_only() {
	let h = full().await;
	let echo = h
		.call("script.run", json!({ "id": "canvas.echo", "args": { "n": 1 } }))
		.await
		.into_result()
		.unwrap();
	assert_eq!(echo["out"], json!({ "echo": { "n": 1 } }));

	assert_eq!(h.call("script.run", json!({})).await.code(), Some(ErrorCode::BadScript));
	assert_eq!(h.call("script.run", json!({ "id": "nope" })).await.code(), Some(ErrorCode::NoScript));
	let failed = h.call("script.run", json!({ "id": "test.fail" })).await;
	let err = failed.error_payload().expect("script failure");
	assert_eq!(err.code, ErrorCode::ScriptFail);
	assert_eq!(err.extra.as_ref().unwrap()["message"], "nope");
}

#[tokio::test]
async fn console_passthrough() {
	let h = full().await;
	h.call("console.warn", json!({ "msg": "careful" })).await.into_result().unwrap();
	assert_eq!(h.console.entries(), vec![(ConsoleLevel::Warn, json!({ "msg": "careful" }))]);
}

#[tokio::test]
async fn wrong_token_gets_no_reply() {
	let h = full().await;
	let reply = h.conn.call("ping", json!({}), Some("forged"), Duration::from_millis(500)).await;
	assert_eq!(reply.code(), Some(ErrorCode::Timeout));
	assert_eq!(h.conn.pending_count(), 0);
}

#[tokio::test]
async fn unknown_operation_is_denied() {
	let h = full().await;
	let reply = h.call("fs.readFile", json!({ "path": "/etc/passwd" })).await;
	assert_eq!(reply.error_payload().map(|e| e.message.as_str()), Some("unknown_operation"));
}

#[tokio::test]
async fn rate_limit_threshold() {
	let config = BridgeConfig {
		rate: RateLimit {
			window_ms: 60_000,
			max: 5,
			cooldown_ms: 60_000,
		},
		..BridgeConfig::default()
	};
	let h = start(config, RecordingFetcher::default(), all_caps()).await;

	// init already used one slot.
	for _ in 0..4 {
		assert!(h.call("ping", json!({})).await.is_ok());
	}
	let over = h.conn.call("ping", json!({}), Some(TOKEN), Duration::from_millis(500)).await;
	assert_eq!(over.code(), Some(ErrorCode::Timeout));
}
