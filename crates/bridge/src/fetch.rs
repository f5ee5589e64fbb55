//! Network fetch on behalf of the Host.
//!
//! Requests are validated and stripped down before they reach a [`Fetcher`]:
//! only allowlisted methods and headers survive, bodies are strings, and no
//! credentials or referrer are ever attached.

use async_trait::async_trait;
use canvas_protocol::clamp::{clamp_str, clamp_text};
use canvas_protocol::{ErrorCode, ErrorPayload};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::{MAX_FETCH_BODY, MAX_FETCH_TEXT, MAX_FETCH_URL, MAX_HEADER_VALUE};

/// Request headers that may be forwarded. Everything else is dropped.
pub const HEADER_ALLOWLIST: &[&str] = &[
	"accept",
	"accept-language",
	"content-type",
	"x-canvas",
	"x-canvas-tab",
	"x-requested-with",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
	Get,
	Post,
	Put,
	Patch,
	Delete,
	Head,
}

impl FetchMethod {
	/// Parses a method name case-insensitively.
	pub fn parse(name: &str) -> Option<Self> {
		match name.to_ascii_uppercase().as_str() {
			"GET" => Some(Self::Get),
			"POST" => Some(Self::Post),
			"PUT" => Some(Self::Put),
			"PATCH" => Some(Self::Patch),
			"DELETE" => Some(Self::Delete),
			"HEAD" => Some(Self::Head),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
			Self::Head => "HEAD",
		}
	}

	fn allows_body(self) -> bool {
		!matches!(self, Self::Get | Self::Head)
	}

	fn to_reqwest(self) -> reqwest::Method {
		match self {
			Self::Get => reqwest::Method::GET,
			Self::Post => reqwest::Method::POST,
			Self::Put => reqwest::Method::PUT,
			Self::Patch => reqwest::Method::PATCH,
			Self::Delete => reqwest::Method::DELETE,
			Self::Head => reqwest::Method::HEAD,
		}
	}
}

/// A validated outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
	pub url: Url,
	pub method: FetchMethod,
	/// Lower-cased allowlisted names with clamped values.
	pub headers: Vec<(String, String)>,
	pub body: Option<String>,
	/// Requested timeout in milliseconds, `0` when absent. Sign is kept.
	pub timeout_ms: i64,
}

impl FetchRequest {
	/// Validates an untrusted `net.fetch` payload.
	pub fn from_payload(payload: &Value) -> Result<Self, ErrorPayload> {
		let raw_url = clamp_text(payload.get("url"), MAX_FETCH_URL + 1);
		if raw_url.is_empty() {
			return Err(ErrorPayload::new(ErrorCode::BadUrl, "Missing url"));
		}
		if raw_url.chars().count() > MAX_FETCH_URL {
			return Err(ErrorPayload::new(ErrorCode::BadUrl, "Url too long"));
		}
		let url = Url::parse(&raw_url).map_err(|e| ErrorPayload::new(ErrorCode::BadUrl, format!("Invalid url: {e}")))?;
		if !matches!(url.scheme(), "http" | "https") {
			return Err(ErrorPayload::new(ErrorCode::BadUrl, "Only http(s) urls are allowed"));
		}

		let method = match payload.get("method") {
			None | Some(Value::Null) => FetchMethod::Get,
			Some(m) => FetchMethod::parse(&clamp_text(Some(m), 16))
				.ok_or_else(|| ErrorPayload::new(ErrorCode::BadMethod, "Method not allowed"))?,
		};

		let mut headers = Vec::new();
		if let Some(Value::Object(map)) = payload.get("headers") {
			for (name, value) in map {
				let name = name.to_ascii_lowercase();
				if !HEADER_ALLOWLIST.contains(&name.as_str()) {
					tracing::debug!(target = "canvas::bridge", header = %name, "dropping header");
					continue;
				}
				let value = clamp_text(Some(value), MAX_HEADER_VALUE);
				if value.chars().any(char::is_control) {
					continue;
				}
				headers.push((name, value));
			}
		}

		let body = match payload.get("body") {
			None | Some(Value::Null) => None,
			Some(Value::String(s)) => Some(clamp_str(s, MAX_FETCH_BODY)),
			Some(_) => return Err(ErrorPayload::new(ErrorCode::BadBody, "Body must be string")),
		};
		if body.is_some() && !method.allows_body() {
			return Err(ErrorPayload::new(
				ErrorCode::BadBody,
				format!("{} requests cannot have a body", method.as_str()),
			));
		}

		let timeout_ms = payload
			.get("timeoutMs")
			.and_then(|t| t.as_i64().or_else(|| t.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64)))
			.unwrap_or(0);

		Ok(Self {
			url,
			method,
			headers,
			body,
			timeout_ms,
		})
	}
}

/// What the Host gets back from a successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
	pub status: u16,
	pub ok: bool,
	pub content_type: String,
	pub url: String,
	pub text: String,
}

/// Failure reported as `FETCH_FAIL` with `{name, message}` extra.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{name}: {message}")]
pub struct FetchError {
	pub name: String,
	pub message: String,
}

impl FetchError {
	pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			message: message.into(),
		}
	}

	pub fn timeout() -> Self {
		Self::new("AbortError", "timeout")
	}
}

/// Performs validated requests.
#[async_trait]
pub trait Fetcher: Send + Sync {
	async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// [`Fetcher`] backed by `reqwest`: no cookie store, no referrer, redirects followed.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
	client: reqwest::Client,
}

impl Default for ReqwestFetcher {
	fn default() -> Self {
		let client = reqwest::Client::builder()
			.referer(false)
			.redirect(reqwest::redirect::Policy::limited(10))
			.user_agent(concat!("canvas-bridge/", env!("CARGO_PKG_VERSION")))
			.build()
			.unwrap_or_else(|e| {
				tracing::warn!(target = "canvas::bridge", error = %e, "falling back to default http client");
				reqwest::Client::new()
			});
		Self { client }
	}
}

impl ReqwestFetcher {
	pub fn new(client: reqwest::Client) -> Self {
		Self { client }
	}
}

fn classify(e: &reqwest::Error) -> FetchError {
	let name = if e.is_timeout() {
		"TimeoutError"
	} else if e.is_redirect() {
		"RedirectError"
	} else {
		"TypeError"
	};
	FetchError::new(name, e.to_string())
}

/// Accumulates a response body until it holds enough bytes for `max_chars`.
///
/// A UTF-8 char is at most four bytes, so the byte budget is four times the
/// char limit. Anything past it is never read.
#[derive(Debug)]
struct CappedBody {
	buf: Vec<u8>,
	max_chars: usize,
}

impl CappedBody {
	fn new(max_chars: usize) -> Self {
		Self { buf: Vec::new(), max_chars }
	}

	fn byte_budget(&self) -> usize {
		self.max_chars.saturating_mul(4)
	}

	/// Appends a chunk; returns `false` once the budget is exhausted.
	fn push(&mut self, chunk: &[u8]) -> bool {
		let room = self.byte_budget().saturating_sub(self.buf.len());
		self.buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
		self.buf.len() < self.byte_budget()
	}

	fn into_text(self) -> String {
		clamp_str(&String::from_utf8_lossy(&self.buf), self.max_chars)
	}
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
	async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
		let mut builder = self.client.request(request.method.to_reqwest(), request.url);
		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(body) = request.body {
			builder = builder.body(body);
		}

		let mut response = builder.send().await.map_err(|e| classify(&e))?;
		let status = response.status();
		let content_type = response
			.headers()
			.get(reqwest::header::CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.unwrap_or_default()
			.to_ascii_lowercase();
		let url = response.url().to_string();

		let mut body = CappedBody::new(MAX_FETCH_TEXT);
		while let Some(chunk) = response.chunk().await.map_err(|e| classify(&e))? {
			if !body.push(&chunk) {
				break;
			}
		}

		Ok(FetchResponse {
			status: status.as_u16(),
			ok: status.is_success(),
			content_type,
			url,
			text: body.into_text(),
		})
	}
}
