//! Registry of locally defined scripts.
//!
//! The Host can only pick a script by id and hand it a JSON object; code never
//! travels over the channel.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use canvas_protocol::clamp::clamp_str;
use serde_json::{Value, json};

use crate::config::MAX_SCRIPT_ID;

/// Boxed script future.
pub type ScriptFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;

/// Script function: JSON object in, JSON value or failure message out.
pub type ScriptFn = Arc<dyn Fn(Value) -> ScriptFuture + Send + Sync>;

/// Id of the script every bridge registers by default.
pub const ECHO_SCRIPT: &str = "canvas.echo";

#[derive(Clone)]
pub struct ScriptRegistry {
	scripts: HashMap<String, ScriptFn>,
}

impl std::fmt::Debug for ScriptRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ScriptRegistry").field("ids", &self.ids()).finish()
	}
}

impl Default for ScriptRegistry {
	fn default() -> Self {
		let mut registry = Self::empty();
		registry.register_fn(ECHO_SCRIPT, |args| Ok(json!({ "echo": args })));
		registry
	}
}

impl ScriptRegistry {
	/// A registry without the default `canvas.echo` script.
	pub fn empty() -> Self {
		Self { scripts: HashMap::new() }
	}

	/// Registers an async script. Returns `false` for an empty id.
	///
	/// Ids longer than the wire limit are truncated, matching how lookups
	/// truncate the requested id.
	pub fn register<F, Fut>(&mut self, id: &str, script: F) -> bool
	where
		F: Fn(Value) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<Value, String>> + Send + 'static,
	{
		let id = clamp_str(id, MAX_SCRIPT_ID);
		if id.is_empty() {
			return false;
		}
		let script: ScriptFn = Arc::new(move |args| Box::pin(script(args)));
		self.scripts.insert(id, script);
		true
	}

	/// Registers a synchronous script.
	pub fn register_fn<F>(&mut self, id: &str, script: F) -> bool
	where
		F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
	{
		let script = Arc::new(script);
		self.register(id, move |args| {
			let script = Arc::clone(&script);
			async move { script(args) }
		})
	}

	pub fn get(&self, id: &str) -> Option<ScriptFn> {
		self.scripts.get(id).cloned()
	}

	pub fn ids(&self) -> Vec<&str> {
		let mut ids: Vec<&str> = self.scripts.keys().map(String::as_str).collect();
		ids.sort_unstable();
		ids
	}
}
