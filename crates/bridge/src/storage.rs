//! Key/value storage scoped to the nested content.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Origin-local string storage.
///
/// `set` and `remove` report whether the store accepted the change, the way
/// a quota-limited browser store can refuse a write.
pub trait KeyValueStore: Send + Sync {
	fn get(&self, key: &str) -> Option<String>;
	fn set(&self, key: &str, value: &str) -> bool;
	fn remove(&self, key: &str) -> bool;
}

/// In-memory store with an optional byte quota over keys plus values.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: Mutex<HashMap<String, String>>,
	quota: Option<usize>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_quota(quota: usize) -> Self {
		Self {
			entries: Mutex::default(),
			quota: Some(quota),
		}
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}

impl KeyValueStore for MemoryStore {
	fn get(&self, key: &str) -> Option<String> {
		if key.is_empty() {
			return None;
		}
		self.entries.lock().get(key).cloned()
	}

	fn set(&self, key: &str, value: &str) -> bool {
		if key.is_empty() {
			return false;
		}
		let mut entries = self.entries.lock();
		if let Some(quota) = self.quota {
			let used: usize = entries
				.iter()
				.filter(|(k, _)| k.as_str() != key)
				.map(|(k, v)| k.len() + v.len())
				.sum();
			if used + key.len() + value.len() > quota {
				tracing::debug!(target = "canvas::bridge", key, quota, "storage quota exceeded");
				return false;
			}
		}
		entries.insert(key.to_string(), value.to_string());
		true
	}

	fn remove(&self, key: &str) -> bool {
		if key.is_empty() {
			return false;
		}
		self.entries.lock().remove(key);
		true
	}
}
