//! Load-time hardening of the bridge's global scope.

use std::collections::BTreeSet;

/// Dynamic-code entry points removed first.
pub const DYNAMIC_CODE: &[&str] = &["eval", "Function"];

/// High-risk APIs removed when present.
pub const HIGH_RISK_APIS: &[&str] = &[
	"showOpenFilePicker",
	"showSaveFilePicker",
	"showDirectoryPicker",
	"webkitRequestFileSystem",
	"requestFileSystem",
	"openDatabase",
];

/// The set of globals reachable from code running next to the bridge.
pub trait GlobalScope: Send {
	fn contains(&self, name: &str) -> bool;

	/// Removes `name`. Returns `false` if the scope refused.
	fn remove(&mut self, name: &str) -> bool;
}

/// Global scope modelled as a name set.
#[derive(Debug, Clone, Default)]
pub struct MemoryScope {
	names: BTreeSet<String>,
	locked: BTreeSet<String>,
}

impl MemoryScope {
	/// A scope exposing every name the hardening pass knows about.
	pub fn browser_like() -> Self {
		let names = DYNAMIC_CODE
			.iter()
			.chain(HIGH_RISK_APIS)
			.chain(&["fetch", "localStorage", "console"])
			.map(|s| s.to_string())
			.collect();
		Self {
			names,
			locked: BTreeSet::new(),
		}
	}

	/// Marks `name` as non-configurable so removal fails.
	pub fn lock(&mut self, name: &str) {
		self.locked.insert(name.to_string());
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.names.iter().map(String::as_str)
	}
}

impl GlobalScope for MemoryScope {
	fn contains(&self, name: &str) -> bool {
		self.names.contains(name)
	}

	fn remove(&mut self, name: &str) -> bool {
		if self.locked.contains(name) {
			return false;
		}
		self.names.remove(name);
		true
	}
}

/// What a hardening pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardeningReport {
	pub removed: Vec<String>,
	pub failed: Vec<String>,
}

/// Best-effort removal of dynamic-code and high-risk globals.
///
/// Missing names are skipped; names the scope refuses to drop are reported
/// in `failed` and otherwise ignored.
pub fn harden(scope: &mut dyn GlobalScope) -> HardeningReport {
	let mut report = HardeningReport::default();
	for name in DYNAMIC_CODE.iter().chain(HIGH_RISK_APIS) {
		if !scope.contains(name) {
			continue;
		}
		if scope.remove(name) {
			report.removed.push(name.to_string());
		} else {
			report.failed.push(name.to_string());
		}
	}
	if !report.failed.is_empty() {
		tracing::warn!(target = "canvas::bridge", failed = ?report.failed, "hardening incomplete");
	}
	report
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn removes_dynamic_code_and_risky_apis() {
		let mut scope = MemoryScope::browser_like();
		let report = harden(&mut scope);
		assert_eq!(report.removed.len(), DYNAMIC_CODE.len() + HIGH_RISK_APIS.len());
		assert!(!scope.contains("eval"));
		assert!(!scope.contains("openDatabase"));
		assert!(scope.contains("fetch"));
	}

	#[test]
	fn skips_missing_and_reports_locked() {
		let mut scope = MemoryScope::default();
		scope.names.insert("eval".into());
		scope.names.insert("showOpenFilePicker".into());
		scope.lock("showOpenFilePicker");

		let report = harden(&mut scope);
		assert_eq!(report.removed, vec!["eval"]);
		assert_eq!(report.failed, vec!["showOpenFilePicker"]);
	}
}
