//! Capability grants for a canvas session.
//!
//! A [`Capabilities`] record is a fixed set of boolean grants, one per
//! [`Capability`]. Grants only ever move through [`Capabilities::apply`], which
//! intersects every requested field with a ceiling so a patch can narrow a
//! grant but never widen it past what the ceiling allows.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One category of bridge operation that must be granted before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
	DomRead,
	DomWrite,
	NetFetch,
	Storage,
	ScriptRun,
	Console,
}

impl Capability {
	pub const ALL: [Capability; 6] = [
		Capability::DomRead,
		Capability::DomWrite,
		Capability::NetFetch,
		Capability::Storage,
		Capability::ScriptRun,
		Capability::Console,
	];

	/// Wire name, as used in `capability_required:<name>` denials.
	pub fn as_str(self) -> &'static str {
		match self {
			Capability::DomRead => "dom_read",
			Capability::DomWrite => "dom_write",
			Capability::NetFetch => "net_fetch",
			Capability::Storage => "storage",
			Capability::ScriptRun => "script_run",
			Capability::Console => "console",
		}
	}

	pub fn parse(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|cap| cap.as_str() == name)
	}
}

impl fmt::Display for Capability {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Granted capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
	pub dom_read: bool,
	pub dom_write: bool,
	pub net_fetch: bool,
	pub storage: bool,
	pub script_run: bool,
	pub console: bool,
}

impl Capabilities {
	/// Nothing granted.
	pub const fn none() -> Self {
		Self {
			dom_read: false,
			dom_write: false,
			net_fetch: false,
			storage: false,
			script_run: false,
			console: false,
		}
	}

	/// Everything granted.
	pub const fn all() -> Self {
		Self {
			dom_read: true,
			dom_write: true,
			net_fetch: true,
			storage: true,
			script_run: true,
			console: true,
		}
	}

	/// Deny-by-default baseline held by a bridge before initialization.
	pub const fn baseline() -> Self {
		Self {
			console: true,
			..Self::none()
		}
	}

	/// Grants handed to new Host sessions unless configured otherwise.
	///
	/// Network and storage are on; DOM access and script execution are off.
	pub const fn session_default() -> Self {
		Self {
			net_fetch: true,
			storage: true,
			console: true,
			..Self::none()
		}
	}

	pub fn get(&self, cap: Capability) -> bool {
		match cap {
			Capability::DomRead => self.dom_read,
			Capability::DomWrite => self.dom_write,
			Capability::NetFetch => self.net_fetch,
			Capability::Storage => self.storage,
			Capability::ScriptRun => self.script_run,
			Capability::Console => self.console,
		}
	}

	pub fn set(&mut self, cap: Capability, granted: bool) {
		let slot = match cap {
			Capability::DomRead => &mut self.dom_read,
			Capability::DomWrite => &mut self.dom_write,
			Capability::NetFetch => &mut self.net_fetch,
			Capability::Storage => &mut self.storage,
			Capability::ScriptRun => &mut self.script_run,
			Capability::Console => &mut self.console,
		};
		*slot = granted;
	}

	/// Field-wise AND.
	pub fn intersect(&self, other: &Capabilities) -> Capabilities {
		Capabilities {
			dom_read: self.dom_read && other.dom_read,
			dom_write: self.dom_write && other.dom_write,
			net_fetch: self.net_fetch && other.net_fetch,
			storage: self.storage && other.storage,
			script_run: self.script_run && other.script_run,
			console: self.console && other.console,
		}
	}

	/// True when every grant in `self` is also granted by `ceiling`.
	pub fn is_within(&self, ceiling: &Capabilities) -> bool {
		self.intersect(ceiling) == *self
	}

	/// Applies the fields present in `patch`, each clamped by `ceiling`.
	///
	/// Returns the capabilities the patch asked for but the ceiling refused.
	pub fn apply(&mut self, patch: &CapabilityPatch, ceiling: &Capabilities) -> Vec<Capability> {
		let mut refused = Vec::new();
		for cap in Capability::ALL {
			let Some(requested) = patch.get(cap) else {
				continue;
			};
			let allowed = ceiling.get(cap);
			if requested && !allowed {
				refused.push(cap);
			}
			self.set(cap, requested && allowed);
		}
		refused
	}

	/// Names of the granted capabilities, in declaration order.
	pub fn granted(&self) -> Vec<Capability> {
		Capability::ALL.into_iter().filter(|cap| self.get(*cap)).collect()
	}
}

/// Partial update to a [`Capabilities`] record. Absent fields are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityPatch {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub dom_read: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub dom_write: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub net_fetch: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub storage: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub script_run: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub console: Option<bool>,
}

impl CapabilityPatch {
	pub fn get(&self, cap: Capability) -> Option<bool> {
		match cap {
			Capability::DomRead => self.dom_read,
			Capability::DomWrite => self.dom_write,
			Capability::NetFetch => self.net_fetch,
			Capability::Storage => self.storage,
			Capability::ScriptRun => self.script_run,
			Capability::Console => self.console,
		}
	}

	pub fn with(mut self, cap: Capability, granted: bool) -> Self {
		let slot = match cap {
			Capability::DomRead => &mut self.dom_read,
			Capability::DomWrite => &mut self.dom_write,
			Capability::NetFetch => &mut self.net_fetch,
			Capability::Storage => &mut self.storage,
			Capability::ScriptRun => &mut self.script_run,
			Capability::Console => &mut self.console,
		};
		*slot = Some(granted);
		self
	}

	pub fn is_empty(&self) -> bool {
		Capability::ALL.into_iter().all(|cap| self.get(cap).is_none())
	}

	/// Reads a patch out of an untrusted JSON object.
	///
	/// Only recognized capability names are considered, and any JSON value is
	/// coerced to a boolean by truthiness so hostile shapes cannot fail the parse.
	pub fn from_untrusted(value: &serde_json::Value) -> Self {
		let mut patch = CapabilityPatch::default();
		let Some(map) = value.as_object() else {
			return patch;
		};
		for cap in Capability::ALL {
			if let Some(v) = map.get(cap.as_str()) {
				patch = patch.with(cap, truthy(v));
			}
		}
		patch
	}
}

impl From<Capabilities> for CapabilityPatch {
	fn from(caps: Capabilities) -> Self {
		Capability::ALL
			.into_iter()
			.fold(CapabilityPatch::default(), |patch, cap| patch.with(cap, caps.get(cap)))
	}
}

fn truthy(value: &serde_json::Value) -> bool {
	use serde_json::Value;
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
		Value::String(s) => !s.is_empty(),
		Value::Array(_) | Value::Object(_) => true,
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn baseline_grants_console_only() {
		assert_eq!(Capabilities::baseline().granted(), vec![Capability::Console]);
	}

	#[test]
	fn session_default_denies_dom_and_scripts() {
		let caps = Capabilities::session_default();
		assert!(caps.net_fetch && caps.storage);
		assert!(!caps.dom_read && !caps.dom_write && !caps.script_run);
	}

	#[test]
	fn apply_never_widens_past_ceiling() {
		let ceiling = Capabilities::session_default();
		let mut caps = ceiling;
		let patch = CapabilityPatch::from(Capabilities::all());

		let refused = caps.apply(&patch, &ceiling);

		assert_eq!(caps, ceiling);
		assert_eq!(refused, vec![Capability::DomRead, Capability::DomWrite, Capability::ScriptRun]);
	}

	#[test]
	fn apply_every_patch_stays_within_ceiling() {
		let ceilings = [Capabilities::none(), Capabilities::baseline(), Capabilities::session_default(), Capabilities::all()];
		for ceiling in ceilings {
			for bits in 0u8..64 {
				let mut patch = CapabilityPatch::default();
				for (i, cap) in Capability::ALL.into_iter().enumerate() {
					patch = patch.with(cap, bits & (1 << i) != 0);
				}
				let mut caps = ceiling;
				caps.apply(&patch, &ceiling);
				assert!(caps.is_within(&ceiling), "{caps:?} escaped {ceiling:?}");
			}
		}
	}

	#[test]
	fn apply_leaves_absent_fields_untouched() {
		let mut caps = Capabilities::session_default();
		caps.apply(&CapabilityPatch::default().with(Capability::Storage, false), &Capabilities::all());

		assert!(!caps.storage);
		assert!(caps.net_fetch);
		assert!(caps.console);
	}

	#[test]
	fn untrusted_patch_ignores_unknown_keys_and_coerces() {
		let patch = CapabilityPatch::from_untrusted(&json!({
			"dom_read": 1,
			"storage": "",
			"root": true,
		}));

		assert_eq!(patch.dom_read, Some(true));
		assert_eq!(patch.storage, Some(false));
		assert_eq!(patch.net_fetch, None);
	}

	#[test]
	fn untrusted_patch_from_non_object_is_empty() {
		assert!(CapabilityPatch::from_untrusted(&json!(["dom_read"])).is_empty());
	}

	#[test]
	fn capability_names_round_trip() {
		for cap in Capability::ALL {
			assert_eq!(Capability::parse(cap.as_str()), Some(cap));
		}
		assert_eq!(Capability::parse("js_run"), None);
	}
}
