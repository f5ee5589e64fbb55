//! Persisted session records.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use canvas_protocol::{Capabilities, Capability, CapabilityPatch, now_millis};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current layout of [`SessionStore`].
pub const STORE_VERSION: u32 = 1;

/// State for one opened target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
	pub id: String,
	pub url: String,
	/// Unix milliseconds.
	pub created_at: u64,
	pub updated_at: u64,
	pub open: bool,
	/// Secret attached to every request for this session.
	pub token: String,
	#[serde(default)]
	pub caps: Capabilities,
	/// Grant the session was created with. Older records without one are
	/// capped at their current grant.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ceiling: Option<Capabilities>,
}

impl Session {
	/// A new open session with fresh id and token.
	pub fn new(url: impl Into<String>, caps: Capabilities) -> Self {
		let now = now_millis();
		Self {
			id: format!("cs_{}", Uuid::new_v4().simple()),
			url: url.into(),
			created_at: now,
			updated_at: now,
			open: true,
			token: format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
			caps,
			ceiling: Some(caps),
		}
	}

	pub fn ceiling(&self) -> Capabilities {
		self.ceiling.unwrap_or(self.caps)
	}

	pub fn touch(&mut self) {
		self.updated_at = now_millis().max(self.updated_at);
	}

	/// Applies `patch` within the ceiling. Returns the refused capabilities.
	pub fn apply_caps(&mut self, patch: &CapabilityPatch) -> Vec<Capability> {
		let ceiling = self.ceiling();
		let refused = self.caps.apply(patch, &ceiling);
		self.ceiling = Some(ceiling);
		self.touch();
		refused
	}

	pub fn summary(&self) -> SessionSummary {
		SessionSummary {
			id: self.id.clone(),
			url: self.url.clone(),
			open: self.open,
			created_at: self.created_at,
			updated_at: self.updated_at,
		}
	}
}

/// The public view of a session: no token, no grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
	pub id: String,
	pub url: String,
	pub open: bool,
	pub created_at: u64,
	pub updated_at: u64,
}

/// Every known session plus the last active one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionStore {
	pub v: u32,
	pub sessions: BTreeMap<String, Session>,
	pub last_active_id: Option<String>,
}

impl Default for SessionStore {
	fn default() -> Self {
		Self {
			v: STORE_VERSION,
			sessions: BTreeMap::new(),
			last_active_id: None,
		}
	}
}

impl SessionStore {
	pub fn get(&self, id: &str) -> Option<&Session> {
		self.sessions.get(id)
	}

	pub fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
		self.sessions.get_mut(id)
	}

	/// Stores `session` and makes it the active one.
	pub fn insert_active(&mut self, session: Session) -> &mut Session {
		let id = session.id.clone();
		self.last_active_id = Some(id.clone());
		match self.sessions.entry(id) {
			Entry::Occupied(mut entry) => {
				entry.insert(session);
				entry.into_mut()
			}
			Entry::Vacant(entry) => entry.insert(session),
		}
	}

	/// Removes a session. Not reachable from the wire protocol.
	pub fn delete(&mut self, id: &str) -> Option<Session> {
		if self.last_active_id.as_deref() == Some(id) {
			self.last_active_id = None;
		}
		self.sessions.remove(id)
	}

	pub fn last_active(&self) -> Option<&Session> {
		self.last_active_id.as_deref().and_then(|id| self.sessions.get(id))
	}

	pub fn last_active_mut(&mut self) -> Option<&mut Session> {
		let id = self.last_active_id.as_deref()?;
		self.sessions.get_mut(id)
	}

	pub fn summaries(&self) -> Vec<SessionSummary> {
		self.sessions.values().map(Session::summary).collect()
	}
}
