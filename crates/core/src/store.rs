//! Where the Host keeps [`SessionStore`] between runs.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::session::SessionStore;

/// Load/save for the session store.
pub trait StateStore: Send + Sync {
	/// Returns the stored state, or an empty store if there is none.
	fn load(&self) -> Result<SessionStore>;
	fn save(&self, store: &SessionStore) -> Result<()>;
}

/// JSON file readable only by the owner. Tokens live in it.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
	path: PathBuf,
}

impl JsonFileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn write_err(&self, source: std::io::Error) -> Error {
		Error::StateWrite {
			path: self.path.clone(),
			source,
		}
	}
}

impl StateStore for JsonFileStore {
	fn load(&self) -> Result<SessionStore> {
		let content = match fs::read_to_string(&self.path) {
			Ok(content) => content,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SessionStore::default()),
			Err(source) => {
				return Err(Error::StateRead {
					path: self.path.clone(),
					source,
				});
			}
		};
		match serde_json::from_str(&content) {
			Ok(store) => Ok(store),
			Err(e) => {
				tracing::warn!(target = "canvas::host", path = %self.path.display(), error = %e, "discarding unreadable session state");
				Ok(SessionStore::default())
			}
		}
	}

	/// Writes to a sibling temp file, restricts it to 0600, then renames
	/// it over the target.
	fn save(&self, store: &SessionStore) -> Result<()> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| self.write_err(e))?;
		}
		let data = serde_json::to_string_pretty(store)?;
		let tmp = self.path.with_extension("json.tmp");
		fs::write(&tmp, data).map_err(|e| self.write_err(e))?;
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600)).map_err(|e| self.write_err(e))?;
		}
		fs::rename(&tmp, &self.path).map_err(|e| self.write_err(e))?;
		Ok(())
	}
}

/// Keeps state in memory; for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
	state: Mutex<SessionStore>,
}

impl MemoryStateStore {
	pub fn new(initial: SessionStore) -> Self {
		Self {
			state: Mutex::new(initial),
		}
	}

	pub fn snapshot(&self) -> SessionStore {
		self.state.lock().clone()
	}
}

impl StateStore for MemoryStateStore {
	fn load(&self) -> Result<SessionStore> {
		Ok(self.state.lock().clone())
	}

	fn save(&self, store: &SessionStore) -> Result<()> {
		*self.state.lock() = store.clone();
		Ok(())
	}
}
