//! Error types for the Host.
//!
//! Bad input and bridge failures are not errors here: `open` and `navigate`
//! report them through status, and `call` always returns a
//! [`Reply`](canvas_protocol::Reply). These variants cover persistence and
//! surface plumbing.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("Failed to read session state {path}: {source}")]
	StateRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to write session state {path}: {source}")]
	StateWrite {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Surface cannot navigate in place")]
	NavigationUnsupported,

	#[error("Surface is not loaded")]
	NotLoaded,

	#[error(transparent)]
	Runtime(#[from] canvas_runtime::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}
