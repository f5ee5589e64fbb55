//! Error types for bridge setup.
//!
//! Request failures never surface here; they are answered on the wire as
//! `err` replies.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("Failed to read bridge config {path}: {source}")]
	ConfigRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Invalid bridge config {path}: {source}")]
	ConfigParse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
}
