use std::path::PathBuf;

use canvas::ErrorPayload;
use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error("bad url: {0}")]
	BadUrl(String),

	#[error("no canvas session")]
	NoSession,

	/// Carries the Host status line that reported the failure.
	#[error("{0}")]
	Init(String),

	#[error("{operation} failed: {error}")]
	Bridge { operation: String, error: ErrorPayload },

	#[error("config {path}: {message}")]
	Config { path: PathBuf, message: String },

	#[error(transparent)]
	Host(#[from] canvas::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl CliError {
	pub fn to_command_error(&self) -> CommandError {
		let message = self.to_string();
		let (code, details) = match self {
			CliError::InvalidInput(_) => (ErrorCode::InvalidInput, None),
			CliError::BadUrl(url) => (ErrorCode::BadUrl, Some(serde_json::json!({ "url": url }))),
			CliError::NoSession => (ErrorCode::NoSession, None),
			CliError::Init(_) => (ErrorCode::InitFailed, None),
			CliError::Bridge { error, .. } => (ErrorCode::BridgeError, serde_json::to_value(error).ok()),
			CliError::Config { path, .. } => (ErrorCode::ConfigError, Some(serde_json::json!({ "path": path }))),
			CliError::Host(canvas::Error::StateRead { .. } | canvas::Error::StateWrite { .. }) => (ErrorCode::IoError, None),
			CliError::Host(canvas::Error::Runtime(_)) => (ErrorCode::InitFailed, None),
			CliError::Host(_) => (ErrorCode::InternalError, None),
			CliError::Io(_) => (ErrorCode::IoError, None),
			CliError::Json(_) => (ErrorCode::InvalidInput, None),
		};

		CommandError { code, message, details }
	}
}
