//! Bridge process management
//!
//! Locates the `canvas-bridge` executable and runs it as a child process that
//! speaks the pipe framing over its stdin/stdout.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use canvas_protocol::OPAQUE_ORIGIN;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::{PipeTransport, TransportParts};

/// Environment variable overriding the bridge executable location.
pub const BRIDGE_BIN_ENV: &str = "CANVAS_BRIDGE_BIN";

/// File name of the bridge binary.
pub const BRIDGE_BIN_NAME: &str = "canvas-bridge";

/// Get the path to the bridge executable
///
/// Search order:
/// 1. `explicit`, when the caller passes one (`--bridge-bin`)
/// 2. `CANVAS_BRIDGE_BIN` environment variable
/// 3. next to the running executable (cargo puts workspace binaries together)
/// 4. `PATH`
///
/// # Errors
///
/// Returns `Error::BridgeNotFound` if no candidate is an existing file.
pub fn get_bridge_executable(explicit: Option<&Path>) -> Result<PathBuf> {
	resolve_bridge_executable(
		explicit,
		std::env::var_os(BRIDGE_BIN_ENV),
		std::env::current_exe().ok(),
		|| which::which(BRIDGE_BIN_NAME).ok(),
	)
}

fn resolve_bridge_executable<F>(
	explicit: Option<&Path>,
	env_value: Option<OsString>,
	current_exe: Option<PathBuf>,
	search_path: F,
) -> Result<PathBuf>
where
	F: FnOnce() -> Option<PathBuf>,
{
	if let Some(path) = explicit {
		if path.is_file() {
			return Ok(path.to_path_buf());
		}
		warn!(target = "canvas::driver", path = %path.display(), "explicit bridge executable does not exist");
		return Err(Error::BridgeNotFound);
	}

	if let Some(value) = env_value.filter(|v| !v.is_empty()) {
		let path = PathBuf::from(value);
		if path.is_file() {
			debug_candidate(BRIDGE_BIN_ENV, &path);
			return Ok(path);
		}
		warn!(
			target = "canvas::driver",
			path = %path.display(),
			"{BRIDGE_BIN_ENV} does not point at a file; trying fallbacks"
		);
	}

	if let Some(sibling) = current_exe.as_deref().and_then(sibling_executable) {
		debug_candidate("sibling", &sibling);
		return Ok(sibling);
	}

	if let Some(path) = search_path() {
		debug_candidate("PATH", &path);
		return Ok(path);
	}

	Err(Error::BridgeNotFound)
}

fn sibling_executable(current_exe: &Path) -> Option<PathBuf> {
	let dir = current_exe.parent()?;
	let candidate = dir.join(format!("{BRIDGE_BIN_NAME}{}", std::env::consts::EXE_SUFFIX));
	candidate.is_file().then_some(candidate)
}

fn debug_candidate(label: &str, path: &Path) {
	debug!(target = "canvas::driver", source = label, path = %path.display(), "using bridge executable");
}

/// A bridge running in a child process.
#[derive(Debug)]
pub struct BridgeProcess {
	pub process: Child,
}

impl BridgeProcess {
	/// Spawns `executable` and connects a pipe transport to its stdio.
	///
	/// `parent_origin` is passed to the child as the origin it should stamp on
	/// frames it reads; frames read from the child are stamped with the opaque
	/// `"null"` origin of a sandboxed context.
	///
	/// # Errors
	///
	/// Returns `Error::LaunchFailed` if the process cannot be spawned or its
	/// stdio is unavailable.
	pub fn launch(executable: &Path, parent_origin: &str, extra_args: &[String]) -> Result<(Self, TransportParts)> {
		let mut cmd = Command::new(executable);
		cmd.arg("--parent-origin")
			.arg(parent_origin)
			.args(extra_args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.kill_on_drop(true);

		let mut child = cmd
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("Failed to spawn {}: {e}", executable.display())))?;

		let stdin = child
			.stdin
			.take()
			.ok_or_else(|| Error::LaunchFailed("child stdin unavailable".into()))?;
		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| Error::LaunchFailed("child stdout unavailable".into()))?;

		debug!(target = "canvas::driver", pid = ?child.id(), path = %executable.display(), "bridge process started");

		let (transport, inbox) = PipeTransport::new(stdin, stdout, OPAQUE_ORIGIN);
		Ok((Self { process: child }, transport.into_transport_parts(inbox)))
	}

	/// Kills the child and waits for it to exit.
	pub async fn shutdown(mut self) -> Result<()> {
		if self.process.try_wait()?.is_none() {
			self.process.kill().await?;
		}
		Ok(())
	}
}
