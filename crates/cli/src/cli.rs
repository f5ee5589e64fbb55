use std::path::PathBuf;

use canvas::Capability;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Parser, Subcommand, ValueEnum};

use crate::output::OutputFormat;

/// Cargo-like help colors.
fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.valid(AnsiColor::Cyan.on_default())
}

/// Where the bridge runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SurfaceKind {
	/// A task inside this process; canvas storage lasts for one command
	#[default]
	InProcess,
	/// A `canvas-bridge` child process over stdio
	Process,
}

#[derive(Parser, Debug)]
#[command(name = "canvas")]
#[command(about = "Sandboxed canvas host - open pages behind a capability-gated bridge")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: json (default), ndjson, or text
	#[arg(short = 'f', long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	/// Session state file (default: $XDG_CONFIG_HOME/canvas/sessions.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub state: Option<PathBuf>,

	/// Config file (default: $XDG_CONFIG_HOME/canvas/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Where the bridge runs
	#[arg(long, global = true, value_enum, default_value = "in-process")]
	pub surface: SurfaceKind,

	/// Bridge binary for `--surface process` (default: CANVAS_BRIDGE_BIN, next to this binary, then PATH)
	#[arg(long, global = true, value_name = "PATH")]
	pub bridge_bin: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Open a URL in a new canvas session (or reuse one with --session)
	Open {
		url: String,
		/// Reuse this session id instead of creating one
		#[arg(long, value_name = "ID")]
		session: Option<String>,
	},

	/// Mark the active session closed
	Close,

	/// Show the active session again
	Reopen,

	/// Point the active session at a new URL
	Navigate { url: String },

	/// Restore the last active session if it was left open
	Restore,

	/// Send one bridge operation to the active session
	///
	/// Example: canvas call storage.set --input '{"key":"k","value":"v"}'
	Call {
		/// Operation type, e.g. ping, dom.query, net.fetch
		operation: String,
		/// JSON payload
		#[arg(short, long, value_name = "JSON", default_value = "{}")]
		input: String,
		/// Reply timeout, clamped to 500..60000
		#[arg(long, value_name = "MS")]
		timeout_ms: Option<u64>,
	},

	/// Show or narrow the active session's capabilities
	///
	/// Example: canvas caps net_fetch=false dom_read=true
	Caps {
		/// NAME=BOOL assignments; grants past the session ceiling are refused
		#[arg(value_parser = parse_cap_assignment, value_name = "NAME=BOOL")]
		assignments: Vec<(Capability, bool)>,
	},

	/// List saved sessions
	Sessions,
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Open { .. } => "open",
			Commands::Close => "close",
			Commands::Reopen => "reopen",
			Commands::Navigate { .. } => "navigate",
			Commands::Restore => "restore",
			Commands::Call { .. } => "call",
			Commands::Caps { .. } => "caps",
			Commands::Sessions => "sessions",
		}
	}
}

/// Parses `dom_read=true`, `storage=off` and friends.
pub fn parse_cap_assignment(s: &str) -> Result<(Capability, bool), String> {
	let (name, value) = s
		.split_once('=')
		.ok_or_else(|| format!("expected NAME=BOOL, got '{s}'"))?;
	let cap = Capability::parse(name.trim()).ok_or_else(|| {
		let known: Vec<_> = Capability::ALL.iter().map(|c| c.as_str()).collect();
		format!("unknown capability '{}' (expected one of: {})", name.trim(), known.join(", "))
	})?;
	let granted = match value.trim().to_ascii_lowercase().as_str() {
		"true" | "on" | "yes" | "1" => true,
		"false" | "off" | "no" | "0" => false,
		other => return Err(format!("expected a boolean for {cap}, got '{other}'")),
	};
	Ok((cap, granted))
}
