//! Subscriber setup shared by the `canvas-bridge` and `canvas` binaries.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Installs a compact stderr subscriber filtered by `RUST_LOG`, or by
/// `default_directives` when it is unset or invalid.
///
/// Stdout stays free for the pipe protocol and result envelopes.
pub fn init_logging(default_directives: &str) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr.with_max_level(tracing::Level::TRACE))
		.with_target(true)
		.compact()
		.init();
}

/// Default directives for the bridge child per `-v` count.
pub fn bridge_directives(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "error",
		1 => "info",
		_ => "debug",
	}
}
