/// Default directives per `-v` count. `RUST_LOG` overrides them.
fn default_directives(verbosity: u8) -> &'static str {
	match verbosity {
		// In-process bridges log drops of hostile frames at warn; keep the
		// default run quiet apart from real failures.
		0 => "error,canvas_bridge=off",
		1 => "info,canvas_runtime=warn,canvas_bridge=warn",
		_ => "debug",
	}
}

/// Installs the shared stderr subscriber; stdout is reserved for result envelopes.
pub fn init_logging(verbosity: u8) {
	canvas_bridge::logging::init_logging(default_directives(verbosity));
}
