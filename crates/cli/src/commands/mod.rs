//! Subcommand dispatch.
//!
//! Each invocation builds one [`BridgeHost`] over the session state file,
//! runs a single command against it, and shuts the surface down again.

mod call;
mod session;

use std::sync::Arc;

use canvas::{BridgeHost, InProcessSurface, JsonFileStore, ProcessSurface, Surface, status};
use serde::Serialize;
use serde_json::Value;

use crate::cli::{Cli, Commands, SurfaceKind};
use crate::config::{CanvasConfig, StatePaths};
use crate::error::{CliError, Result};
use crate::output::{OutputFormat, ResultBuilder, print_result};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let paths = StatePaths::new().with_overrides(cli.config.clone(), cli.state.clone());
	let config = CanvasConfig::load(&paths.config)?;
	let surface = build_surface(&cli, &config)?;
	tracing::debug!(target = "canvas::cli", state = %paths.sessions.display(), surface = ?cli.surface, "starting host");

	let host = BridgeHost::new(config.host, Arc::new(JsonFileStore::new(&paths.sessions)), surface);
	let format = cli.format;
	let outcome = match cli.command {
		Commands::Open { url, session } => session::open(&host, url, session, format).await,
		Commands::Close => session::close(&host, format),
		Commands::Reopen => session::reopen(&host, format).await,
		Commands::Navigate { url } => session::navigate(&host, url, format).await,
		Commands::Restore => session::restore(&host, format).await,
		Commands::Sessions => session::list(&host, format),
		Commands::Call {
			operation,
			input,
			timeout_ms,
		} => call::call(&host, operation, &input, timeout_ms, format).await,
		Commands::Caps { assignments } => call::caps(&host, &assignments, format).await,
	};
	host.shutdown().await;
	outcome
}

fn build_surface(cli: &Cli, config: &CanvasConfig) -> Result<Arc<dyn Surface>> {
	Ok(match cli.surface {
		SurfaceKind::InProcess => Arc::new(InProcessSurface::new(config.bridge.clone())),
		SurfaceKind::Process => {
			let mut args = vec!["--config-json".to_string(), serde_json::to_string(&config.bridge)?];
			if cli.verbose > 0 {
				args.push(format!("-{}", "v".repeat(cli.verbose.into())));
			}
			let surface = ProcessSurface::discover(cli.bridge_bin.as_deref())?.with_args(args);
			tracing::debug!(target = "canvas::cli", bridge = %surface.executable().display(), "using process surface");
			Arc::new(surface)
		}
	})
}

/// Fails with the Host status line if the last load, handshake or `init`
/// went wrong.
fn check_init(host: &BridgeHost) -> Result<()> {
	let status = host.status();
	if status::is_init_error(&status) {
		return Err(CliError::Init(status));
	}
	Ok(())
}

fn emit<T: Serialize>(command: &str, inputs: Value, data: T, host: &BridgeHost, format: OutputFormat) {
	let result = ResultBuilder::new(command)
		.inputs(inputs)
		.data(data)
		.status(host.status())
		.build();
	print_result(&result, format);
}
