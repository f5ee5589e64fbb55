//! `canvas-bridge`: serves one sandbox bridge over stdin/stdout.
//!
//! Frames use the pipe transport framing. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use canvas_bridge::logging::{bridge_directives, init_logging};
use canvas_bridge::{BridgeConfig, MemoryDocument, SandboxBridge, dom};
use canvas_runtime::PipeTransport;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "canvas-bridge", version, about = "Serve a sandbox bridge over stdio")]
struct Args {
	/// Origin the Host posts from; stamped on every inbound frame.
	#[arg(long, default_value = "*")]
	parent_origin: String,

	/// URL of the document the bridge starts on.
	#[arg(long, default_value = "about:blank")]
	href: String,

	/// JSON bridge config (ceiling, rate limit, policies).
	#[arg(long, conflicts_with = "config_json")]
	config: Option<PathBuf>,

	/// Bridge config given inline as JSON.
	#[arg(long, value_name = "JSON")]
	config_json: Option<String>,

	/// Increase log verbosity (-v info, -vv debug)
	#[arg(short, long, action = clap::ArgAction::Count)]
	verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	init_logging(bridge_directives(args.verbose));

	let config = match (&args.config, &args.config_json) {
		(Some(path), _) => BridgeConfig::load(path).context("loading bridge config")?,
		(None, Some(json)) => serde_json::from_str(json).context("parsing --config-json")?,
		(None, None) => BridgeConfig::default(),
	};

	let document = dom::shared(MemoryDocument::for_url(&args.href));
	let bridge = Arc::new(SandboxBridge::builder().config(config).document(document).build());

	let (transport, inbox) = PipeTransport::new(tokio::io::stdout(), tokio::io::stdin(), args.parent_origin);
	bridge.serve(transport.into_transport_parts(inbox)).await;
	Ok(())
}
