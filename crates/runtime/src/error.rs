//! Error types for the bridge runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by transports and the bridge process launcher.
///
/// Calls made through [`Connection`](crate::Connection) never surface these;
/// they are folded into `POST_FAIL` replies.
#[derive(Debug, Error)]
pub enum Error {
	/// `canvas-bridge` executable was not found.
	#[error("canvas-bridge executable not found. Set CANVAS_BRIDGE_BIN or install it on PATH")]
	BridgeNotFound,

	/// Failed to launch the bridge process.
	#[error("Failed to launch bridge process: {0}")]
	LaunchFailed(String),

	/// Transport-level error (framing, pipe I/O).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Peer announced a frame larger than the transport accepts.
	#[error("Frame of {0} bytes exceeds the transport limit")]
	FrameTooLarge(usize),

	/// The other end of the channel is gone.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if the peer is unreachable rather than misbehaving.
	pub fn is_closed(&self) -> bool {
		matches!(self, Error::ChannelClosed)
	}
}
