//! Message transports between a Host and a Sandbox Bridge.
//!
//! Both ends see the channel the same way a window sees `postMessage`:
//! outbound messages are posted with a target origin, inbound messages arrive
//! as [`Delivery`] values stamped with the sender's origin. A post whose
//! target origin does not match the receiving end is dropped without error.
//!
//! - [`channel_pair`]: two in-process endpoints (tests, embedded bridges)
//! - [`PipeTransport`]: length-prefixed JSON over any `AsyncRead`/`AsyncWrite`
//!   pair, used to talk to a bridge running in a child process over stdio

mod pipe;

use std::sync::Arc;

use canvas_protocol::ANY_ORIGIN;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{Error, Result};

pub use pipe::{MAX_FRAME_BYTES, PipeTransport, PipeTransportReceiver, PipeTransportSender};

/// A message as received by one end of the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
	/// Origin of the sender, as asserted by the transport.
	pub origin: String,
	pub data: Value,
}

impl Delivery {
	pub fn new(origin: impl Into<String>, data: Value) -> Self {
		Self {
			origin: origin.into(),
			data,
		}
	}
}

/// Outbound half of a transport.
///
/// Posting is fire-and-forget. An error means the peer is gone, never that the
/// peer rejected the message.
pub trait Transport: Send + Sync {
	fn post(&self, message: Value, target_origin: &str) -> Result<()>;
}

/// Both halves of one endpoint, handed to whichever side owns it.
pub struct TransportParts {
	pub sender: Arc<dyn Transport>,
	pub inbox: mpsc::UnboundedReceiver<Delivery>,
}

impl std::fmt::Debug for TransportParts {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransportParts").finish_non_exhaustive()
	}
}

/// True when a post addressed to `target` may be delivered to `receiver`.
pub fn origin_matches(target: &str, receiver: &str) -> bool {
	target == ANY_ORIGIN || target == receiver
}

/// In-process endpoint created by [`channel_pair`].
#[derive(Debug, Clone)]
pub struct ChannelTransport {
	origin: String,
	peer_origin: String,
	tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelTransport {
	/// Origin this endpoint stamps on its deliveries.
	pub fn origin(&self) -> &str {
		&self.origin
	}
}

impl Transport for ChannelTransport {
	fn post(&self, message: Value, target_origin: &str) -> Result<()> {
		if !origin_matches(target_origin, &self.peer_origin) {
			tracing::debug!(
				target = "canvas::transport",
				target_origin,
				peer = %self.peer_origin,
				"dropping post for mismatched origin"
			);
			return Ok(());
		}
		self.tx
			.send(Delivery::new(self.origin.clone(), message))
			.map_err(|_| Error::ChannelClosed)
	}
}

/// Creates two connected endpoints.
///
/// Whatever the first endpoint posts arrives in the second endpoint's inbox
/// stamped with `a_origin`, and vice versa.
pub fn channel_pair(a_origin: impl Into<String>, b_origin: impl Into<String>) -> (TransportParts, TransportParts) {
	let a_origin = a_origin.into();
	let b_origin = b_origin.into();
	let (to_a, a_inbox) = mpsc::unbounded_channel();
	let (to_b, b_inbox) = mpsc::unbounded_channel();

	let a = TransportParts {
		sender: Arc::new(ChannelTransport {
			origin: a_origin.clone(),
			peer_origin: b_origin.clone(),
			tx: to_b,
		}),
		inbox: a_inbox,
	};
	let b = TransportParts {
		sender: Arc::new(ChannelTransport {
			origin: b_origin,
			peer_origin: a_origin,
			tx: to_a,
		}),
		inbox: b_inbox,
	};
	(a, b)
}

#[cfg(test)]
mod tests;
