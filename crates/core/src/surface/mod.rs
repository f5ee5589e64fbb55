//! Child contexts the Host can load a bridge into.
//!
//! A [`Surface`] owns the bridge side of the channel. The Host only ever
//! receives its own endpoint from [`Surface::load`].

mod in_process;
mod process;

use async_trait::async_trait;
use canvas_protocol::OPAQUE_ORIGIN;
use canvas_runtime::TransportParts;

pub use in_process::InProcessSurface;
pub use process::ProcessSurface;

use crate::error::Result;

#[async_trait]
pub trait Surface: Send + Sync {
	/// Replaces whatever is loaded with a fresh bridge on `url`.
	///
	/// `host_origin` is the origin the bridge will see on Host messages.
	async fn load(&self, url: &str, host_origin: &str) -> Result<TransportParts>;

	/// Tears down the loaded bridge, if any.
	async fn unload(&self);

	fn show(&self);
	fn hide(&self);
	fn is_visible(&self) -> bool;

	/// Points the loaded content at `url` without restarting the bridge.
	fn navigate_in_place(&self, url: &str) -> Result<()>;

	/// Origin stamped on messages coming out of the bridge.
	fn bridge_origin(&self) -> &str {
		OPAQUE_ORIGIN
	}
}
