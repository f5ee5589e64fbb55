//! Wire types for the sandboxed canvas bridge.
//!
//! Shared by the Host and the Sandbox Bridge:
//!
//! - [`Envelope`] and [`Reply`]: the JSON message format and call outcomes
//! - [`Operation`]: the fixed allowlist, generated from one registry
//! - [`Capabilities`]: fixed-shape capability grants with never-widen patching
//! - [`ErrorCode`] / [`ErrorPayload`]: the error taxonomy
//! - [`clamp`]: size limits applied to everything that crosses the channel

pub mod capability;
pub mod clamp;
pub mod envelope;
pub mod error;
pub mod operation;

pub use capability::{Capabilities, Capability, CapabilityPatch};
pub use envelope::{ANY_ORIGIN, BRIDGE_READY, Envelope, EnvelopeError, OPAQUE_ORIGIN, PROTOCOL_VERSION, REPLY_ERR, REPLY_OK, Reply, now_millis};
pub use error::{ErrorCode, ErrorPayload};
pub use operation::Operation;
