//! Bridge Host for the sandboxed canvas.
//!
//! The Host owns session lifecycle and decides what the bridge may do:
//!
//! - [`BridgeHost`] opens, closes, navigates and restores sessions, and sends
//!   capability-scoped calls with the session token attached
//! - [`Session`] records (URL, token, grant, ceiling) persist through a
//!   [`StateStore`]; [`JsonFileStore`] keeps them owner-readable on disk
//! - a [`Surface`] hosts the bridge: [`InProcessSurface`] runs it as a task,
//!   [`ProcessSurface`] as a `canvas-bridge` child over stdio
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use canvas::{BridgeHost, HostConfig, InProcessSurface, MemoryStateStore, OpenOptions};
//!
//! let host = BridgeHost::new(
//!     HostConfig::default(),
//!     Arc::new(MemoryStateStore::default()),
//!     Arc::new(InProcessSurface::default()),
//! );
//! host.open("example.com", OpenOptions::default()).await;
//! assert_eq!(host.status(), "canvas active");
//! let reply = host.storage_get("theme").await;
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod session;
pub mod store;
pub mod surface;
pub mod url;

pub use canvas_protocol::{Capabilities, Capability, CapabilityPatch, ErrorCode, ErrorPayload, Reply};
pub use config::{DEFAULT_HOST_ORIGIN, HostConfig};
pub use error::{Error, Result};
pub use host::{BridgeHost, CallOptions, OpenOptions, status};
pub use session::{Session, SessionStore, SessionSummary};
pub use store::{JsonFileStore, MemoryStateStore, StateStore};
pub use surface::{InProcessSurface, ProcessSurface, Surface};
pub use crate::url::normalize_url;
