//! Sandbox Bridge - the child side of the canvas channel
//!
//! A [`SandboxBridge`] receives Host requests over a transport, validates each
//! one, and runs the smallest permitted operation against the nested content:
//!
//! - **Admission**: rate limiting, origin pinning, shape checks, the operation
//!   allowlist, and the session token, in that order
//! - **Capabilities**: every non-lifecycle operation needs its grant
//! - **Handlers**: DOM access through [`Document`], key/value [`storage`],
//!   [`fetch`] with a header allowlist, registered [`scripts`], and [`console`]
//!   passthrough
//!
//! Nothing a handler does can take the serving loop down; failures and panics
//! come back to the Host as `err` replies.

pub mod bridge;
pub mod config;
pub mod console;
pub mod dom;
pub mod error;
pub mod fetch;
mod handlers;
pub mod hardening;
pub mod logging;
pub mod rate;
pub mod scripts;
pub mod storage;

pub use bridge::{Admission, Admitted, BridgeBuilder, READY_NOTE, SandboxBridge};
pub use config::{BridgeConfig, RateLimit};
pub use console::{ConsoleLevel, ConsoleSink, RecordingConsole, TracingConsole};
pub use dom::{Document, MemoryDocument, NodeSnapshot, Selector, SharedDocument};
pub use error::{Error, Result};
pub use fetch::{FetchError, FetchRequest, FetchResponse, Fetcher, ReqwestFetcher};
pub use hardening::{GlobalScope, HardeningReport, MemoryScope};
pub use scripts::{ECHO_SCRIPT, ScriptRegistry};
pub use storage::{KeyValueStore, MemoryStore};
