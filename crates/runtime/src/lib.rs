//! Canvas Runtime - transports, bridge process, and request correlation
//!
//! This crate provides the plumbing between a Host and a Sandbox Bridge:
//!
//! - **Transport**: origin-stamped message delivery, in-process or over a pipe
//! - **Connection**: request/response correlation, timeouts, ready broadcast
//! - **Driver**: locating and launching the `canvas-bridge` child process
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ canvas-core  │  BridgeHost, sessions, surfaces
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │canvas-runtime│  This crate
//! │  ┌────────┐  │
//! │  │ Conn   │  │  reqId correlation
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  channel pair / pipe
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Driver │  │  bridge child process
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod connection;
pub mod driver;
pub mod error;
pub mod transport;

pub use connection::{
	Connection, DEFAULT_CALL_TIMEOUT, INIT_TIMEOUT, MAX_CALL_TIMEOUT, MIN_CALL_TIMEOUT, clamp_timeout,
};
pub use driver::{BRIDGE_BIN_ENV, BridgeProcess, get_bridge_executable};
pub use error::{Error, Result};
pub use transport::{
	ChannelTransport, Delivery, PipeTransport, PipeTransportReceiver, PipeTransportSender, Transport,
	TransportParts, channel_pair, origin_matches,
};
