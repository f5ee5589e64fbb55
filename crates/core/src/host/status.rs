//! Status lines the Host reports for user-visible outcomes.
//!
//! These are for people. Anything that needs to branch on an outcome should
//! use the [`Reply`](canvas_protocol::Reply) codes instead.

use canvas_protocol::{Capability, ErrorCode};

pub const LOADING: &str = "loading canvas…";
pub const ACTIVE: &str = "canvas active";
pub const CLOSED: &str = "canvas closed (session saved)";
pub const OPEN: &str = "canvas open";
pub const NAVIGATED: &str = "navigated";
pub const NAV_FAILED: &str = "nav failed";
pub const BAD_URL: &str = "bad url";
pub const CAPABILITIES_UPDATED: &str = "capabilities updated";
/// Prefix of every [`init_error`] line.
pub const INIT_ERROR: &str = "canvas init error";

/// Longest status line kept.
pub const MAX_STATUS: usize = 2_000;

pub fn bridge_ready(href: &str) -> String {
	format!("canvas bridge ready ({href})")
}

pub fn init_error(code: ErrorCode) -> String {
	format!("{INIT_ERROR}: {code}")
}

pub fn capability_denied(cap: Capability) -> String {
	format!("capability denied: {cap}")
}

/// True for status lines that report a failed load, handshake or `init`.
pub fn is_init_error(status: &str) -> bool {
	status.starts_with(INIT_ERROR)
}
