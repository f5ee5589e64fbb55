//! `canvas` command line Host.
//!
//! Wraps [`canvas::BridgeHost`] with a JSON result envelope, XDG state
//! paths and a config file so sessions survive between invocations.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
