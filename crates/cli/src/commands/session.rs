use canvas::{BridgeHost, OpenOptions};
use serde_json::json;

use super::{check_init, emit};
use crate::error::{CliError, Result};
use crate::output::{OutputFormat, SessionData, SessionsData};

fn session_data(host: &BridgeHost) -> SessionData {
	let session = host.active_session();
	SessionData {
		session_id: session.as_ref().map(|s| s.id.clone()),
		url: session.as_ref().map(|s| s.url.clone()),
		open: session.is_some_and(|s| s.open),
		ready: host.is_ready(),
	}
}

pub async fn open(host: &BridgeHost, url: String, session: Option<String>, format: OutputFormat) -> Result<()> {
	let options = session.clone().map(OpenOptions::reuse).unwrap_or_default();
	if host.open(&url, options).await.is_none() {
		return Err(CliError::BadUrl(url));
	}
	check_init(host)?;
	emit("open", json!({ "url": url, "session": session }), session_data(host), host, format);
	Ok(())
}

pub fn close(host: &BridgeHost, format: OutputFormat) -> Result<()> {
	host.close();
	emit("close", json!({}), session_data(host), host, format);
	Ok(())
}

pub async fn reopen(host: &BridgeHost, format: OutputFormat) -> Result<()> {
	if !host.reopen().await {
		return Err(CliError::NoSession);
	}
	check_init(host)?;
	emit("reopen", json!({}), session_data(host), host, format);
	Ok(())
}

pub async fn navigate(host: &BridgeHost, url: String, format: OutputFormat) -> Result<()> {
	if !host.navigate(&url).await {
		return Err(CliError::BadUrl(url));
	}
	check_init(host)?;
	emit("navigate", json!({ "url": url }), session_data(host), host, format);
	Ok(())
}

pub async fn restore(host: &BridgeHost, format: OutputFormat) -> Result<()> {
	if !host.restore().await {
		return Err(CliError::NoSession);
	}
	check_init(host)?;
	emit("restore", json!({}), session_data(host), host, format);
	Ok(())
}

pub fn list(host: &BridgeHost, format: OutputFormat) -> Result<()> {
	let data = SessionsData {
		active_id: host.active_session().map(|s| s.id),
		sessions: host.list_sessions(),
	};
	emit("sessions", json!({}), data, host, format);
	Ok(())
}
