//! Target URL normalization.

use url::Url;

/// Longest accepted input, after trimming.
pub const MAX_URL_LEN: usize = 4_096;

/// Turns user input into an absolute URL, or `None` if it cannot be one.
///
/// Bare hosts get `https://`; only `http`, `https` and `about` are accepted.
pub fn normalize_url(input: &str) -> Option<String> {
	let trimmed = input.trim();
	if trimmed.is_empty() || trimmed.chars().count() > MAX_URL_LEN {
		return None;
	}

	let candidate = if trimmed.contains("://") || trimmed.get(..6).is_some_and(|p| p.eq_ignore_ascii_case("about:")) {
		trimmed.to_string()
	} else {
		format!("https://{trimmed}")
	};

	let url = Url::parse(&candidate).ok()?;
	match url.scheme() {
		"http" | "https" | "about" => Some(url.to_string()),
		_ => None,
	}
}
