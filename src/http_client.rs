use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

/// Builds the single `reqwest::Client` shared by every outbound call to a
/// backend (C5). One connection pool for the whole process: a 5s connect
/// timeout bounds how long we wait for TCP+TLS setup, but there is no
/// blanket per-request timeout here — unary and streaming callers apply
/// their own lifetime/idle deadlines on top, since those differ by mode.
///
/// `reqwest` has no knob for a total cross-host connection ceiling, only
/// `pool_max_idle_per_host`; with at most four backend hosts (chat,
/// text2sql, embed, rerank) a per-host idle cap is the closest available
/// approximation of the configured total.
///
/// `Authorization: Bearer <backend_api_key>` is attached once as a default
/// header rather than per-call, since every backend call uses the same
/// shared credential.
pub fn build_http_client(backend_api_key: &str) -> reqwest::Client {
	let mut headers = HeaderMap::new();
	let mut auth_value = HeaderValue::from_str(&format!("Bearer {backend_api_key}")).expect("backend api key must be a valid header value");
	auth_value.set_sensitive(true);
	headers.insert(AUTHORIZATION, auth_value);

	reqwest::Client::builder()
		.default_headers(headers)
		.connect_timeout(Duration::from_secs(5))
		.pool_max_idle_per_host(800)
		.tcp_keepalive(Duration::from_secs(60))
		.build()
		.expect("reqwest client configuration is valid")
}
