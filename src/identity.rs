use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Derives the client-identity key (K) for admission bookkeeping.
///
/// Priority: leftmost `X-Forwarded-For` token, trimmed; else the peer socket
/// address; else the literal `"unknown"`. Trusting `X-Forwarded-For` is
/// intentional here — TLS termination and header rewriting are assumed to
/// happen in a fronting reverse proxy. Pure: no per-call allocation beyond
/// the returned `String`.
pub fn extract_client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
	if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
		if let Some(leftmost) = value.split(',').next() {
			let trimmed = leftmost.trim();
			if !trimmed.is_empty() {
				return trimmed.to_string();
			}
		}
	}

	match peer {
		Some(addr) => addr.to_string(),
		None => "unknown".to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::HeaderValue;

	fn addr() -> SocketAddr {
		"127.0.0.1:9999".parse().unwrap()
	}

	#[test]
	fn uses_leftmost_forwarded_for_token() {
		let mut headers = HeaderMap::new();
		headers.insert("x-forwarded-for", HeaderValue::from_static(" 10.0.0.5 , 10.0.0.1"));
		assert_eq!(extract_client_key(&headers, Some(addr())), "10.0.0.5");
	}

	#[test]
	fn falls_back_to_peer_addr() {
		let headers = HeaderMap::new();
		assert_eq!(extract_client_key(&headers, Some(addr())), "127.0.0.1:9999");
	}

	#[test]
	fn falls_back_to_unknown_literal() {
		let headers = HeaderMap::new();
		assert_eq!(extract_client_key(&headers, None), "unknown");
	}

	#[test]
	fn ignores_blank_forwarded_for_header() {
		let mut headers = HeaderMap::new();
		headers.insert("x-forwarded-for", HeaderValue::from_static("   "));
		assert_eq!(extract_client_key(&headers, Some(addr())), "127.0.0.1:9999");
	}
}
