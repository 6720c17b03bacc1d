use crate::backend::PoolName;

/// Whether a route's effective dispatch is decided per-request (by the
/// `stream` field in the body) or fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
	/// Parse the JSON body once; `stream === true` dispatches via C7,
	/// anything else via C6.
	StreamCapable,
	/// Always C6; any `stream` field in the payload is forwarded verbatim
	/// but otherwise ignored.
	Unary,
}

#[derive(Clone, Copy, Debug)]
pub struct Route {
	pub pool: PoolName,
	pub upstream_path: &'static str,
	pub mode: Mode,
}

/// The immutable public route table (C8): every proxied endpoint is a POST,
/// so this is the single source of truth for path → {pool, upstream path,
/// mode}. `build_router` in `lib.rs` iterates this table to wire the axum
/// `Router`, rather than re-declaring the same four routes inline, so the
/// two never drift apart.
pub const ROUTES: &[(&str, Route)] = &[
	(
		"/v1/chat/completions",
		Route {
			pool: PoolName::Chat,
			upstream_path: "/v1/chat/completions",
			mode: Mode::StreamCapable,
		},
	),
	(
		"/v1/text2sql",
		Route {
			pool: PoolName::Text2Sql,
			upstream_path: "/v1/chat/completions",
			mode: Mode::StreamCapable,
		},
	),
	(
		"/v1/embeddings",
		Route {
			pool: PoolName::Embed,
			upstream_path: "/v1/embeddings",
			mode: Mode::Unary,
		},
	),
	(
		"/v1/rerank",
		Route {
			pool: PoolName::Rerank,
			upstream_path: "/rerank",
			mode: Mode::Unary,
		},
	),
];

/// Looks up a POST route by public path; any other method or an unknown
/// path isn't a proxied route at all, and the caller should 404.
pub fn lookup(method: &axum::http::Method, path: &str) -> Option<Route> {
	if *method != axum::http::Method::POST {
		return None;
	}
	ROUTES.iter().find(|(route_path, _)| *route_path == path).map(|(_, route)| *route)
}

/// Reads the `stream` field out of a JSON payload without fully decoding
/// the body into a typed struct — the gateway forwards the bytes verbatim
/// and only ever needs this one field.
pub fn wants_stream(payload: &[u8]) -> bool {
	serde_json::from_slice::<serde_json::Value>(payload)
		.ok()
		.and_then(|v| v.get("stream").and_then(serde_json::Value::as_bool))
		.unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::Method;

	#[test]
	fn finds_known_routes() {
		let route = lookup(&Method::POST, "/v1/chat/completions").unwrap();
		assert_eq!(route.pool, PoolName::Chat);
		assert_eq!(route.mode, Mode::StreamCapable);

		let route = lookup(&Method::POST, "/v1/embeddings").unwrap();
		assert_eq!(route.pool, PoolName::Embed);
		assert_eq!(route.mode, Mode::Unary);
	}

	#[test]
	fn rejects_unknown_paths_and_methods() {
		assert!(lookup(&Method::POST, "/v1/unknown").is_none());
		assert!(lookup(&Method::GET, "/v1/chat/completions").is_none());
	}

	#[test]
	fn reads_stream_flag_from_payload() {
		assert!(wants_stream(br#"{"model":"x","stream":true}"#));
		assert!(!wants_stream(br#"{"model":"x","stream":false}"#));
		assert!(!wants_stream(br#"{"model":"x"}"#));
		assert!(!wants_stream(b"not json"));
	}
}
