use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::time::Duration;

use crate::error::GatewayError;

/// Forwards one request/response pair to `upstream_url` (C6).
///
/// The whole call — connect, send, and wait for the response body — is
/// wrapped in a single `lifetime` deadline, measured once from the start of
/// the call rather than as two independent per-step timeouts (a
/// slow-but-responding upstream must not be able to take up to `2 *
/// lifetime` to fail). The upstream status code and body are relayed
/// unchanged; the gateway never re-encodes the JSON it passes through.
pub async fn proxy_unary(client: &reqwest::Client, upstream_url: &str, payload: Bytes, lifetime: Duration) -> Result<Response, GatewayError> {
	let call = async {
		let response = client.post(upstream_url).header("content-type", "application/json").body(payload).send().await?;
		let status = response.status();
		let body = response.bytes().await?;
		Ok::<_, reqwest::Error>((status, body))
	};

	match tokio::time::timeout(lifetime, call).await {
		Ok(Ok((status, body))) => {
			let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
			Ok((status, body).into_response())
		}
		Ok(Err(transport_err)) => Err(GatewayError::UpstreamError(transport_err)),
		Err(_elapsed) => Err(GatewayError::LifetimeExceeded),
	}
}
