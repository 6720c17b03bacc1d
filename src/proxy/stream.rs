use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::admission::AdmissionSlot;
use crate::error::GatewayError;

const CHANNEL_CAPACITY: usize = 32;

/// Forwards a streaming upstream response to the client as Server-Sent
/// Events (C7), the most delicate component in the gateway.
///
/// Two independent caps bound the stream: `lifetime` is a wall-clock
/// ceiling from the first byte sent upstream, `idle_timeout` bounds the gap
/// between consecutive upstream chunks. Either expiring ends the stream
/// cleanly — no truncation marker, just EOF — rather than erroring the
/// whole response, since by the time bytes are already flowing to the
/// client a 5xx can't be substituted in anymore.
///
/// Chunk boundaries from upstream are forwarded verbatim; nothing here
/// reframes or buffers across chunks, so `data: ...\n\n` records stay
/// intact. Dropping the returned body (client disconnect) drops the
/// receiver, which makes the forwarding task's next `tx.send` fail, which
/// ends the task and drops the upstream `reqwest::Response` — closing the
/// upstream socket without any extra bookkeeping.
///
/// This function itself only waits for the upstream response headers, not
/// for the stream to finish — the forwarding happens in a spawned task
/// that outlives this call. `slot` is therefore moved into that task
/// instead of being returned to the caller: the admission slot (and the
/// matching in-flight bookkeeping run via `on_finish`) must stay held for
/// the stream's whole lifetime, not just until headers come back, or a
/// single client could hold far more than `MAX_INFLIGHT_PER_IP` concurrent
/// generations. `on_finish` runs exactly once, whichever path this
/// function and the spawned task take to their end.
pub async fn proxy_stream(
	client: &reqwest::Client,
	upstream_url: &str,
	payload: Bytes,
	lifetime: Duration,
	idle_timeout: Duration,
	slot: AdmissionSlot,
	on_finish: impl FnOnce() + Send + 'static,
) -> Result<Response, GatewayError> {
	let upstream = match client.post(upstream_url).header("content-type", "application/json").body(payload).send().await {
		Ok(upstream) => upstream,
		Err(transport_err) => {
			on_finish();
			return Err(GatewayError::UpstreamError(transport_err));
		}
	};

	let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

	let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(CHANNEL_CAPACITY);

	tokio::spawn(async move {
		let _slot = slot;
		let mut body = upstream.bytes_stream();
		let start = Instant::now();

		loop {
			if start.elapsed() > lifetime {
				break;
			}

			let next = match tokio::time::timeout(idle_timeout, body.next()).await {
				Ok(Some(Ok(chunk))) => chunk,
				Ok(Some(Err(_transport_err))) => break,
				Ok(None) => break,
				Err(_idle_elapsed) => break,
			};

			if tx.send(Ok(next)).await.is_err() {
				break;
			}
		}

		on_finish();
	});

	let body = Body::from_stream(ReceiverStream::new(rx));

	let response = Response::builder()
		.status(status)
		.header(header::CONTENT_TYPE, "text/event-stream")
		.header(header::CACHE_CONTROL, "no-cache")
		.body(body)
		.expect("static headers and streaming body always build a valid response");

	Ok(response.into_response())
}
