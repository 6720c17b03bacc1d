use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::net::SocketAddr;
use tracing::instrument;

use crate::admission::AdmissionSlot;
use crate::error::GatewayError;
use crate::identity::extract_client_key;
use crate::metrics::{CONCURRENCY_REJECTIONS, INFLIGHT_REQUESTS, RATE_LIMIT_REJECTIONS};
use crate::proxy::{stream, unary};
use crate::router::{wants_stream, Mode, Route};
use crate::state::AppState;

fn pool_label(route: &Route) -> &'static str {
	match route.pool {
		crate::backend::PoolName::Chat => "chat",
		crate::backend::PoolName::Text2Sql => "text2sql",
		crate::backend::PoolName::Embed => "embed",
		crate::backend::PoolName::Rerank => "rerank",
	}
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<(), GatewayError> {
	let value = headers.get(axum::http::header::AUTHORIZATION).ok_or(GatewayError::AuthMissing)?;
	let value = value.to_str().map_err(|_| GatewayError::AuthInvalid)?;
	let token = value.strip_prefix("Bearer ").ok_or(GatewayError::AuthInvalid)?;

	if token == state.config.gateway_api_key {
		Ok(())
	} else {
		Err(GatewayError::AuthInvalid)
	}
}

/// The admission orchestrator (C9): composes C1–C3 in front of C8/C4 and
/// dispatch to C6/C7, guaranteeing the admission slot is released on every
/// exit path via `AdmissionSlot`'s `Drop`.
///
/// For a unary response that release happens right here in `dispatch`, once
/// the whole response body has been relayed. A streaming response is
/// different: this handler returns as soon as `proxy_stream` has the
/// upstream response headers, long before the SSE forwarding itself is
/// done, so `dispatch` hands the slot (and the in-flight gauge's matching
/// decrement) to the spawned forwarding task instead — releasing it here
/// would undercount the request's concurrency footprint for as long as
/// `MAX_REQUEST_SECS`.
///
/// Bound into the router per-route via a closure (see `lib.rs`), since
/// `route` is fixed per endpoint rather than extracted from the request.
#[instrument(name = "proxy", skip(route, state, headers, body), fields(pool = pool_label(&route)))]
pub async fn handle_proxied(route: Route, state: AppState, peer: SocketAddr, headers: HeaderMap, body: Bytes) -> Result<Response, GatewayError> {
	authenticate(&state, &headers)?;

	let key = extract_client_key(&headers, Some(peer));
	let pool = pool_label(&route);

	if !state.rate_limiter.check(&key).await {
		RATE_LIMIT_REJECTIONS.with_label_values(&[pool]).inc();
		return Err(GatewayError::RateLimited);
	}

	let slot = match state.admission.acquire(&key).await {
		Ok(slot) => slot,
		Err(err) => {
			CONCURRENCY_REJECTIONS.with_label_values(&[pool]).inc();
			return Err(err);
		}
	};
	state.touch(&key);
	INFLIGHT_REQUESTS.with_label_values(&[pool]).inc();

	dispatch(&route, &state, &key, pool, body, slot).await
}

async fn dispatch(route: &Route, state: &AppState, key: &str, pool: &'static str, body: Bytes, slot: AdmissionSlot) -> Result<Response, GatewayError> {
	let base_url = state.backends.choose(route.pool)?;
	let upstream_url = format!("{}{}", base_url.trim_end_matches('/'), route.upstream_path);

	let use_stream = matches!(route.mode, Mode::StreamCapable) && wants_stream(&body);

	if use_stream {
		let finish_state = state.clone();
		let finish_key = key.to_string();
		let on_finish = move || {
			INFLIGHT_REQUESTS.with_label_values(&[pool]).dec();
			finish_state.touch(&finish_key);
		};

		stream::proxy_stream(&state.http_client, &upstream_url, body, state.config.max_request_lifetime(), state.config.stream_idle_timeout(), slot, on_finish).await
	} else {
		let result = unary::proxy_unary(&state.http_client, &upstream_url, body, state.config.max_request_lifetime()).await;

		INFLIGHT_REQUESTS.with_label_values(&[pool]).dec();
		drop(slot);
		state.touch(key);

		result
	}
}

pub async fn not_found() -> Response {
	GatewayError::NotFound.into_response()
}
