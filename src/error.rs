use axum::body::Body;
use axum::http::{HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
	#[error("authentication required")]
	AuthMissing,

	#[error("invalid credentials")]
	AuthInvalid,

	#[error("request path not found")]
	NotFound,

	#[error("rate limit exceeded")]
	RateLimited,

	#[error("too many concurrent requests from this org IP")]
	ConcurrencyOverflow { retry_after_secs: u64 },

	#[error("request exceeded max lifetime")]
	LifetimeExceeded,

	#[error("upstream transport error: {0}")]
	UpstreamError(#[from] reqwest::Error),

	#[error("upstream returned malformed response")]
	UpstreamMalformed,

	#[error("request body was not valid JSON")]
	InvalidPayload(#[source] serde_json::Error),
}

#[derive(Serialize)]
struct ErrorBody {
	detail: String,
}

impl GatewayError {
	const fn status_code(&self) -> StatusCode {
		match self {
			Self::AuthMissing => StatusCode::UNAUTHORIZED,
			Self::AuthInvalid => StatusCode::FORBIDDEN,
			Self::NotFound => StatusCode::NOT_FOUND,
			Self::RateLimited | Self::ConcurrencyOverflow { .. } => StatusCode::TOO_MANY_REQUESTS,
			Self::LifetimeExceeded => StatusCode::GATEWAY_TIMEOUT,
			Self::UpstreamError(_) => StatusCode::BAD_GATEWAY,
			Self::UpstreamMalformed => StatusCode::BAD_GATEWAY,
			Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
		}
	}
}

impl IntoResponse for GatewayError {
	fn into_response(self) -> Response<Body> {
		let status = self.status_code();

		let retry_after = match &self {
			Self::RateLimited => Some(1),
			Self::ConcurrencyOverflow { retry_after_secs } => Some((*retry_after_secs).max(1)),
			_ => None,
		};

		if matches!(self, Self::UpstreamError(_)) {
			tracing::warn!(error = %self, "upstream transport error");
		}

		let detail = match &self {
			Self::AuthMissing | Self::AuthInvalid | Self::NotFound => None,
			Self::UpstreamError(e) => Some(format!("upstream error: {e}")),
			_ => Some(self.to_string()),
		};

		let mut response = match detail {
			Some(detail) => (status, Json(ErrorBody { detail })).into_response(),
			None => status.into_response(),
		};

		if let Some(secs) = retry_after {
			response.headers_mut().insert("Retry-After", HeaderValue::from_str(&secs.to_string()).expect("decimal seconds is a valid header value"));
		}

		response
	}
}
