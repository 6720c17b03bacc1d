use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::instrument;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthBody {
	ok: bool,
	chat_backends: usize,
}

/// `GET /health` (C11). Unauthenticated, outside the admission pipeline.
/// Reads the backend registry's in-memory counters only — never probes a
/// backend synchronously — so it responds in well under the ~100ms budget
/// regardless of upstream health.
#[instrument(name = "health", skip_all)]
pub async fn health(State(state): State<AppState>) -> Json<HealthBody> {
	Json(HealthBody {
		ok: true,
		chat_backends: state.backends.chat_backend_count(),
	})
}
