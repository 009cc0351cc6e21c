use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;

use crate::ServiceState;

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ServiceState>) -> Response {
    let msg = serde_json::json!({
        "status": "ok",
        "uptime_seconds": state.uptime().as_secs(),
    });
    (StatusCode::OK, Json(msg)).into_response()
}
