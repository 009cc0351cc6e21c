use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::http_server::api::ApiError;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Exchange a refresh token for a fresh token pair in the same session.
#[axum::debug_handler]
pub async fn refresh_handler(
    State(state): State<ServiceState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Response, ApiError> {
    let tokens = state.service().auth().refresh(&req.refresh_token)?;
    Ok((http::StatusCode::OK, Json(tokens)).into_response())
}

/// End the session the refresh token belongs to.
#[axum::debug_handler]
pub async fn revoke_handler(
    State(state): State<ServiceState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Response, ApiError> {
    state.service().auth().revoke(&req.refresh_token)?;
    Ok(http::StatusCode::NO_CONTENT.into_response())
}
