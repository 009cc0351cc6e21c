use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::http_server::api::ApiError;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

/// Log in with a username and password, starting a session.
#[axum::debug_handler]
pub async fn handler(
    State(state): State<ServiceState>,
    Json(req): Json<TokenRequest>,
) -> Result<Response, ApiError> {
    let tokens = state
        .service()
        .auth()
        .login(&req.username, &req.password)
        .await?;
    Ok((http::StatusCode::OK, Json(tokens)).into_response())
}
