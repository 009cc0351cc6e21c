use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::mounts::segments;
use common::tree::Entry;

use crate::http_server::api::{ApiError, Caller};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntriesResponse {
    pub path: String,
    pub data: Vec<Entry>,
}

pub async fn root_handler(state: State<ServiceState>, caller: Caller) -> Result<Response, ApiError> {
    list(state, caller, String::new()).await
}

pub async fn handler(
    state: State<ServiceState>,
    caller: Caller,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    list(state, caller, path).await
}

/// Children of the container at `path` that the caller may see.
async fn list(
    State(state): State<ServiceState>,
    Caller(identity): Caller,
    path: String,
) -> Result<Response, ApiError> {
    let path = segments(&path);
    let data = state.service().list(&identity, &path).await?;
    let response = EntriesResponse {
        path: format!("/{}", path.join("/")),
        data,
    };
    Ok((http::StatusCode::OK, Json(response)).into_response())
}
