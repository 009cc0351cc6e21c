use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::mounts::segments;
use common::tree::Entry;

use crate::http_server::api::{ApiError, Caller};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataResponse {
    pub data: Entry,
}

pub async fn root_handler(
    State(state): State<ServiceState>,
    Caller(identity): Caller,
) -> Result<Response, ApiError> {
    let data = state.service().metadata(&identity, &[]).await?;
    Ok((http::StatusCode::OK, Json(MetadataResponse { data })).into_response())
}

pub async fn handler(
    State(state): State<ServiceState>,
    Caller(identity): Caller,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let data = state.service().metadata(&identity, &segments(&path)).await?;
    Ok((http::StatusCode::OK, Json(MetadataResponse { data })).into_response())
}
