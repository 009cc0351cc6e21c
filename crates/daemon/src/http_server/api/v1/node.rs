use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::HeaderMap;
use serde::Deserialize;

use common::mounts::segments;

use crate::http_server::api::{ApiError, Caller};
use crate::ServiceState;

#[derive(Debug, Default, Deserialize)]
pub struct FullQuery {
    /// A media type or one of its file extension aliases
    pub format: Option<String>,
}

/// The data at `path`, exported in the requested format, or else the
/// best match for the `Accept` header.
pub async fn full_handler(
    State(state): State<ServiceState>,
    Caller(identity): Caller,
    Path(path): Path<String>,
    Query(query): Query<FullQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let accept = headers.get(ACCEPT).and_then(|value| value.to_str().ok());
    let exported = state
        .service()
        .export(&identity, &segments(&path), query.format.as_deref(), accept)
        .await?;

    tracing::debug!(
        key = %exported.entry.key,
        media_type = %exported.media_type,
        bytes = exported.body.len(),
        "exported"
    );
    Ok((
        http::StatusCode::OK,
        [(CONTENT_TYPE, exported.media_type.to_string())],
        exported.body,
    )
        .into_response())
}
