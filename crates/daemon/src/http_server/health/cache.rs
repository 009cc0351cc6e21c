use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

use common::cache::CacheStats;

use crate::ServiceState;

#[derive(Debug, Serialize)]
pub struct CacheReport {
    pub enabled: bool,
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
    /// seconds since the least recently used entry was touched
    pub oldest_entry_age: Option<f64>,
}

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ServiceState>) -> Response {
    let cache = state.service().cache();
    let stats = cache.stats();
    let report = CacheReport {
        enabled: cache.is_enabled(),
        hit_rate: stats.hit_rate(),
        stats,
        oldest_entry_age: cache.oldest_entry_age(),
    };
    (StatusCode::OK, Json(report)).into_response()
}
