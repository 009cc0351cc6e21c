use axum::routing::{get, post};
use axum::Router;

pub mod about;
pub mod auth;
pub mod entries;
pub mod metadata;
pub mod node;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/v1", get(about::handler))
        .route("/v1/", get(about::handler))
        .route("/v1/auth/token", post(auth::token::handler))
        .route("/v1/auth/session/refresh", post(auth::session::refresh_handler))
        .route("/v1/auth/session/revoke", post(auth::session::revoke_handler))
        .route("/v1/auth/whoami", get(auth::whoami::handler))
        .route("/v1/entries", get(entries::root_handler))
        .route("/v1/entries/", get(entries::root_handler))
        .route("/v1/entries/*path", get(entries::handler))
        .route("/v1/metadata", get(metadata::root_handler))
        .route("/v1/metadata/", get(metadata::root_handler))
        .route("/v1/metadata/*path", get(metadata::handler))
        .route("/v1/node/full/*path", get(node::full_handler))
        .with_state(state)
}
