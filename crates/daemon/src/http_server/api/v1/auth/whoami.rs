use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::auth::PrincipalKind;

use crate::http_server::api::Caller;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    /// `None` for anonymous requests
    pub username: Option<String>,
    pub kind: Option<PrincipalKind>,
}

pub async fn handler(Caller(identity): Caller) -> Response {
    let principal = identity.principal();
    let whoami = WhoAmIResponse {
        username: principal.map(|p| p.id.clone()),
        kind: principal.map(|p| p.kind),
    };
    (http::StatusCode::OK, Json(whoami)).into_response()
}
