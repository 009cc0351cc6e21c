use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

use common::prelude::build_info;
use common::tree::StructureFamily;

use crate::ServiceState;

pub const API_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
pub struct AboutResponse {
    pub api_version: u32,
    pub library_version: String,
    pub authentication: AuthenticationInfo,
    /// structure family -> media types it can be exported as
    pub formats: BTreeMap<StructureFamily, Vec<String>>,
    /// file extension -> media type, usable as `?format=`
    pub aliases: BTreeMap<String, String>,
    pub links: BTreeMap<&'static str, &'static str>,
}

#[derive(Debug, Serialize)]
pub struct AuthenticationInfo {
    /// whether requests without credentials are refused
    pub required: bool,
    /// username/password login at `auth/token`
    pub password: bool,
    pub api_key: bool,
}

/// Handshake describing what this server offers. Open to everyone.
#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ServiceState>) -> Response {
    let service = state.service();
    let auth = service.auth();
    let media_types = service.media_types();

    let formats = StructureFamily::EXPORTABLE
        .iter()
        .map(|family| (*family, media_types.media_types(*family)))
        .collect();

    let about = AboutResponse {
        api_version: API_VERSION,
        library_version: build_info().version,
        authentication: AuthenticationInfo {
            required: !auth.allows_anonymous(),
            password: auth.has_authenticator(),
            api_key: auth.settings().single_user_api_key.is_some(),
        },
        formats,
        aliases: media_types
            .extensions()
            .iter()
            .map(|(extension, media_type)| (extension.clone(), media_type.to_string()))
            .collect(),
        links: BTreeMap::from([
            ("entries", "/api/v1/entries/"),
            ("metadata", "/api/v1/metadata/"),
            ("full", "/api/v1/node/full/"),
            ("token", "/api/v1/auth/token"),
            ("whoami", "/api/v1/auth/whoami"),
        ]),
    };
    (StatusCode::OK, Json(about)).into_response()
}
