use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::WWW_AUTHENTICATE;
use http::StatusCode;

use common::auth::AuthError;
use common::service::RequestError;

/// Any failure of an API request, rendered as `{"detail": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("malformed Authorization header; expected `Bearer <token>` or `Apikey <key>`")]
    MalformedAuthorization,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(AuthError::Authentication(_) | AuthError::InvalidToken(_))
            | ApiError::MalformedAuthorization => StatusCode::UNAUTHORIZED,
            ApiError::Auth(AuthError::Configuration(_) | AuthError::Signing(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Request(RequestError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Request(RequestError::UnsupportedFormat(_)) => StatusCode::NOT_ACCEPTABLE,
            ApiError::Request(RequestError::Tree(_) | RequestError::Export(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        if status == StatusCode::UNAUTHORIZED {
            (status, [(WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
