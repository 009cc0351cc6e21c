use axum::extract::{FromRequestParts, Query};
use http::header::AUTHORIZATION;
use http::request::Parts;
use serde::Deserialize;

use common::auth::{Credentials, Identity};

use super::ApiError;
use crate::ServiceState;

#[derive(Debug, Deserialize)]
struct ApiKeyQuery {
    api_key: Option<String>,
}

/// Credentials presented with a request: an `Authorization` header, or
/// else an `api_key` query parameter.
pub fn request_credentials(parts: &Parts) -> Result<Credentials, ApiError> {
    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        return value
            .to_str()
            .ok()
            .and_then(Credentials::from_authorization)
            .ok_or(ApiError::MalformedAuthorization);
    }

    let api_key = Query::<ApiKeyQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(query)| query.api_key);
    Ok(api_key.map(Credentials::ApiKey).unwrap_or_default())
}

/// The identity a request is made by. Rejects with 401 when the
/// credentials are invalid, or missing while anonymous access is off.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

#[axum::async_trait]
impl FromRequestParts<ServiceState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        let credentials = request_credentials(parts)?;
        let identity = state.service().identify(&credentials)?;
        Ok(Caller(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(uri: &str, authorization: Option<&str>) -> Parts {
        let mut request = http::Request::builder().uri(uri);
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        request.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_request_credentials() {
        assert_eq!(
            request_credentials(&parts("/x", Some("Bearer abc"))).unwrap(),
            Credentials::Bearer("abc".into())
        );
        assert_eq!(
            request_credentials(&parts("/x", Some("apikey k1"))).unwrap(),
            Credentials::ApiKey("k1".into())
        );
        assert_eq!(
            request_credentials(&parts("/x?format=csv&api_key=k2", None)).unwrap(),
            Credentials::ApiKey("k2".into())
        );
        assert_eq!(
            request_credentials(&parts("/x", None)).unwrap(),
            Credentials::None
        );
        assert!(request_credentials(&parts("/x", Some("Basic dXNlcg=="))).is_err());
    }
}
