mod authenticator;
mod clock;
mod manager;
mod session;
mod tokens;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use authenticator::{Authenticator, DictionaryAuthenticator, DictionaryAuthenticatorArgs};
pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{AuthManager, AuthSettings};
pub use session::{Session, SessionStore};
pub use tokens::{generate_secret, Claims, TokenCodec, TokenType};

/// Principal used for requests authenticated with the single-user API key.
pub const SINGLE_USER_PRINCIPAL: &str = "single_user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// Logged in through the authenticator
    User,
    /// Holder of the single-user API key
    SingleUser,
}

/// An authenticated party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub kind: PrincipalKind,
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: PrincipalKind::User,
        }
    }

    pub fn single_user() -> Self {
        Self {
            id: SINGLE_USER_PRINCIPAL.to_string(),
            kind: PrincipalKind::SingleUser,
        }
    }

    pub fn is_single_user(&self) -> bool {
        self.kind == PrincipalKind::SingleUser
    }
}

/// Who a request is made by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User(Principal),
}

impl Identity {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Identity::Anonymous => None,
            Identity::User(principal) => Some(principal),
        }
    }
}

/// Credentials presented with a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    #[default]
    None,
    Bearer(String),
    ApiKey(String),
}

impl Credentials {
    /// Parse an `Authorization` header value (`Bearer <token>` or
    /// `Apikey <key>`; the scheme is case-insensitive).
    pub fn from_authorization(value: &str) -> Option<Self> {
        let (scheme, credential) = value.trim().split_once(' ')?;
        let credential = credential.trim();
        if credential.is_empty() {
            return None;
        }
        if scheme.eq_ignore_ascii_case("bearer") {
            Some(Credentials::Bearer(credential.to_string()))
        } else if scheme.eq_ignore_ascii_case("apikey") {
            Some(Credentials::ApiKey(credential.to_string()))
        } else {
            None
        }
    }
}

/// Response to a successful login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// seconds until the access token expires
    pub expires_in: i64,
    /// seconds until the refresh token expires
    pub refresh_token_expires_in: i64,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    #[error("token has expired")]
    Expired,
    #[error("token signature is not valid")]
    BadSignature,
    #[error("token could not be decoded")]
    Malformed,
    #[error("token is of the wrong type")]
    WrongType,
    #[error("session has expired")]
    SessionExpired,
    #[error("session does not exist or was revoked")]
    UnknownSession,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenRejection),
    #[error("authentication is misconfigured: {0}")]
    Configuration(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_authorization() {
        assert_eq!(
            Credentials::from_authorization("Bearer abc.def"),
            Some(Credentials::Bearer("abc.def".into()))
        );
        assert_eq!(
            Credentials::from_authorization("apikey  secret "),
            Some(Credentials::ApiKey("secret".into()))
        );
        assert_eq!(Credentials::from_authorization("Basic Zm9v"), None);
        assert_eq!(Credentials::from_authorization("Bearer"), None);
    }
}
