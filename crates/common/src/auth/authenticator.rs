use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use super::Principal;

/// Verifies a username and password.
///
/// Returns the authenticated principal, or `None` when the credentials
/// are not accepted. Implementations should not distinguish an unknown
/// user from a wrong password.
#[async_trait]
pub trait Authenticator: Send + Sync + Debug {
    async fn authenticate(&self, username: &str, password: &str) -> Option<Principal>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DictionaryAuthenticatorArgs {
    pub users_to_passwords: HashMap<String, String>,
}

/// Checks credentials against a fixed username -> password table.
///
/// Intended for tests and demos.
#[derive(Debug, Clone)]
pub struct DictionaryAuthenticator {
    users_to_passwords: HashMap<String, String>,
}

impl DictionaryAuthenticator {
    pub const IDENTIFIER: &'static str = "canopy.authenticators:DictionaryAuthenticator";

    pub fn new(users_to_passwords: HashMap<String, String>) -> Self {
        Self { users_to_passwords }
    }
}

impl From<DictionaryAuthenticatorArgs> for DictionaryAuthenticator {
    fn from(args: DictionaryAuthenticatorArgs) -> Self {
        Self::new(args.users_to_passwords)
    }
}

#[async_trait]
impl Authenticator for DictionaryAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> Option<Principal> {
        let expected = self.users_to_passwords.get(username)?;
        bool::from(expected.as_bytes().ct_eq(password.as_bytes()))
            .then(|| Principal::user(username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> DictionaryAuthenticator {
        DictionaryAuthenticator::new(HashMap::from([
            ("alice".to_string(), "secret1".to_string()),
            ("bob".to_string(), "secret2".to_string()),
        ]))
    }

    #[tokio::test]
    async fn test_accepts_matching_password() {
        let principal = authenticator().authenticate("alice", "secret1").await.unwrap();
        assert_eq!(principal.id, "alice");
    }

    #[tokio::test]
    async fn test_rejects_wrong_password_and_unknown_user() {
        let auth = authenticator();
        assert!(auth.authenticate("alice", "secret2").await.is_none());
        assert!(auth.authenticate("carol", "secret1").await.is_none());
        assert!(auth.authenticate("alice", "").await.is_none());
    }

    #[test]
    fn test_args_reject_unknown_fields() {
        let args = serde_json::json!({ "users_to_passwords": {}, "extra": 1 });
        assert!(serde_json::from_value::<DictionaryAuthenticatorArgs>(args).is_err());
    }
}
