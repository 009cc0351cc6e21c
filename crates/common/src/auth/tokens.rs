//! Signed access and refresh tokens.
//!
//! Tokens are HS256 JWTs. The first configured secret key signs; every key
//! verifies, so keys can be rotated by prepending a new one and dropping
//! the old one once outstanding tokens have expired.

use std::collections::HashSet;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuthError, TokenRejection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// principal id
    pub sub: String,
    /// session id
    pub sid: Uuid,
    pub typ: TokenType,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: Vec<DecodingKey>,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("keys", &self.decoding.len())
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret_keys: &[String]) -> Result<Self, AuthError> {
        let signing = secret_keys
            .first()
            .ok_or_else(|| AuthError::Configuration("at least one secret key is required".into()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked against the injected clock, not the wall clock
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        Ok(Self {
            encoding: EncodingKey::from_secret(signing.as_bytes()),
            decoding: secret_keys
                .iter()
                .map(|key| DecodingKey::from_secret(key.as_bytes()))
                .collect(),
            validation,
        })
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify signature and type, without looking at expiry.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, TokenRejection> {
        let mut rejection = TokenRejection::BadSignature;
        for key in &self.decoding {
            match jsonwebtoken::decode::<Claims>(token, key, &self.validation) {
                Ok(data) if data.claims.typ == expected => return Ok(data.claims),
                Ok(_) => return Err(TokenRejection::WrongType),
                Err(e) => match e.kind() {
                    ErrorKind::InvalidSignature => continue,
                    _ => {
                        rejection = TokenRejection::Malformed;
                        break;
                    }
                },
            }
        }
        Err(rejection)
    }

    /// Verify a token and require `now < exp`.
    pub fn decode(&self, token: &str, expected: TokenType, now: i64) -> Result<Claims, TokenRejection> {
        let claims = self.verify(token, expected)?;
        if now >= claims.exp {
            return Err(TokenRejection::Expired);
        }
        Ok(claims)
    }
}

/// A fresh 32-byte secret, hex encoded.
pub fn generate_secret() -> Result<String, AuthError> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| AuthError::Configuration(format!("failed to generate random bytes: {e}")))?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(typ: TokenType, exp: i64) -> Claims {
        Claims {
            sub: "alice".into(),
            sid: Uuid::new_v4(),
            typ,
            iat: 1_000,
            exp,
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = TokenCodec::new(&["k1".to_string()]).unwrap();
        let token = codec.encode(&claims(TokenType::Access, 1_900)).unwrap();

        assert!(codec.decode(&token, TokenType::Access, 1_899).is_ok());
        assert_eq!(
            codec.decode(&token, TokenType::Access, 1_900),
            Err(TokenRejection::Expired)
        );
        assert_eq!(
            codec.decode(&token, TokenType::Access, 1_901),
            Err(TokenRejection::Expired)
        );
    }

    #[test]
    fn test_type_is_enforced() {
        let codec = TokenCodec::new(&["k1".to_string()]).unwrap();
        let token = codec.encode(&claims(TokenType::Refresh, 5_000)).unwrap();
        assert_eq!(
            codec.decode(&token, TokenType::Access, 1_000),
            Err(TokenRejection::WrongType)
        );
    }

    #[test]
    fn test_rotated_keys_still_verify() {
        let old = TokenCodec::new(&["old".to_string()]).unwrap();
        let token = old.encode(&claims(TokenType::Access, 5_000)).unwrap();

        let rotated = TokenCodec::new(&["new".to_string(), "old".to_string()]).unwrap();
        assert!(rotated.decode(&token, TokenType::Access, 1_000).is_ok());

        let dropped = TokenCodec::new(&["new".to_string()]).unwrap();
        assert_eq!(
            dropped.decode(&token, TokenType::Access, 1_000),
            Err(TokenRejection::BadSignature)
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let codec = TokenCodec::new(&["k1".to_string()]).unwrap();
        assert_eq!(
            codec.decode("not-a-jwt", TokenType::Access, 0),
            Err(TokenRejection::Malformed)
        );
    }

    #[test]
    fn test_requires_a_key() {
        assert!(TokenCodec::new(&[]).is_err());
        assert_eq!(generate_secret().unwrap().len(), 64);
    }
}
