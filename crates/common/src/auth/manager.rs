use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use subtle::ConstantTimeEq;

use super::session::{expiry_after, Session, SessionStore};
use super::tokens::{generate_secret, Claims, TokenCodec, TokenType};
use super::{
    AuthError, Authenticator, Clock, Credentials, Identity, Principal, TokenPair, TokenRejection,
};

/// Token and session lifetimes, and the ways in that do not need a login.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// First key signs; all keys verify. Empty means generate one.
    pub secret_keys: Vec<String>,
    pub allow_anonymous_access: bool,
    pub single_user_api_key: Option<String>,
    pub access_token_max_age: Duration,
    pub refresh_token_max_age: Duration,
    /// `None` means sessions can be refreshed indefinitely.
    pub session_max_age: Option<Duration>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            secret_keys: Vec::new(),
            allow_anonymous_access: false,
            single_user_api_key: None,
            access_token_max_age: Duration::seconds(900),
            refresh_token_max_age: Duration::seconds(604_800),
            session_max_age: None,
        }
    }
}

/// Issues, validates and expires tokens and sessions.
#[derive(Debug)]
pub struct AuthManager {
    authenticator: Option<Arc<dyn Authenticator>>,
    settings: AuthSettings,
    codec: TokenCodec,
    sessions: SessionStore,
    clock: Arc<dyn Clock>,
}

impl AuthManager {
    pub fn new(
        mut settings: AuthSettings,
        authenticator: Option<Arc<dyn Authenticator>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        if settings.secret_keys.is_empty() {
            // tokens will not survive a restart
            tracing::info!("no secret keys configured; generated a random one");
            settings.secret_keys.push(generate_secret()?);
        }
        let codec = TokenCodec::new(&settings.secret_keys)?;

        Ok(Self {
            authenticator,
            settings,
            codec,
            sessions: SessionStore::new(),
            clock,
        })
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn has_authenticator(&self) -> bool {
        self.authenticator.is_some()
    }

    pub fn allows_anonymous(&self) -> bool {
        self.settings.allow_anonymous_access
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, session_id: &uuid::Uuid) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.lock().clone())
    }

    /// Verify a username and password and open a session.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let authenticator = self.authenticator.as_ref().ok_or_else(|| {
            AuthError::Authentication("this server does not accept username/password logins".into())
        })?;

        let principal = authenticator
            .authenticate(username, password)
            .await
            .ok_or_else(|| {
                tracing::info!(username, "login rejected");
                AuthError::Authentication("incorrect username or password".into())
            })?;

        let now = self.clock.now();
        let session = Session::start(principal, now, self.settings.session_max_age)?;
        let tokens = self.issue(&session, now)?;
        tracing::info!(
            principal = %session.principal.id,
            session_id = %session.session_id,
            "session started"
        );
        self.sessions.insert(session);
        Ok(tokens)
    }

    /// Exchange a refresh token for a new token pair.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let now = self.clock.now();
        let claims = self
            .codec
            .decode(refresh_token, TokenType::Refresh, now.timestamp())?;

        let session = self
            .sessions
            .get(&claims.sid)
            .ok_or(TokenRejection::UnknownSession)?;

        let tokens = {
            let mut session = session.lock();
            if session.is_expired(now, self.settings.refresh_token_max_age) {
                None
            } else {
                session.last_refreshed_at = now;
                Some(self.issue(&session, now)?)
            }
        };

        // the per-session lock is released before touching the store
        match tokens {
            Some(tokens) => Ok(tokens),
            None => {
                self.sessions.remove(&claims.sid);
                tracing::info!(session_id = %claims.sid, "refresh rejected: session expired");
                Err(TokenRejection::SessionExpired.into())
            }
        }
    }

    /// End the session a refresh token belongs to. Revoking an unknown or
    /// already revoked session succeeds.
    pub fn revoke(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self.codec.verify(refresh_token, TokenType::Refresh)?;
        if self.sessions.remove(&claims.sid) {
            tracing::info!(session_id = %claims.sid, "session revoked");
        }
        Ok(())
    }

    /// Derive the identity behind a request.
    pub fn identify(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        match credentials {
            Credentials::ApiKey(key) => match &self.settings.single_user_api_key {
                Some(expected) if bool::from(expected.as_bytes().ct_eq(key.as_bytes())) => {
                    Ok(Identity::User(Principal::single_user()))
                }
                _ => Err(AuthError::Authentication("invalid API key".into())),
            },
            Credentials::Bearer(token) => {
                let claims = self.codec.decode(
                    token,
                    TokenType::Access,
                    self.clock.now().timestamp(),
                )?;
                Ok(Identity::User(Principal::user(claims.sub)))
            }
            Credentials::None if self.settings.allow_anonymous_access => Ok(Identity::Anonymous),
            Credentials::None => Err(AuthError::Authentication(
                "credentials are required".into(),
            )),
        }
    }

    /// Remove sessions whose lifetime or refresh window has lapsed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let refresh_max_age = self.settings.refresh_token_max_age;
        let removed = self
            .sessions
            .retain_live(|session| session.is_expired(now, refresh_max_age));
        if removed > 0 {
            tracing::debug!(removed, "purged expired sessions");
        }
        removed
    }

    fn issue(&self, session: &Session, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let cap = |at: DateTime<Utc>| match session.expires_at {
            Some(expires_at) => at.min(expires_at),
            None => at,
        };
        let access_exp = cap(expiry_after(
            now,
            self.settings.access_token_max_age,
            "access_token_max_age",
        )?);
        let refresh_exp = cap(expiry_after(
            now,
            self.settings.refresh_token_max_age,
            "refresh_token_max_age",
        )?);

        let claims = |typ, exp: DateTime<Utc>| Claims {
            sub: session.principal.id.clone(),
            sid: session.session_id,
            typ,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        Ok(TokenPair {
            access_token: self.codec.encode(&claims(TokenType::Access, access_exp))?,
            refresh_token: self.codec.encode(&claims(TokenType::Refresh, refresh_exp))?,
            token_type: "bearer".to_string(),
            expires_in: (access_exp - now).num_seconds(),
            refresh_token_expires_in: (refresh_exp - now).num_seconds(),
            session_id: session.session_id,
        })
    }
}
