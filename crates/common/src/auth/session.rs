use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use uuid::Uuid;

use super::{AuthError, Principal};

/// A login, renewed by refreshing until its lifetime or refresh window
/// lapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub session_id: Uuid,
    pub principal: Principal,
    pub issued_at: DateTime<Utc>,
    pub last_refreshed_at: DateTime<Utc>,
    /// `None` when sessions have no maximum age
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn start(
        principal: Principal,
        now: DateTime<Utc>,
        max_age: Option<Duration>,
    ) -> Result<Self, AuthError> {
        let expires_at = max_age
            .map(|age| expiry_after(now, age, "session_max_age"))
            .transpose()?;
        Ok(Self {
            session_id: Uuid::new_v4(),
            principal,
            issued_at: now,
            last_refreshed_at: now,
            expires_at,
        })
    }

    /// `now - issued_at >= session_max_age`
    pub fn lifetime_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// `now - last_refreshed_at >= refresh_token_max_age`
    pub fn refresh_window_lapsed(&self, now: DateTime<Utc>, refresh_max_age: Duration) -> bool {
        now - self.last_refreshed_at >= refresh_max_age
    }

    pub fn is_expired(&self, now: DateTime<Utc>, refresh_max_age: Duration) -> bool {
        self.lifetime_lapsed(now) || self.refresh_window_lapsed(now, refresh_max_age)
    }
}

/// `now + age`, or a configuration error when that is not a representable
/// instant.
pub(crate) fn expiry_after(
    now: DateTime<Utc>,
    age: Duration,
    setting: &str,
) -> Result<DateTime<Utc>, AuthError> {
    now.checked_add_signed(age).ok_or_else(|| {
        AuthError::Configuration(format!("{setting} of {}s is out of range", age.num_seconds()))
    })
}

/// In-memory session table.
///
/// Each session sits behind its own lock so refreshes of one session are
/// serialized without blocking others.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) {
        self.sessions
            .write()
            .insert(session.session_id, Arc::new(Mutex::new(session)));
    }

    pub fn get(&self, session_id: &Uuid) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &Uuid) -> bool {
        self.sessions.write().remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every session for which `expired` holds. Returns how many went.
    pub fn retain_live(&self, mut expired: impl FnMut(&Session) -> bool) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !expired(&session.lock()));
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    #[test]
    fn test_zero_max_age_expires_immediately() {
        let session =
            Session::start(Principal::user("alice"), t(100), Some(Duration::zero())).unwrap();
        assert!(session.lifetime_lapsed(t(100)));
    }

    #[test]
    fn test_unbounded_lifetime() {
        let session = Session::start(Principal::user("alice"), t(100), None).unwrap();
        assert!(!session.lifetime_lapsed(t(100 + 10_000_000)));
    }

    #[test]
    fn test_unrepresentable_lifetime_is_an_error() {
        let result = Session::start(Principal::user("alice"), t(100), Some(Duration::MAX));
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_refresh_window() {
        let session = Session::start(Principal::user("alice"), t(0), None).unwrap();
        let window = Duration::seconds(3600);
        assert!(!session.refresh_window_lapsed(t(3599), window));
        assert!(session.refresh_window_lapsed(t(3600), window));
        assert!(session.is_expired(t(3601), window));
    }

    #[test]
    fn test_store_retain_live() {
        let store = SessionStore::new();
        let keep = Session::start(Principal::user("a"), t(0), None).unwrap();
        let stale =
            Session::start(Principal::user("b"), t(0), Some(Duration::seconds(10))).unwrap();
        let keep_id = keep.session_id;
        store.insert(keep);
        store.insert(stale);

        let removed = store.retain_live(|s| s.lifetime_lapsed(t(20)));
        assert_eq!(removed, 1);
        assert!(store.get(&keep_id).is_some());
        assert_eq!(store.len(), 1);
    }
}
