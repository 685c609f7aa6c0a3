//! Session state and role gating.
//!
//! The session store is the only shared mutable state in the process: one
//! handle per component, written only on login, logout and 401-triggered
//! invalidation. Everything else reads.

pub mod error;
pub mod guard;
pub mod token;

use std::sync::{Arc, RwLock};

use time::OffsetDateTime;
use tracing::info;

use crate::model::Role;

pub use error::AuthError;
pub use token::{Claims, decode_claims};

/// An authenticated session derived from the backend's access token.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub role: Role,
    pub expires_at: OffsetDateTime,
}

impl Session {
    /// Build a session by decoding the token's claims locally. Fails closed
    /// on any decode irregularity.
    pub fn from_token(token: impl Into<String>) -> Result<Session, AuthError> {
        let token = token.into();
        let claims = decode_claims(&token)?;
        Ok(Session {
            token,
            username: claims.username,
            role: claims.role,
            expires_at: claims.expires_at,
        })
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= OffsetDateTime::now_utc()
    }
}

/// Process-wide holder for the at-most-one active session.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, session: Session) {
        info!(target: "auth", username = %session.username, role = %session.role, "session established");
        *self.inner.write().expect("session store poisoned") = Some(session);
    }

    pub fn clear(&self) {
        let mut slot = self.inner.write().expect("session store poisoned");
        if slot.take().is_some() {
            info!(target: "auth", "session destroyed");
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.read().expect("session store poisoned").clone()
    }

    /// The bearer token, if a session is present. Expiry is not checked
    /// here; the route guard and the backend both enforce it.
    pub fn token(&self) -> Option<String> {
        self.inner
            .read()
            .expect("session store poisoned")
            .as_ref()
            .map(|s| s.token.clone())
    }

    /// True when a non-expired session is present. Used by the realtime
    /// channels to decide whether a reconnect attempt is still warranted.
    pub fn is_active(&self) -> bool {
        self.current().map(|s| !s.is_expired()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::encode_unsigned;

    fn future_exp() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp() + 600
    }

    #[test]
    fn session_from_token_carries_identity() {
        let token = encode_unsigned("asha", "admin", future_exp());
        let session = Session::from_token(&token).unwrap();
        assert_eq!(session.username, "asha");
        assert_eq!(session.role, Role::Admin);
        assert!(!session.is_expired());
    }

    #[test]
    fn store_holds_at_most_one_session() {
        let store = SessionStore::new();
        assert!(store.current().is_none());
        assert!(!store.is_active());

        let first = Session::from_token(encode_unsigned("a", "viewer", future_exp())).unwrap();
        let second = Session::from_token(encode_unsigned("b", "admin", future_exp())).unwrap();
        store.set(first);
        store.set(second.clone());
        assert_eq!(store.current(), Some(second));
        assert!(store.is_active());

        store.clear();
        assert!(store.current().is_none());
        assert!(store.token().is_none());
    }

    #[test]
    fn expired_session_is_not_active() {
        let store = SessionStore::new();
        let stale = Session::from_token(encode_unsigned("a", "viewer", 1_000_000)).unwrap();
        store.set(stale);
        assert!(store.current().is_some());
        assert!(!store.is_active());
    }
}
