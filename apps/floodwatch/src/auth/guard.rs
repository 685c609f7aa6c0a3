//! Role-gated navigation.
//!
//! Evaluated before every protected view renders. An expired session is
//! destroyed on the spot so no later check can observe it.

use tracing::debug;

use crate::model::Role;

use super::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Permit,
    /// No usable session: send the user to the login screen.
    RedirectLogin,
    /// Authenticated, but the role is not in the allowed set.
    RedirectUnauthorized,
}

/// Decide whether the current session may render a view restricted to
/// `allowed`. An empty `allowed` slice means any authenticated role.
pub fn authorize(store: &SessionStore, allowed: &[Role]) -> RouteDecision {
    let Some(session) = store.current() else {
        return RouteDecision::RedirectLogin;
    };
    if session.is_expired() {
        debug!(target: "auth", username = %session.username, "session expired at guard");
        store.clear();
        return RouteDecision::RedirectLogin;
    }
    if !allowed.is_empty() && !allowed.contains(&session.role) {
        return RouteDecision::RedirectUnauthorized;
    }
    RouteDecision::Permit
}
