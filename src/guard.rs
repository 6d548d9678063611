// Route guard
// Pure predicate consulted by the router before entering protected routes

use crate::session::SessionManager;
use crate::state::SessionState;

/// What a route demands before it may be entered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequirement {
    /// The URL being navigated to
    pub url: String,
    /// Whether an authenticated session is required at all
    pub requires_authentication: bool,
    /// Restrict the route to one specific user (self-service pages)
    pub required_user: Option<String>,
}

impl RouteRequirement {
    pub fn authenticated(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            requires_authentication: true,
            required_user: None,
        }
    }

    pub fn public(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            requires_authentication: false,
            required_user: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    DenyWithRedirectToLogin,
}

/// Decide whether the target route may be entered
///
/// Reads the state snapshot only; never mutates anything, so the router
/// can call it as often as it likes.
pub fn check_route(state: &SessionState, requirement: &RouteRequirement) -> GuardDecision {
    if !requirement.requires_authentication {
        return GuardDecision::Allow;
    }

    if !state.authenticated {
        return GuardDecision::DenyWithRedirectToLogin;
    }

    if let Some(required_user) = &requirement.required_user {
        if state.user_id.as_deref() != Some(required_user.as_str()) {
            return GuardDecision::DenyWithRedirectToLogin;
        }
    }

    GuardDecision::Allow
}

impl SessionManager {
    /// Router adapter around [`check_route`]
    ///
    /// A denial captures the attempted URL before redirecting, so a later
    /// successful login can return the user to their destination.
    pub async fn guard_route(&self, requirement: &RouteRequirement) -> GuardDecision {
        let state = self.snapshot().await;
        let decision = check_route(&state, requirement);

        if decision == GuardDecision::DenyWithRedirectToLogin {
            tracing::debug!(url = %requirement.url, "Route denied; redirecting to login");
            self.set_redirect_url(&requirement.url).await;
            self.redirect_to_login();
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::models::{now_ms, Token};
    use crate::navigation::{Navigation, NavigationCapability, RecordingNavigator};
    use crate::state::{reduce, SessionEvent};
    use crate::store::{CredentialStore, MemoryCookieStore, REDIRECT_COOKIE};
    use std::sync::Arc;

    fn authenticated_state(user_id: Option<&str>) -> SessionState {
        let token = Token::new("abc", now_ms() + 3_600_000);
        let state = reduce(&SessionState::initial(), SessionEvent::Authenticate);
        let state = reduce(&state, SessionEvent::AuthenticateSuccess(token));
        match user_id {
            Some(id) => reduce(&state, SessionEvent::RetrieveUserSuccess(id.to_string())),
            None => state,
        }
    }

    #[test]
    fn test_public_routes_always_allowed() {
        let state = SessionState::initial();
        assert_eq!(
            check_route(&state, &RouteRequirement::public("/search")),
            GuardDecision::Allow
        );
    }

    #[test]
    fn test_protected_route_requires_session() {
        let requirement = RouteRequirement::authenticated("/submit");

        assert_eq!(
            check_route(&SessionState::initial(), &requirement),
            GuardDecision::DenyWithRedirectToLogin
        );
        assert_eq!(
            check_route(&authenticated_state(None), &requirement),
            GuardDecision::Allow
        );
    }

    #[test]
    fn test_user_restricted_route() {
        let requirement = RouteRequirement {
            url: "/profile/eperson-1".to_string(),
            requires_authentication: true,
            required_user: Some("eperson-1".to_string()),
        };

        assert_eq!(
            check_route(&authenticated_state(Some("eperson-1")), &requirement),
            GuardDecision::Allow
        );
        assert_eq!(
            check_route(&authenticated_state(Some("eperson-2")), &requirement),
            GuardDecision::DenyWithRedirectToLogin
        );
        // No user id resolved yet
        assert_eq!(
            check_route(&authenticated_state(None), &requirement),
            GuardDecision::DenyWithRedirectToLogin
        );
    }

    #[tokio::test]
    async fn test_denial_captures_url_and_redirects() {
        let store = Arc::new(MemoryCookieStore::new());
        let navigator = Arc::new(RecordingNavigator::new(NavigationCapability::ClientRouting));
        let manager = SessionManager::new(
            SessionConfig::default(),
            store.clone(),
            navigator.clone(),
        )
        .unwrap();

        let decision = manager
            .guard_route(&RouteRequirement::authenticated("/items/1/edit"))
            .await;

        assert_eq!(decision, GuardDecision::DenyWithRedirectToLogin);
        assert_eq!(store.get(REDIRECT_COOKIE).as_deref(), Some("/items/1/edit"));
        assert_eq!(
            navigator.last_performed(),
            Some(Navigation::Route("/login".to_string()))
        );
    }

    #[tokio::test]
    async fn test_allowed_route_has_no_side_effects() {
        let store = Arc::new(MemoryCookieStore::new());
        let navigator = Arc::new(RecordingNavigator::new(NavigationCapability::ClientRouting));
        let manager = SessionManager::new(
            SessionConfig::default(),
            store.clone(),
            navigator.clone(),
        )
        .unwrap();

        let decision = manager
            .guard_route(&RouteRequirement::public("/search"))
            .await;

        assert_eq!(decision, GuardDecision::Allow);
        assert_eq!(store.get(REDIRECT_COOKIE), None);
        assert!(navigator.performed().is_empty());
    }
}
