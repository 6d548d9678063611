// Session orchestrator
// Reacts to state transitions, performs all I/O, feeds results back into
// the reducer

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use crate::config::{SessionConfig, LOGIN_ROUTE};
use crate::error::{AuthError, Result};
use crate::gateway::AuthGateway;
use crate::models::{now_ms, AuthStatus, Token};
use crate::navigation::{Navigation, NavigationCapability, Navigator};
use crate::state::{reduce, SessionEvent, SessionState, SessionStatus};
use crate::store::{CredentialStore, IMPERSONATING_COOKIE, REDIRECT_COOKIE, TOKEN_COOKIE};

/// Long-lived coordinator that owns the session state
///
/// All mutation funnels through [`dispatch`](Self::dispatch); every
/// network call and storage access happens here, never in the reducer.
/// Operations may run concurrently: correctness rests on the reducer's
/// preconditions, not on mutual exclusion.
pub struct SessionManager {
    state: Arc<RwLock<SessionState>>,
    gateway: AuthGateway,
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    config: SessionConfig,

    /// Single-flight guard: at most one refresh request in flight
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let gateway = AuthGateway::new(&config)?;

        Ok(Self {
            state: Arc::new(RwLock::new(SessionState::initial())),
            gateway,
            store,
            navigator,
            config,
            refresh_lock: Mutex::new(()),
        })
    }

    // ---------------------------------------------------------------
    // State access
    // ---------------------------------------------------------------

    /// Feed one event into the state machine
    pub async fn dispatch(&self, event: SessionEvent) -> SessionState {
        let mut state = self.state.write().await;
        let next = reduce(&state, event);
        if next.status != state.status {
            tracing::debug!(
                from = ?state.status,
                to = ?next.status,
                "Session state transition"
            );
        }
        *state = next.clone();
        next
    }

    /// Current state snapshot; every read returns an independent value
    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.authenticated
    }

    // ---------------------------------------------------------------
    // Authentication
    // ---------------------------------------------------------------

    /// Authenticate with user name and password
    ///
    /// Drives the full chain: login request, token persistence, user
    /// profile retrieval. Failures are translated into state-machine
    /// events before being returned, so the UI can render them from state.
    pub async fn authenticate(&self, user: &str, password: &str) -> Result<AuthStatus> {
        self.dispatch(SessionEvent::Authenticate).await;

        let status = match self.gateway.login(user, password).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Login request failed");
                self.dispatch(SessionEvent::AuthenticateError(e.user_message()))
                    .await;
                return Err(e);
            }
        };

        if !status.authenticated {
            let err = AuthError::InvalidCredentials;
            self.dispatch(SessionEvent::AuthenticateError(err.user_message()))
                .await;
            return Err(err);
        }

        let token = match status.token.clone().filter(|t| t.is_valid()) {
            Some(token) => token,
            None => {
                let err = AuthError::MalformedResponse(
                    "login succeeded without a usable token".to_string(),
                );
                self.dispatch(SessionEvent::AuthenticateError(err.user_message()))
                    .await;
                return Err(err);
            }
        };

        self.store_token(&token);
        self.dispatch(SessionEvent::AuthenticateSuccess(token.clone()))
            .await;
        tracing::info!(user = user, "Authentication succeeded");

        match self.retrieve_authenticated_user(&token).await {
            Ok(user_id) => {
                self.dispatch(SessionEvent::RetrieveUserSuccess(user_id)).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Authenticated but user retrieval failed");
                // The reducer drops the state token here; the persisted
                // cookie must not outlive the session it belonged to
                self.remove_token();
                self.dispatch(SessionEvent::RetrieveUserError(e.user_message()))
                    .await;
                return Err(e);
            }
        }

        Ok(status)
    }

    /// Resolve the authenticated user's id through the status operation
    ///
    /// The id is the tail segment of the eperson link the endpoint hands
    /// back alongside a validated token.
    pub async fn retrieve_authenticated_user(&self, token: &Token) -> Result<String> {
        let status = self
            .gateway
            .status(Some(token))
            .await
            .map_err(|e| AuthError::SessionRetrievalFailed(e.to_string()))?;

        if !status.authenticated {
            return Err(AuthError::SessionRetrievalFailed(
                "status endpoint reports not authenticated".to_string(),
            ));
        }

        status
            .eperson_href()
            .and_then(|href| href.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                AuthError::SessionRetrievalFailed("status response has no eperson link".to_string())
            })
    }

    /// Validate an ambient cookie-based session during server-rendered
    /// bootstrap; no explicit token is required
    pub async fn check_existing_session(&self) -> Result<AuthStatus> {
        let status = match self.gateway.status(None).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Session check failed");
                self.remove_token();
                self.dispatch(SessionEvent::RetrieveAuthMethodsError).await;
                self.dispatch(SessionEvent::RetrieveUserError(e.user_message()))
                    .await;
                return Err(e);
            }
        };

        self.retrieve_auth_methods(&status).await;

        match status.token.clone().filter(|t| status.authenticated && t.is_valid()) {
            Some(token) => {
                self.store_token(&token);
                self.dispatch(SessionEvent::Authenticate).await;
                self.dispatch(SessionEvent::AuthenticateSuccess(token.clone()))
                    .await;

                match self.retrieve_authenticated_user(&token).await {
                    Ok(user_id) => {
                        self.dispatch(SessionEvent::RetrieveUserSuccess(user_id)).await;
                    }
                    Err(e) => {
                        self.remove_token();
                        self.dispatch(SessionEvent::RetrieveUserError(e.user_message()))
                            .await;
                    }
                }
            }
            None => {
                // Anonymous bootstrap still completes the initial check
                self.dispatch(SessionEvent::RetrieveUserError(
                    AuthError::NotAuthenticated.user_message(),
                ))
                .await;
                self.dispatch(SessionEvent::ResetMessages).await;
            }
        }

        Ok(status)
    }

    /// Publish the login methods reported by the endpoint, falling back to
    /// password-only so the login screen never renders empty
    pub async fn retrieve_auth_methods(&self, status: &AuthStatus) {
        match status.auth_methods.clone().filter(|m| !m.is_empty()) {
            Some(methods) => {
                self.dispatch(SessionEvent::RetrieveAuthMethodsSuccess(methods))
                    .await;
            }
            None => {
                self.dispatch(SessionEvent::RetrieveAuthMethodsError).await;
            }
        }
    }

    /// Clear error and info messages
    pub async fn reset_authentication_messages(&self) {
        self.dispatch(SessionEvent::ResetMessages).await;
    }

    // ---------------------------------------------------------------
    // Token lifecycle
    // ---------------------------------------------------------------

    /// Token currently held in state, if any
    pub async fn get_token(&self) -> Option<Token> {
        self.state.read().await.token.clone()
    }

    /// Token from state or the credential store, required to be usable
    ///
    /// Purely local: no network I/O. Fails with [`AuthError::NoValidToken`]
    /// when the token is absent, missing its access value, or expired.
    pub async fn has_valid_token(&self) -> Result<Token> {
        let token = match self.get_token().await {
            Some(token) => Some(token),
            None => self
                .store
                .get(TOKEN_COOKIE)
                .and_then(|raw| serde_json::from_str::<Token>(&raw).ok()),
        };

        token.filter(|t| t.is_valid()).ok_or(AuthError::NoValidToken)
    }

    /// Re-authenticate using the current token as a bearer credential
    ///
    /// Single-flight: concurrent callers wait on the first refresh, then
    /// reuse its result instead of issuing a second request.
    pub async fn refresh_token(&self, token: &Token) -> Result<Token> {
        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(current) = self.get_token().await {
            if current.access_token != token.access_token
                && !current.expires_within(now_ms(), self.config.refresh_threshold_ms)
                && current.is_valid()
            {
                tracing::debug!("Token already refreshed by a concurrent caller");
                return Ok(current);
            }
        }

        let state = self.dispatch(SessionEvent::RefreshToken).await;
        if state.status != SessionStatus::Refreshing {
            // Refresh only applies to an existing authenticated session
            return Err(AuthError::NoValidToken);
        }

        match self.gateway.refresh(token).await {
            Ok(status) => match status.token.filter(|t| status.authenticated && t.is_valid()) {
                Some(new_token) => {
                    self.replace_token(&new_token);
                    self.dispatch(SessionEvent::RefreshTokenSuccess(new_token.clone()))
                        .await;
                    tracing::info!("Token refreshed");
                    Ok(new_token)
                }
                None => {
                    tracing::warn!("Token refresh rejected by server");
                    self.remove_token();
                    self.dispatch(SessionEvent::RefreshTokenError).await;
                    Err(AuthError::RefreshRejected)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh request failed");
                self.remove_token();
                self.dispatch(SessionEvent::RefreshTokenError).await;
                Err(e)
            }
        }
    }

    /// True when the token in state is past its expiry
    pub async fn is_token_expired(&self) -> bool {
        match self.get_token().await {
            Some(token) => token.is_expired(),
            None => false,
        }
    }

    /// True when the session should proactively refresh: not already
    /// expired, no refresh in flight, and expiry within the threshold
    pub async fn is_token_expiring(&self) -> bool {
        let state = self.snapshot().await;
        if state.status == SessionStatus::Refreshing {
            return false;
        }
        match state.token {
            Some(token) => token.expires_within(now_ms(), self.config.refresh_threshold_ms),
            None => false,
        }
    }

    /// `"Bearer <access>"` only while the session believes it is
    /// authenticated and a token is resolvable; empty string otherwise
    ///
    /// Coupling the header to the session's own belief keeps a logically
    /// logged-out session from leaking a stale bearer value.
    pub async fn build_auth_header(&self, token: Option<&Token>) -> String {
        let state = self.state.read().await;
        let resolved = match token {
            Some(token) => Some(token.clone()),
            None => state.token.clone(),
        };

        match resolved {
            Some(token) if state.authenticated && !token.access_token.is_empty() => {
                format!("Bearer {}", token.access_token)
            }
            _ => String::new(),
        }
    }

    /// Persist the token (24 h cookie TTL)
    pub fn store_token(&self, token: &Token) {
        match serde_json::to_string(token) {
            Ok(raw) => self.store.set(
                TOKEN_COOKIE,
                &raw,
                Some(Duration::from_secs(self.config.token_cookie_ttl)),
            ),
            Err(e) => tracing::error!(error = %e, "Failed to serialize token for storage"),
        }
    }

    pub fn remove_token(&self) {
        self.store.remove(TOKEN_COOKIE);
    }

    pub fn replace_token(&self, token: &Token) {
        self.remove_token();
        self.store_token(token);
    }

    // ---------------------------------------------------------------
    // Logout
    // ---------------------------------------------------------------

    /// End the session; success means the endpoint reports unauthenticated
    pub async fn logout(&self) -> Result<()> {
        self.dispatch(SessionEvent::LogOut).await;

        match self.gateway.logout().await {
            Ok(status) if !status.authenticated => {
                self.remove_token();
                self.dispatch(SessionEvent::LogOutSuccess).await;
                tracing::info!("Logged out");
                self.refresh_after_logout();
                Ok(())
            }
            Ok(_) => {
                let err = AuthError::NotAuthenticated;
                self.dispatch(SessionEvent::LogOutError(err.user_message()))
                    .await;
                Err(err)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Logout request failed");
                self.dispatch(SessionEvent::LogOutError(e.user_message()))
                    .await;
                Err(e)
            }
        }
    }

    /// Hard reload with a unique path so all client state is discarded
    pub fn refresh_after_logout(&self) {
        self.navigator
            .perform(Navigation::Hard(format!("/reload/{}", now_ms())));
    }

    // ---------------------------------------------------------------
    // Redirects
    // ---------------------------------------------------------------

    pub fn redirect_to_login(&self) {
        self.navigator
            .perform(Navigation::Route(LOGIN_ROUTE.to_string()));
    }

    /// Send the user to login after a detected token expiry
    ///
    /// Prefers a hard browser navigation so all in-memory state is
    /// discarded; in a server-rendering context an HTTP redirect is issued
    /// while headers can still be written; otherwise falls back to a
    /// client-side route change.
    pub async fn redirect_to_login_when_token_expired(&self) {
        self.dispatch(SessionEvent::RedirectTokenExpired(
            "Your session has expired. Please log in again.".to_string(),
        ))
        .await;

        let url = format!("{}?expired=true", LOGIN_ROUTE);
        let navigation = match self.navigator.capability() {
            NavigationCapability::Browser => Navigation::Hard(url),
            NavigationCapability::ServerResponse { headers_sent: false } => {
                Navigation::Http { status: 302, url }
            }
            _ => Navigation::Route(url),
        };
        self.navigator.perform(navigation);
    }

    /// Return the user to where they were headed before login
    ///
    /// Consumes the captured redirect URL if one exists; otherwise falls
    /// back to the navigation history. Standalone login pages skip their
    /// own history entry.
    pub async fn redirect_after_login_success(&self, is_standalone_page: bool) {
        if let Some(redirect_url) = self.get_redirect_url().await.filter(|u| !u.is_empty()) {
            self.clear_redirect_url().await;
            self.navigate_to_redirect_url(&redirect_url);
            return;
        }

        let history = self.navigator.history();
        let redirect_url = if is_standalone_page {
            // The last entry is the login page itself
            history
                .len()
                .checked_sub(2)
                .and_then(|i| history.get(i))
                .cloned()
        } else {
            history.last().cloned()
        };

        self.navigate_to_redirect_url(redirect_url.as_deref().unwrap_or(""));
    }

    /// Loop protection: an empty target or the login route itself resolves
    /// to the application root
    fn navigate_to_redirect_url(&self, url: &str) {
        if url.is_empty() || url.starts_with(LOGIN_ROUTE) {
            self.navigator.perform(Navigation::Route("/".to_string()));
        } else {
            self.navigator.perform(Navigation::Route(url.to_string()));
        }
    }

    /// Capture the post-login destination (1 h cookie TTL, plus state so
    /// it survives a full page reload)
    pub async fn set_redirect_url(&self, url: &str) {
        self.store.set(
            REDIRECT_COOKIE,
            url,
            Some(Duration::from_secs(self.config.redirect_cookie_ttl)),
        );
        self.dispatch(SessionEvent::SetRedirectUrl(Some(url.to_string())))
            .await;
    }

    /// Captured redirect URL, preferring the cookie over state
    pub async fn get_redirect_url(&self) -> Option<String> {
        match self.store.get(REDIRECT_COOKIE) {
            Some(url) if !url.is_empty() => Some(url),
            _ => self.state.read().await.redirect_url.clone(),
        }
    }

    pub async fn clear_redirect_url(&self) {
        self.dispatch(SessionEvent::SetRedirectUrl(None)).await;
        self.store.remove(REDIRECT_COOKIE);
    }

    /// Route-change hook: a captured destination that no longer matches
    /// the active route (and is not the login route) must not resurrect
    /// itself later, so it is dropped here
    pub async fn handle_route_change(&self, route: &str) {
        if Self::is_login_route(route) {
            return;
        }
        if let Some(captured) = self.get_redirect_url().await {
            if !captured.is_empty() && captured != route {
                tracing::debug!(
                    route = route,
                    captured = %captured,
                    "Active route diverged from captured redirect; clearing it"
                );
                self.clear_redirect_url().await;
            }
        }
    }

    fn is_login_route(url: &str) -> bool {
        url == LOGIN_ROUTE
            || url.strip_prefix(LOGIN_ROUTE).is_some_and(|rest| {
                rest.starts_with('?') || rest.starts_with('/') || rest.starts_with('#')
            })
    }

    // ---------------------------------------------------------------
    // Impersonation
    // ---------------------------------------------------------------

    /// Act as another principal; forces a hard reload so no cached
    /// per-user state leaks across the identity switch
    pub fn impersonate(&self, eperson_id: &str) {
        tracing::info!(eperson = eperson_id, "Starting impersonation");
        self.store.set(IMPERSONATING_COOKIE, eperson_id, None);
        self.refresh_after_logout();
    }

    pub fn stop_impersonating(&self) {
        self.store.remove(IMPERSONATING_COOKIE);
    }

    pub fn stop_impersonating_and_refresh(&self) {
        tracing::info!("Stopping impersonation");
        self.stop_impersonating();
        self.refresh_after_logout();
    }

    /// Id of the impersonated principal, if any
    pub fn impersonated_id(&self) -> Option<String> {
        self.store.get(IMPERSONATING_COOKIE)
    }

    pub fn is_impersonating(&self) -> bool {
        self.impersonated_id().is_some()
    }

    pub fn is_impersonating_user(&self, eperson_id: &str) -> bool {
        self.impersonated_id().as_deref() == Some(eperson_id)
    }
}
