// Session state machine
// A pure reducer: the only way session state ever changes

use serde::{Deserialize, Serialize};

use crate::models::{AuthMethod, Token};

/// Authentication status of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    Authenticating,
    Authenticated,
    AuthFailed,
    Refreshing,
    LoggingOut,
}

/// The authoritative, serializable session state
///
/// Invariants upheld by [`reduce`]:
/// - `authenticated == true` implies `token` is present
/// - `status == Refreshing` only follows an authenticated session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub authenticated: bool,
    pub token: Option<Token>,
    pub status: SessionStatus,
    /// Whether an initial session check has completed
    pub loaded: bool,
    pub error: Option<String>,
    /// User-facing non-error message (e.g. "session expired")
    pub info: Option<String>,
    pub redirect_url: Option<String>,
    pub user_id: Option<String>,
    pub auth_methods: Vec<AuthMethod>,
}

impl SessionState {
    /// State at application bootstrap
    pub fn initial() -> Self {
        Self {
            authenticated: false,
            token: None,
            status: SessionStatus::Idle,
            loaded: false,
            error: None,
            info: None,
            redirect_url: None,
            user_id: None,
            auth_methods: Vec::new(),
        }
    }

    /// Full reset after logout or unrecoverable refresh failure
    ///
    /// The captured redirect URL and the retrieved login methods survive a
    /// reset: both are still needed by the login screen that follows.
    fn reset(&self) -> Self {
        Self {
            redirect_url: self.redirect_url.clone(),
            auth_methods: self.auth_methods.clone(),
            ..Self::initial()
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Closed set of events the state machine consumes
///
/// UI actions and the orchestrator's completed I/O both enter the machine
/// through these; nothing else mutates [`SessionState`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Login attempt started
    Authenticate,
    /// Login endpoint accepted the credentials
    AuthenticateSuccess(Token),
    /// Login endpoint rejected the credentials or was unreachable
    AuthenticateError(String),
    /// Authenticated user's id resolved
    RetrieveUserSuccess(String),
    /// Authenticated user's profile could not be resolved
    RetrieveUserError(String),
    /// Proactive token refresh started
    RefreshToken,
    /// Refresh produced a new token
    RefreshTokenSuccess(Token),
    /// Refresh was rejected; the session is lost
    RefreshTokenError,
    /// Logout requested
    LogOut,
    /// Logout confirmed by the server
    LogOutSuccess,
    /// Logout failed; the session is still live
    LogOutError(String),
    /// Navigation demanded authentication that is missing
    RedirectAuthRequired(String),
    /// Token expiry was detected and a login redirect is underway
    RedirectTokenExpired(String),
    /// Capture (or clear, with None) the post-login destination
    SetRedirectUrl(Option<String>),
    /// Display an informational message
    AddInfoMessage(String),
    /// Clear error and info messages
    ResetMessages,
    /// Backend reported its enabled login methods
    RetrieveAuthMethodsSuccess(Vec<AuthMethod>),
    /// Login methods could not be retrieved; fall back to password
    RetrieveAuthMethodsError,
}

/// Apply one event to the current state, producing the next state
///
/// Pure and synchronous: no I/O, no hidden aliasing. Events arriving while
/// their preconditions do not hold (a stale refresh result after logout,
/// for instance) return the state unchanged, which is what makes
/// concurrent in-flight operations safe without locking.
pub fn reduce(state: &SessionState, event: SessionEvent) -> SessionState {
    use SessionStatus::*;

    match event {
        SessionEvent::Authenticate => SessionState {
            status: Authenticating,
            error: None,
            info: None,
            ..state.clone()
        },

        SessionEvent::AuthenticateSuccess(token) => match state.status {
            Authenticating | Refreshing => SessionState {
                authenticated: true,
                token: Some(token),
                status: Authenticated,
                error: None,
                ..state.clone()
            },
            _ => state.clone(),
        },

        SessionEvent::AuthenticateError(message) => match state.status {
            Authenticating => SessionState {
                authenticated: false,
                token: None,
                status: AuthFailed,
                error: Some(message),
                ..state.clone()
            },
            _ => state.clone(),
        },

        SessionEvent::RetrieveUserSuccess(user_id) => match state.status {
            Authenticated => SessionState {
                user_id: Some(user_id),
                loaded: true,
                error: None,
                info: None,
                ..state.clone()
            },
            _ => state.clone(),
        },

        SessionEvent::RetrieveUserError(message) => SessionState {
            authenticated: false,
            token: None,
            status: AuthFailed,
            error: Some(message),
            loaded: true,
            ..state.clone()
        },

        SessionEvent::RefreshToken => match state.status {
            Authenticated => SessionState {
                status: Refreshing,
                ..state.clone()
            },
            _ => state.clone(),
        },

        SessionEvent::RefreshTokenSuccess(token) => match state.status {
            Refreshing => SessionState {
                token: Some(token),
                status: Authenticated,
                ..state.clone()
            },
            _ => state.clone(),
        },

        SessionEvent::RefreshTokenError => match state.status {
            Refreshing => state.reset(),
            _ => state.clone(),
        },

        SessionEvent::LogOut => match state.status {
            Authenticated => SessionState {
                status: LoggingOut,
                ..state.clone()
            },
            _ => state.clone(),
        },

        SessionEvent::LogOutSuccess => match state.status {
            LoggingOut => state.reset(),
            _ => state.clone(),
        },

        SessionEvent::LogOutError(message) => match state.status {
            LoggingOut => SessionState {
                authenticated: true,
                status: Authenticated,
                error: Some(message),
                ..state.clone()
            },
            _ => state.clone(),
        },

        SessionEvent::RedirectAuthRequired(info) | SessionEvent::RedirectTokenExpired(info) => {
            SessionState {
                authenticated: false,
                token: None,
                status: Idle,
                loaded: false,
                info: Some(info),
                user_id: None,
                ..state.clone()
            }
        }

        SessionEvent::SetRedirectUrl(url) => SessionState {
            redirect_url: url.filter(|u| !u.is_empty()),
            ..state.clone()
        },

        SessionEvent::AddInfoMessage(info) => SessionState {
            info: Some(info),
            ..state.clone()
        },

        SessionEvent::ResetMessages => SessionState {
            error: None,
            info: None,
            ..state.clone()
        },

        SessionEvent::RetrieveAuthMethodsSuccess(methods) => SessionState {
            auth_methods: methods,
            ..state.clone()
        },

        SessionEvent::RetrieveAuthMethodsError => SessionState {
            auth_methods: vec![AuthMethod::password_fallback()],
            ..state.clone()
        },
    }
}
