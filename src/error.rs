// Error handling module
// Defines the session engine's error taxonomy

use thiserror::Error;

/// Errors surfaced by the session engine
///
/// Network and validation failures are caught at the orchestrator boundary
/// and translated into state-machine events; callers only ever see these
/// typed variants, never a raw transport error bubbling into UI code.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Login rejected by the server
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// No token available locally, or the one we have is expired/malformed
    #[error("No valid authentication token available")]
    NoValidToken,

    /// Server refused to re-authenticate an existing token
    #[error("Token refresh rejected by server")]
    RefreshRejected,

    /// Authenticated, but the user profile could not be retrieved
    #[error("Failed to retrieve authenticated user: {0}")]
    SessionRetrievalFailed(String),

    /// Endpoint reported an unauthenticated session where one was expected
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Transport-level failure talking to the authentication endpoint
    #[error("Authentication request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Endpoint returned a body we could not make sense of
    #[error("Malformed authentication response: {0}")]
    MalformedResponse(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// User-facing message for display on the login form
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Transport(_) => "Unable to reach the authentication service".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid email or password"
        );
        assert_eq!(
            AuthError::NoValidToken.to_string(),
            "No valid authentication token available"
        );
        assert_eq!(
            AuthError::RefreshRejected.to_string(),
            "Token refresh rejected by server"
        );
        assert_eq!(AuthError::NotAuthenticated.to_string(), "Not authenticated");
    }

    #[test]
    fn test_session_retrieval_message() {
        let err = AuthError::SessionRetrievalFailed("missing eperson link".to_string());
        assert_eq!(
            err.to_string(),
            "Failed to retrieve authenticated user: missing eperson link"
        );
    }

    #[test]
    fn test_internal_error_message() {
        let err = AuthError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }

    #[test]
    fn test_user_message_matches_display_for_typed_errors() {
        let err = AuthError::InvalidCredentials;
        assert_eq!(err.user_message(), err.to_string());
    }
}
