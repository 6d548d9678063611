// Session data models

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bearer credential with an absolute expiry timestamp (epoch milliseconds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub access_token: String,
    pub expires: i64,
}

impl Token {
    pub fn new(access_token: impl Into<String>, expires: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires,
        }
    }

    /// True when the expiry timestamp is at or before `now_ms`
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires <= now_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }

    /// True when the token expires within `window_ms` of `now_ms`
    /// (but is not yet expired)
    pub fn expires_within(&self, now_ms: i64, window_ms: i64) -> bool {
        !self.is_expired_at(now_ms) && self.expires - now_ms < window_ms
    }

    /// A token is usable only if it carries an access value and has not expired
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }
}

/// Current time as epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Kind of login method offered by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethodKind {
    Password,
    Shibboleth,
    Ldap,
    Ip,
    X509,
    Oidc,
    Orcid,
}

/// A login method plus backend-provided attributes (e.g. an SSO location)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMethod {
    pub kind: AuthMethodKind,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl AuthMethod {
    pub fn new(kind: AuthMethodKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
        }
    }

    /// The fallback offered when method retrieval fails, so the login
    /// screen never renders with zero options
    pub fn password_fallback() -> Self {
        Self::new(AuthMethodKind::Password)
    }
}

/// Response body of the authentication endpoint (login and status share it)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,

    #[serde(default)]
    pub token: Option<Token>,

    #[serde(rename = "_links", default)]
    pub links: Option<AuthStatusLinks>,

    #[serde(default)]
    pub auth_methods: Option<Vec<AuthMethod>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthStatusLinks {
    #[serde(default)]
    pub eperson: Option<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
}

impl AuthStatus {
    /// Href of the authenticated eperson, if the endpoint linked one
    pub fn eperson_href(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|l| l.eperson.as_ref())
            .map(|l| l.href.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expiry_boundary() {
        let token = Token::new("abc", 1_000);
        // Expired exactly at the expiry instant
        assert!(token.is_expired_at(1_000));
        assert!(token.is_expired_at(1_001));
        assert!(!token.is_expired_at(999));
    }

    #[test]
    fn test_expires_within_window() {
        let now = 1_000_000;
        let window = 300_000;

        // Well beyond the window
        assert!(!Token::new("abc", now + window + 1).expires_within(now, window));
        // Inside the window
        assert!(Token::new("abc", now + window - 1).expires_within(now, window));
        // Already expired tokens are not "expiring"
        assert!(!Token::new("abc", now - 1).expires_within(now, window));
    }

    #[test]
    fn test_token_validity() {
        assert!(Token::new("abc", now_ms() + 60_000).is_valid());
        assert!(!Token::new("", now_ms() + 60_000).is_valid());
        assert!(!Token::new("abc", now_ms() - 1).is_valid());
    }

    #[test]
    fn test_token_serde_round_trip() {
        let token = Token::new("abc", 1_700_000_000_000);
        let json = serde_json::to_string(&token).unwrap();
        assert!(json.contains("accessToken"));
        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_auth_status_deserialization() {
        let body = r#"{
            "authenticated": true,
            "token": {"accessToken": "abc", "expires": 1700000000000},
            "_links": {"eperson": {"href": "https://repo.example.org/api/eperson/epersons/42"}}
        }"#;
        let status: AuthStatus = serde_json::from_str(body).unwrap();
        assert!(status.authenticated);
        assert_eq!(status.token.as_ref().unwrap().access_token, "abc");
        assert_eq!(
            status.eperson_href(),
            Some("https://repo.example.org/api/eperson/epersons/42")
        );
    }

    #[test]
    fn test_auth_status_minimal_body() {
        let status: AuthStatus = serde_json::from_str(r#"{"authenticated": false}"#).unwrap();
        assert!(!status.authenticated);
        assert!(status.token.is_none());
        assert!(status.eperson_href().is_none());
        assert!(status.auth_methods.is_none());
    }

    #[test]
    fn test_auth_methods_deserialization() {
        let body = r#"{
            "authenticated": false,
            "authMethods": [
                {"kind": "password", "attributes": {}},
                {"kind": "shibboleth", "attributes": {"location": "https://sso.example.org"}}
            ]
        }"#;
        let status: AuthStatus = serde_json::from_str(body).unwrap();
        let methods = status.auth_methods.unwrap();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].kind, AuthMethodKind::Password);
        assert_eq!(
            methods[1].attributes.get("location").map(String::as_str),
            Some("https://sso.example.org")
        );
    }
}
