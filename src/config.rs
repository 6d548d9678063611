use anyhow::{Context, Result};

/// Well-known client routes
pub const LOGIN_ROUTE: &str = "/login";
pub const LOGOUT_ROUTE: &str = "/logout";

/// Session engine configuration
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Root of the authentication endpoint, e.g. "https://repo.example.org/api/authn"
    pub auth_endpoint: String,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Token lifecycle (milliseconds)
    pub refresh_threshold_ms: i64,

    // Credential store TTLs (seconds)
    pub token_cookie_ttl: u64,
    pub redirect_cookie_ttl: u64,
}

impl SessionConfig {
    /// Load configuration from environment with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = SessionConfig {
            auth_endpoint: std::env::var("AUTH_ENDPOINT")
                .context("AUTH_ENDPOINT is required (root URL of the authentication endpoint)")?,

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),

            http_request_timeout: std::env::var("HTTP_REQUEST_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),

            refresh_threshold_ms: std::env::var("TOKEN_REFRESH_THRESHOLD_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5 * 60 * 1000),

            token_cookie_ttl: std::env::var("TOKEN_COOKIE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(24 * 60 * 60),

            redirect_cookie_ttl: std::env::var("REDIRECT_COOKIE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60 * 60),
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth_endpoint.is_empty() {
            anyhow::bail!("AUTH_ENDPOINT must not be empty");
        }
        if !self.auth_endpoint.starts_with("http://") && !self.auth_endpoint.starts_with("https://")
        {
            anyhow::bail!("AUTH_ENDPOINT must be an http(s) URL: {}", self.auth_endpoint);
        }
        if self.refresh_threshold_ms <= 0 {
            anyhow::bail!("TOKEN_REFRESH_THRESHOLD_MS must be positive");
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_endpoint: "http://localhost:8080/api/authn".to_string(),
            http_connect_timeout: 30,
            http_request_timeout: 60,
            refresh_threshold_ms: 5 * 60 * 1000,
            token_cookie_ttl: 24 * 60 * 60,
            redirect_cookie_ttl: 60 * 60,
        }
    }
}
