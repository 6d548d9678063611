// Auth request gateway
// The three network operations of the authentication endpoint

use anyhow::Context;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::{AuthError, Result};
use crate::models::{AuthStatus, Token};

/// HTTP gateway for the authentication endpoint
///
/// Owns a cookie-aware client so an ambient server-side session cookie is
/// carried on the `status` check during server-rendered bootstrap.
pub struct AuthGateway {
    client: Client,
    base_url: String,
}

impl AuthGateway {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(config.http_connect_timeout))
            .timeout(Duration::from_secs(config.http_request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.auth_endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn bearer(request: RequestBuilder, token: Option<&Token>) -> RequestBuilder {
        match token {
            Some(token) if !token.access_token.is_empty() => {
                request.header("Authorization", format!("Bearer {}", token.access_token))
            }
            _ => request,
        }
    }

    /// POST credentials to the login operation
    ///
    /// The body is form-urlencoded, password first, both values escaped by
    /// the encoder.
    pub async fn login(&self, user: &str, password: &str) -> Result<AuthStatus> {
        tracing::debug!(user = user, "Posting credentials to login endpoint");

        let response = self
            .client
            .post(self.endpoint("login"))
            .header("Accept", "application/json")
            .form(&[("password", password), ("user", user)])
            .send()
            .await?;

        Self::parse_status(response).await
    }

    /// Re-authenticate an existing token (same login operation, bearer
    /// credential instead of a password)
    pub async fn refresh(&self, token: &Token) -> Result<AuthStatus> {
        tracing::debug!("Posting token to login endpoint for refresh");

        let request = self
            .client
            .post(self.endpoint("login"))
            .header("Accept", "application/json")
            .header("Content-Type", "application/x-www-form-urlencoded");

        let response = Self::bearer(request, Some(token)).send().await?;
        Self::parse_status(response).await
    }

    /// GET the status operation
    ///
    /// With a token this validates the bearer credential; without one it
    /// validates whatever ambient session cookie the client carries.
    pub async fn status(&self, token: Option<&Token>) -> Result<AuthStatus> {
        tracing::debug!(with_token = token.is_some(), "Checking session status");

        let request = self
            .client
            .get(self.endpoint("status"))
            .header("Accept", "application/json");

        let response = Self::bearer(request, token).send().await?;
        Self::parse_status(response).await
    }

    /// GET the logout operation; success means `authenticated: false`
    pub async fn logout(&self) -> Result<AuthStatus> {
        tracing::debug!("Requesting logout");

        let response = self
            .client
            .get(self.endpoint("logout"))
            .header("Accept", "application/json")
            .send()
            .await?;

        Self::parse_status(response).await
    }

    /// Interpret an endpoint response as an [`AuthStatus`]
    ///
    /// 401/403 are regular outcomes here (they mean "not authenticated"),
    /// not transport failures; anything else unexpected is surfaced as a
    /// malformed response.
    async fn parse_status(response: Response) -> Result<AuthStatus> {
        let status = response.status();

        if status.is_success() {
            return response.json::<AuthStatus>().await.map_err(|e| {
                AuthError::MalformedResponse(format!("invalid status body: {}", e))
            });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // Some backends send a status body with the rejection, some
            // send nothing; both mean the same thing
            let parsed = response.json::<AuthStatus>().await.ok();
            return Ok(parsed.unwrap_or(AuthStatus {
                authenticated: false,
                token: None,
                links: None,
                auth_methods: None,
            }));
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            status = status.as_u16(),
            body = %body,
            "Authentication endpoint returned an unexpected response"
        );
        Err(AuthError::MalformedResponse(format!(
            "unexpected status {}",
            status.as_u16()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_ms;
    use mockito::Matcher;

    fn config_for(server: &mockito::ServerGuard) -> SessionConfig {
        SessionConfig {
            auth_endpoint: format!("{}/api/authn", server.url()),
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_login_sends_urlencoded_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/authn/login")
            .match_header("content-type", Matcher::Regex("application/x-www-form-urlencoded".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user".into(), "alice@example.org".into()),
                Matcher::UrlEncoded("password".into(), "p&ss=word".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"authenticated": true, "token": {{"accessToken": "abc", "expires": {}}}}}"#,
                now_ms() + 3_600_000
            ))
            .create_async()
            .await;

        let gateway = AuthGateway::new(&config_for(&server)).unwrap();
        let status = gateway.login("alice@example.org", "p&ss=word").await.unwrap();

        mock.assert_async().await;
        assert!(status.authenticated);
        assert_eq!(status.token.unwrap().access_token, "abc");
    }

    #[tokio::test]
    async fn test_login_rejection_is_an_unauthenticated_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/authn/login")
            .with_status(401)
            .create_async()
            .await;

        let gateway = AuthGateway::new(&config_for(&server)).unwrap();
        let status = gateway.login("alice", "wrong").await.unwrap();
        assert!(!status.authenticated);
        assert!(status.token.is_none());
    }

    #[tokio::test]
    async fn test_refresh_sends_bearer_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/authn/login")
            .match_header("authorization", "Bearer old-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"authenticated": true, "token": {{"accessToken": "new-token", "expires": {}}}}}"#,
                now_ms() + 3_600_000
            ))
            .create_async()
            .await;

        let gateway = AuthGateway::new(&config_for(&server)).unwrap();
        let token = Token::new("old-token", now_ms() + 1_000);
        let status = gateway.refresh(&token).await.unwrap();

        mock.assert_async().await;
        assert_eq!(status.token.unwrap().access_token, "new-token");
    }

    #[tokio::test]
    async fn test_status_without_token_omits_authorization() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/authn/status")
            .match_header("accept", "application/json")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"authenticated": false}"#)
            .create_async()
            .await;

        let gateway = AuthGateway::new(&config_for(&server)).unwrap();
        let status = gateway.status(None).await.unwrap();

        mock.assert_async().await;
        assert!(!status.authenticated);
    }

    #[tokio::test]
    async fn test_logout_reports_unauthenticated_on_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/authn/logout")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"authenticated": false}"#)
            .create_async()
            .await;

        let gateway = AuthGateway::new(&config_for(&server)).unwrap();
        let status = gateway.logout().await.unwrap();
        assert!(!status.authenticated);
    }

    #[tokio::test]
    async fn test_unexpected_status_is_malformed_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/authn/status")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let gateway = AuthGateway::new(&config_for(&server)).unwrap();
        let err = gateway.status(None).await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse(_)));
    }
}
