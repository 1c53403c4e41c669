//! Client for the login endpoint.

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{LoginRequest, LoginResponse};

use super::AuthError;

/// Path of the login endpoint, relative to the auth base URL
const LOGIN_PATH: &str = "/api/auth/login";

/// Error body returned by the login endpoint on failure
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Talks to `POST <base>/api/auth/login`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthApi {
    client: Client,
    base_url: String,
}

impl AuthApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Share an existing connection pool
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange credentials for a token. No retries.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, AuthError> {
        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        debug!(url = %url, username, "Sending login request");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Self::login_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            AuthError::InvalidResponse(format!(
                "Failed to parse login response: {} ({})",
                e,
                AuthError::truncate_body(&body)
            ))
        })
    }

    /// Turn a failed login response into a displayable error
    fn login_error(status: StatusCode, body: &str) -> AuthError {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                error: Some(message),
            }) if !message.is_empty() => AuthError::InvalidCredentials(message),
            _ => {
                warn!(
                    status = %status,
                    body = %AuthError::truncate_body(body),
                    "Login failed without an error message"
                );
                AuthError::InvalidCredentials(format!("Login failed (HTTP {})", status.as_u16()))
            }
        }
    }
}
