//! Request/response hooks for protected calls.
//!
//! The bearer header and the 401 rule are fixed stages of
//! [`AuthenticatedHttpClient`](super::AuthenticatedHttpClient); consumers add
//! their own steps with [`Interceptor`], which always run inside them.

use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::warn;

use crate::auth::AuthSessionManager;

use super::AuthError;

/// A consumer-supplied step in the protected request pipeline.
///
/// `before_send` runs in chain order after the bearer header is attached;
/// `after_receive` runs in reverse, after the 401 rule has already seen the
/// response. An interceptor cannot hide a 401 from the session.
pub trait Interceptor: Send + Sync {
    fn before_send(&self, request: RequestBuilder) -> Result<RequestBuilder, AuthError> {
        Ok(request)
    }

    fn after_receive(&self, response: Response) -> Result<Response, AuthError> {
        Ok(response)
    }
}

/// Attaches `Authorization: Bearer <token>`, or refuses to send at all when
/// there is no currently valid session.
pub struct BearerAuth {
    manager: Arc<AuthSessionManager>,
}

impl BearerAuth {
    pub fn new(manager: Arc<AuthSessionManager>) -> Self {
        Self { manager }
    }

    /// Returns the request with the header set, and the token that was used
    pub fn attach(&self, request: RequestBuilder) -> Result<(RequestBuilder, String), AuthError> {
        let token = self
            .manager
            .current_token()
            .ok_or(AuthError::NotAuthenticated)?;
        Ok((request.bearer_auth(&token), token))
    }
}

/// The one place a server can end the client's session: a 401 logs out and
/// surfaces as [`AuthError::SessionExpired`].
///
/// Only the session whose token was sent is ended. A 401 that arrives after
/// that token was replaced by a newer login leaves the newer session alone.
pub struct LogoutOnUnauthorized {
    manager: Arc<AuthSessionManager>,
}

impl LogoutOnUnauthorized {
    pub fn new(manager: Arc<AuthSessionManager>) -> Self {
        Self { manager }
    }

    pub fn check(&self, sent_token: &str, response: Response) -> Result<Response, AuthError> {
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        if self.manager.force_logout_if_current(sent_token) {
            warn!(url = %response.url(), "Protected request was rejected, ended session");
        } else {
            warn!(url = %response.url(), "Protected request was rejected for a token no longer in use");
        }
        Err(AuthError::SessionExpired)
    }
}
