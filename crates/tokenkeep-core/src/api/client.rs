//! HTTP client for calls that need proof of identity.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, IntoUrl, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::AuthSessionManager;

use super::interceptor::{BearerAuth, Interceptor, LogoutOnUnauthorized};
use super::AuthError;

/// How long a request waits for startup hydration before giving up.
const DEFAULT_HYDRATION_WAIT_SECS: u64 = 10;

/// Sends protected requests on behalf of the current session.
///
/// Holds no session state of its own: the token is fetched from the
/// [`AuthSessionManager`] right before each dispatch. Non-2xx responses other
/// than 401 are handed back untouched, and nothing is retried.
///
/// Every request passes through the bearer stage, then any consumer
/// interceptors; every response passes through the 401 rule first, then the
/// consumer interceptors in reverse.
/// Clone is cheap - the connection pool and interceptors are shared.
#[derive(Clone)]
pub struct AuthenticatedHttpClient {
    client: Client,
    manager: Arc<AuthSessionManager>,
    bearer: Arc<BearerAuth>,
    unauthorized: Arc<LogoutOnUnauthorized>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    hydration_wait: Duration,
}

impl AuthenticatedHttpClient {
    /// Client sharing the login endpoint's connection pool
    pub fn new(manager: Arc<AuthSessionManager>) -> Self {
        let client = manager.api().client().clone();
        Self::with_client(client, manager)
    }

    pub fn with_client(client: Client, manager: Arc<AuthSessionManager>) -> Self {
        Self {
            client,
            bearer: Arc::new(BearerAuth::new(Arc::clone(&manager))),
            unauthorized: Arc::new(LogoutOnUnauthorized::new(Arc::clone(&manager))),
            manager,
            interceptors: Vec::new(),
            hydration_wait: Duration::from_secs(DEFAULT_HYDRATION_WAIT_SECS),
        }
    }

    /// How long [`execute`](Self::execute) waits for
    /// [`hydrate`](AuthSessionManager::hydrate) before failing with
    /// [`AuthError::NotAuthenticated`]
    pub fn with_hydration_wait(mut self, wait: Duration) -> Self {
        self.hydration_wait = wait;
        self
    }

    /// Add a consumer interceptor. It runs inside the bearer stage and the
    /// 401 rule, so it can neither skip the header nor swallow a 401.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn manager(&self) -> &Arc<AuthSessionManager> {
        &self.manager
    }

    /// Start building a request. Send it with [`execute`](Self::execute).
    pub fn request(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
        self.client.request(method, url)
    }

    pub fn get(&self, url: impl IntoUrl) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Dispatch `request` through the interceptor chain.
    ///
    /// Waits for hydration first, so a request issued during startup sees the
    /// restored session rather than racing it. If `hydrate` never runs, the
    /// request fails with [`AuthError::NotAuthenticated`] once the hydration
    /// wait runs out.
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response, AuthError> {
        if tokio::time::timeout(self.hydration_wait, self.manager.wait_until_hydrated())
            .await
            .is_err()
        {
            warn!(
                wait_secs = self.hydration_wait.as_secs_f64(),
                "Session was never hydrated, refusing protected request"
            );
            return Err(AuthError::NotAuthenticated);
        }

        let (mut request, sent_token) = self.bearer.attach(request)?;
        for interceptor in &self.interceptors {
            request = interceptor.before_send(request)?;
        }

        let response = request.send().await?;
        debug!(url = %response.url(), status = %response.status(), "Protected request completed");

        let mut response = self.unauthorized.check(&sent_token, response)?;
        for interceptor in self.interceptors.iter().rev() {
            response = interceptor.after_receive(response)?;
        }
        Ok(response)
    }

    /// GET `url` and parse a JSON body.
    ///
    /// Unlike [`execute`](Self::execute), a non-2xx status is an error here
    /// since there is no body of type `T` to return.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AuthError> {
        let response = self.execute(self.get(url)).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "Status {}: {}",
                status,
                AuthError::truncate_body(&body)
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            AuthError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }
}
