//! HTTP side of the session: the login endpoint and protected requests.
//!
//! `AuthApi` exchanges credentials for a token. `AuthenticatedHttpClient`
//! sends requests that need that token, through an `Interceptor` chain that
//! attaches the bearer header and turns a 401 into a forced logout.

pub mod auth;
pub mod client;
pub mod error;
pub mod interceptor;

pub use auth::AuthApi;
pub use client::AuthenticatedHttpClient;
pub use error::AuthError;
pub use interceptor::{BearerAuth, Interceptor, LogoutOnUnauthorized};
