//! Client-side session management for bearer-token authentication.
//!
//! The crate acquires a signed session token from a login endpoint, keeps it
//! in a persisted slot across restarts, expires it when its `exp` claim passes,
//! and attaches it to outgoing requests that need proof of identity.
//!
//! - [`auth`]: token decoding, expiry, storage and the [`AuthSessionManager`]
//! - [`api`]: the login endpoint client and the [`AuthenticatedHttpClient`]
//! - [`models`]: user-facing data types
//! - [`config`]: on-disk configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{AuthApi, AuthError, AuthenticatedHttpClient};
pub use auth::{AuthSessionManager, AuthState, Session};
pub use config::Config;
pub use models::User;
