//! Session handling: token decoding, expiry, persistence and the manager.
//!
//! This module provides:
//! - `token`: decode a compact token into `Claims` (no signature check)
//! - `expiry`: validity decisions and the `Clock` they are made against
//! - `SessionStore`: the persisted token slot (file, keyring or memory)
//! - `AuthSessionManager`: owner of the single live `Session`
//!
//! Sessions end on logout, on expiry, or when a protected call comes back 401.

pub mod credentials;
pub mod expiry;
pub mod session;
pub mod store;
pub mod token;

pub use credentials::KeyringSessionStore;
pub use expiry::{Clock, ManualClock, SystemClock};
pub use session::{AuthSessionManager, AuthState, Session};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use token::Claims;
