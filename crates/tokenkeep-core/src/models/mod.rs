//! Data models shared between the session manager and its consumers.
//!
//! - `User`, `SubjectId`: the identity projection of a token's claims
//! - `LoginRequest`, `LoginResponse`: login endpoint payloads

pub mod user;

pub use user::{LoginRequest, LoginResponse, SubjectId, User};
