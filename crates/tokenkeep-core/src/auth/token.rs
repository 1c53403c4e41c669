//! Compact token decoding.
//!
//! Tokens are three dot-separated segments (`header.payload.signature`) with
//! a base64url JSON payload. Signatures are not verified here: the claims are
//! read for display and expiry decisions only.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::SubjectId;

/// base64url engine that accepts payloads with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Header used by [`encode_unsigned`].
const UNSIGNED_HEADER: &str = r#"{"alg":"none","typ":"JWT"}"#;

/// The claim set this crate reads from a token payload.
/// Any other claims the issuer adds (`sub`, `iss`, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: SubjectId,
    pub username: String,
    pub role: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    /// Issued-at, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl Claims {
    /// True once `now` has reached the expiry instant.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }

    /// Seconds left before expiry, clamped at zero.
    pub fn seconds_until_expiry(&self, now: i64) -> i64 {
        (self.exp - now).max(0)
    }
}

/// Decode the claim set of `token`.
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url JSON payload carrying the expected claims. Garbage in the
/// persisted slot is an ordinary condition, so this never errors or panics.
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        debug!("Token does not have three segments");
        return None;
    };

    let bytes = match URL_SAFE_LENIENT.decode(payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Token payload is not valid base64url");
            return None;
        }
    };

    match serde_json::from_slice::<Claims>(&bytes) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!(error = %e, "Token payload is not a valid claim set");
            None
        }
    }
}

/// Build an unsigned token (`alg: none`, empty signature) carrying `claims`.
///
/// Useful for fixtures and local tooling; [`decode`] accepts the result.
pub fn encode_unsigned(claims: &Claims) -> serde_json::Result<String> {
    let payload = serde_json::to_vec(claims)?;
    Ok(format!(
        "{}.{}.",
        URL_SAFE_LENIENT.encode(UNSIGNED_HEADER),
        URL_SAFE_LENIENT.encode(payload)
    ))
}
