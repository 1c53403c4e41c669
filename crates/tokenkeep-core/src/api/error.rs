use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token could not be decoded")]
    MalformedToken,

    #[error("Token has already expired")]
    Expired,

    /// Carries the server's message verbatim for display.
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Network error: {0}")]
    NetworkFailure(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not authenticated or session has expired")]
    NotAuthenticated,

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Login was superseded by a logout")]
    Superseded,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl AuthError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Whether this error means the user has to sign in (again)
    pub fn requires_login(&self) -> bool {
        matches!(self, AuthError::NotAuthenticated | AuthError::SessionExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body() {
        assert_eq!(AuthError::truncate_body("short"), "short");

        let long = "é".repeat(400); // 800 bytes, 2-byte chars
        let truncated = AuthError::truncate_body(&long);
        assert!(truncated.ends_with("(truncated, 800 total bytes)"));
        assert!(truncated.starts_with(&"é".repeat(250)));
    }

    #[test]
    fn test_invalid_credentials_message_is_verbatim() {
        let err = AuthError::InvalidCredentials("使用者名稱或密碼錯誤".to_string());
        assert_eq!(err.to_string(), "使用者名稱或密碼錯誤");
        assert!(!err.requires_login());
        assert!(AuthError::SessionExpired.requires_login());
        assert!(AuthError::NotAuthenticated.requires_login());
    }
}
