use thiserror::Error;

/// Outcomes of a call that never produced a usable envelope.
///
/// Structured error responses from the backend are not represented here;
/// they come back as an `ApiResponse` with `success == false`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("Session is no longer valid - please log in again")]
    SessionInvalid,

    #[error("Invalid API path '{0}': must be a relative route starting with '/'")]
    InvalidPath(String),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
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

    pub(crate) fn invalid_body(status: reqwest::StatusCode, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        ApiError::InvalidResponse(format!(
            "Status {} without envelope: {}",
            status,
            Self::truncate_body(&text)
        ))
    }

    /// Whether the caller should send the user back to the login screen.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::SessionInvalid)
    }

    /// Non-technical message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ApiError::Transport { source, .. } if source.is_timeout() => {
                "The server took too long to respond. Please try again."
            }
            ApiError::Transport { .. } => {
                "Unable to reach the server. Check your connection and try again."
            }
            ApiError::SessionInvalid => "Your session has expired. Please log in again.",
            ApiError::InvalidPath(_) | ApiError::Encode(_) | ApiError::Config(_) => {
                "The request could not be prepared. Please try again."
            }
            ApiError::InvalidResponse(_) => {
                "The server returned an unexpected response. Please try again later."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body() {
        assert_eq!(ApiError::truncate_body("short"), "short");

        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with(&format!("(truncated, {} total bytes)", long.len())));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        // 'é' is two bytes, so the cut lands mid-character
        let body = format!("a{}", "é".repeat(MAX_ERROR_BODY_LENGTH));
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_requires_login() {
        assert!(ApiError::SessionInvalid.requires_login());
        assert!(!ApiError::InvalidPath("titles".into()).requires_login());
        assert_eq!(
            ApiError::SessionInvalid.user_message(),
            "Your session has expired. Please log in again."
        );
    }
}
