use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Payment errors
    #[error("Payment error: {0}")]
    Payment(String),

    // Auth errors
    #[error("Auth error ({status}): {message}")]
    Auth {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Auth session missing")]
    AuthSessionMissing,

    // Session storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // HTTP errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Auth API rejected the request's credentials, or the session no longer exists.
    pub fn is_session_rejection(&self) -> bool {
        matches!(self, AppError::Auth { status: 401 | 403 | 404, .. })
            || matches!(self, AppError::AuthSessionMissing)
    }

    /// Error returned by the auth API itself (as opposed to transport or local failures).
    pub fn is_auth_api_error(&self) -> bool {
        matches!(self, AppError::Auth { .. })
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_rejection() {
        let err = AppError::Auth {
            status: 401,
            code: Some("bad_jwt".to_string()),
            message: "invalid JWT".to_string(),
        };
        assert!(err.is_session_rejection());
        assert!(AppError::AuthSessionMissing.is_session_rejection());

        let err = AppError::Auth {
            status: 500,
            code: None,
            message: "boom".to_string(),
        };
        assert!(!err.is_session_rejection());
        assert!(err.is_auth_api_error());
        assert!(!AppError::Payment("x".to_string()).is_session_rejection());
    }

    #[test]
    fn test_error_display() {
        let err = AppError::Auth {
            status: 400,
            code: Some("invalid_credentials".to_string()),
            message: "Invalid login credentials".to_string(),
        };
        assert_eq!(err.to_string(), "Auth error (400): Invalid login credentials");
    }
}
