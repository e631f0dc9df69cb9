//! Filter error types

use http::StatusCode;
use rudiment_session_storage::SessionStoreError;

/// Status codes of the protocol outcomes produced by built-in filters
pub mod status_codes {
    use http::StatusCode;

    /// CSRF token issued, request not processed (204)
    pub const TOKEN_ISSUED: StatusCode = StatusCode::NO_CONTENT;
    /// CSRF validation failed (403)
    pub const CSRF_REJECTED: StatusCode = StatusCode::FORBIDDEN;
    /// Session expired after inactivity (440, outside the IANA registry)
    pub const SESSION_EXPIRED: u16 = 440;

    /// [`SESSION_EXPIRED`] as a status code
    pub fn session_expired() -> StatusCode {
        StatusCode::from_u16(SESSION_EXPIRED).unwrap_or(StatusCode::UNAUTHORIZED)
    }
}

/// Errors raised by a filter
///
/// Protocol outcomes such as a rejected CSRF token are not errors; filters
/// report them with [`FilterAction::Terminate`](super::FilterAction::Terminate).
/// Errors cover failures of the components a filter relies on.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Session storage error: {0}")]
    Session(#[from] SessionStoreError),

    #[error("Internal filter error: {0}")]
    Internal(String),
}

impl FilterError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Status of the terminal response for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Session(SessionStoreError::MaxSessionsReached(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status() {
        let err = FilterError::from(SessionStoreError::MaxSessionsReached(10));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "Session storage error: Maximum sessions limit reached: 10");

        let err = FilterError::internal("broken");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal filter error: broken");
    }

    #[test]
    fn test_session_expired_status() {
        assert_eq!(status_codes::session_expired().as_u16(), 440);
    }
}
