use reqwest::StatusCode;

/// Shown to end users when the backend gave no message of its own.
pub const GENERIC_USER_MESSAGE: &str = "Something went wrong. Please try again.";

/// Where the browser is sent once the session cannot be recovered.
pub const LOGIN_REDIRECT: &str = "/Home/Index?authModal=login&error=Your+session+has+expired";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Non-2xx response other than 401.
    #[error("API request failed with status {status}: {}", message.as_deref().unwrap_or("no details"))]
    Status {
        status: StatusCode,
        message: Option<String>,
    },

    /// 2xx response whose envelope carried `success: false`.
    #[error("API request was rejected: {}", message.as_deref().unwrap_or("no details"))]
    Rejected {
        status: StatusCode,
        message: Option<String>,
    },

    /// 401. `refreshed` is true when a silent refresh succeeded, so the
    /// next call will carry a fresh token.
    #[error("401 Unauthorized: {}", message.as_deref().unwrap_or("authentication failed"))]
    Unauthorized {
        message: Option<String>,
        refreshed: bool,
    },

    /// 401 and the silent refresh failed. Stored tokens have been cleared.
    #[error("Session expired")]
    SessionExpired { redirect: String },

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } | ApiError::Rejected { status, .. } => Some(*status),
            ApiError::Unauthorized { .. } | ApiError::SessionExpired { .. } => Some(StatusCode::UNAUTHORIZED),
            ApiError::Transport(e) => e.status(),
            ApiError::Decode(_) => None,
        }
    }

    /// Text safe to show an end user: the backend's own message verbatim when
    /// it sent one, otherwise a generic retry hint. Never internal detail.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message: Some(m), .. }
            | ApiError::Rejected { message: Some(m), .. }
            | ApiError::Unauthorized { message: Some(m), refreshed: false } => m.clone(),
            ApiError::Unauthorized { refreshed: true, .. } => {
                "Your session was refreshed. Please try again.".to_string()
            }
            ApiError::SessionExpired { .. } => "Your session has expired".to_string(),
            _ => GENERIC_USER_MESSAGE.to_string(),
        }
    }

    pub fn login_redirect(&self) -> Option<&str> {
        match self {
            ApiError::SessionExpired { redirect } => Some(redirect),
            _ => None,
        }
    }
}
