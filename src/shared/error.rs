use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Remote object not found: {0}")]
    RemoteNotFound(String),

    #[error("Remote API error ({status}): {message}")]
    RemoteApi {
        status: u16,
        message: String,
        details: Option<String>,
    },

    #[error("Verification failed for {field}: wrote {expected:?}, read back {actual:?}")]
    Verification {
        field: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Portal session expired: {0}")]
    SessionExpired(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::RemoteNotFound(_))
    }

    /// Transient failures are the only ones worth another attempt: server
    /// errors, throttling and timeouts. Everything else is deterministic.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Timeout(_) => true,
            AppError::RemoteApi { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AppError::Timeout(err.to_string());
        }
        let status = err.status().map(|s| s.as_u16()).unwrap_or(0);
        AppError::RemoteApi {
            status,
            message: err.to_string(),
            details: None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
