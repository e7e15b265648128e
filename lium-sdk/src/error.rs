use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LiumError>;

#[derive(Debug, Error)]
pub enum LiumError {
    #[error("authentication failed: {message}")]
    Authentication { message: String, body: Option<Value> },

    #[error("invalid request (HTTP {status}): {message}")]
    Validation {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("rate limit exceeded: {message}")]
    RateLimit { message: String, body: Option<Value> },

    #[error("server error (HTTP {status}): {message}")]
    Server {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("connection error: {0}")]
    Connection(#[source] reqwest::Error),

    #[error("unexpected API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{message} ({hint})")]
    Configuration { message: String, hint: String },

    #[error("ssh to {target} failed: {message}")]
    Ssh { target: String, message: String },

    #[error("rsync failed (exit {status}): {stderr}")]
    Sync { status: i32, stderr: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl LiumError {
    /// Rate limits, 5xx and connection-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LiumError::RateLimit { .. } | LiumError::Server { .. } | LiumError::Connection(_)
        )
    }

    pub fn configuration(message: impl Into<String>, hint: impl Into<String>) -> Self {
        LiumError::Configuration {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// HTTP status for API-level errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            LiumError::Authentication { .. } => Some(401),
            LiumError::RateLimit { .. } => Some(429),
            LiumError::Validation { status, .. }
            | LiumError::Server { status, .. }
            | LiumError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify a non-success response. `body` is the raw response text.
    pub fn from_status(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status));

        match status {
            401 => LiumError::Authentication {
                message,
                body: parsed,
            },
            400 | 422 => LiumError::Validation {
                status,
                message,
                body: parsed,
            },
            429 => LiumError::RateLimit {
                message,
                body: parsed,
            },
            500..=599 => LiumError::Server {
                status,
                message,
                body: parsed,
            },
            _ => LiumError::Api {
                status,
                message,
                body: parsed,
            },
        }
    }
}
