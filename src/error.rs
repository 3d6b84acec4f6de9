//! Error types for the delivery-metrics run.

use std::time::Duration;

/// Errors that abort a metrics run.
///
/// Every variant is fatal for the run as a whole; `RateLimited` and `Network`
/// are retried by the HTTP collaborators before they surface here.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MetricsError {
    /// Two API calls could not be stitched into a valid timeline.
    #[error("correlation error for PR #{pr_number}: {reason}")]
    Correlation { pr_number: u64, reason: String },

    /// Authentication failed or token lacks access.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Repository or CI project not found.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Rate limit exceeded.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Transport failure or server-side (5xx) error.
    #[error("network error: {message}")]
    Network { message: String },

    /// A single remote call exceeded the configured timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// A remote answered with something we could not interpret.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// CSV artifact could not be written.
    #[error("export error: {message}")]
    Export { message: String },
}

impl MetricsError {
    pub(crate) fn correlation(pr_number: u64, reason: impl Into<String>) -> Self {
        Self::Correlation {
            pr_number,
            reason: reason.into(),
        }
    }

    /// Exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 1,
            Self::Unauthorized { .. } => 2,
            Self::NotFound { .. } => 3,
            Self::Correlation { .. } => 4,

            // Network/transient
            Self::RateLimited { .. } => 5,
            Self::Network { .. } => 5,
            Self::Timeout { .. } => 5,

            Self::InvalidResponse { .. } => 6,
            Self::Export { .. } => 7,
        }
    }

    /// Whether the error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }
}

impl From<reqwest::Error> for MetricsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::InvalidResponse {
                message: err.to_string(),
            };
        }
        Self::Network {
            message: err.to_string(),
        }
    }
}

impl From<octocrab::Error> for MetricsError {
    fn from(err: octocrab::Error) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } => {
                github_error(source.status_code.as_u16(), &source.message)
            }
            octocrab::Error::Serde { .. } | octocrab::Error::Json { .. } => Self::InvalidResponse {
                message: err.to_string(),
            },
            _ => Self::Network {
                message: err.to_string(),
            },
        }
    }
}

/// Classifies a GitHub error body by status, falling back to its message.
fn github_error(status: u16, body_message: &str) -> MetricsError {
    let message = body_message.to_lowercase();
    let rate_limited = message.contains("rate limit");

    match status {
        429 => MetricsError::RateLimited { retry_after: None },
        403 if rate_limited => MetricsError::RateLimited { retry_after: None },
        401 | 403 => MetricsError::Unauthorized {
            message: body_message.to_string(),
        },
        404 => MetricsError::NotFound {
            resource: body_message.to_string(),
        },
        500..=599 => MetricsError::Network {
            message: format!("GitHub server error {status}: {body_message}"),
        },
        _ if rate_limited => MetricsError::RateLimited { retry_after: None },
        _ if message.contains("bad credentials") || message.contains("requires authentication") => {
            MetricsError::Unauthorized {
                message: body_message.to_string(),
            }
        }
        _ => MetricsError::InvalidResponse {
            message: body_message.to_string(),
        },
    }
}

impl From<std::io::Error> for MetricsError {
    fn from(err: std::io::Error) -> Self {
        Self::Export {
            message: err.to_string(),
        }
    }
}

/// Result type for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;
