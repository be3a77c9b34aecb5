use crate::RetryPolicy;
use thiserror::Error;

/// Problems with a run's configuration. These are the only errors which abort a run, and they
/// are always raised before any request is issued.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("No scenarios configured")]
    NoScenarios,

    #[error("Scenario `{name}` has a non-positive weight ({weight})")]
    NonPositiveWeight { name: String, weight: f64 },

    #[error("Sum of scenario weights is not finite (overflowed at `{0}`)")]
    WeightOverflow(String),

    #[error("Scenario `{name}` cannot be turned into a request: {reason}")]
    InvalidScenario { name: String, reason: String },

    #[error("Scenario `{0}` is defined more than once")]
    DuplicateScenario(String),

    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Run has no stop condition; set a duration or a per-worker request cap")]
    Unbounded,

    #[error("Invalid grading bands: {0}")]
    InvalidGrading(String),

    #[error("Unable to construct HTTP client: {0}")]
    HttpClient(String),
}

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("attempt timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RequestError {
    /// Connection failures and timeouts are always retryable; status failures only when the
    /// policy lists the code.
    pub fn is_retryable(&self, policy: &RetryPolicy) -> bool {
        match self {
            RequestError::Timeout | RequestError::Network(_) => true,
            RequestError::Status(code) => policy.retryable_status_codes.contains(code),
            RequestError::InvalidRequest(_) => false,
        }
    }
}
