use crate::RequestError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Stable label for why a logical request failed. Used as the key of the error histogram, so it
/// deliberately drops free-form detail such as OS error messages.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub enum FailureReason {
    Status(u16),
    Timeout,
    Network,
    InvalidRequest,
}

impl From<&RequestError> for FailureReason {
    fn from(err: &RequestError) -> Self {
        match err {
            RequestError::Status(code) => FailureReason::Status(*code),
            RequestError::Timeout => FailureReason::Timeout,
            RequestError::Network(_) => FailureReason::Network,
            RequestError::InvalidRequest(_) => FailureReason::InvalidRequest,
        }
    }
}

impl From<FailureReason> for String {
    fn from(reason: FailureReason) -> Self {
        reason.to_string()
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Status(code) => write!(f, "HTTP {code}"),
            FailureReason::Timeout => f.write_str("timeout"),
            FailureReason::Network => f.write_str("network error"),
            FailureReason::InvalidRequest => f.write_str("invalid request"),
        }
    }
}

/// The single result of one logical request. Retries collapse into one outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestOutcome {
    pub scenario: String,
    /// Status of the final attempt, if it got far enough to have one.
    pub status: Option<u16>,
    /// `None` on success.
    pub failure: Option<FailureReason>,
    /// From the start of the first attempt to final resolution, backoff sleeps included.
    pub latency: Duration,
    /// Attempts beyond the first.
    pub retry_count: u32,
}

impl RequestOutcome {
    pub fn success(scenario: &str, status: u16, latency: Duration, retry_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            status: Some(status),
            failure: None,
            latency,
            retry_count,
        }
    }

    pub fn failure(
        scenario: &str,
        error: &RequestError,
        latency: Duration,
        retry_count: u32,
    ) -> Self {
        let status = match error {
            RequestError::Status(code) => Some(*code),
            _ => None,
        };
        Self {
            scenario: scenario.to_string(),
            status,
            failure: Some(error.into()),
            latency,
            retry_count,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Whether a status code counts as a successful response.
pub fn is_success_status(status: u16) -> bool {
    (200..400).contains(&status)
}
