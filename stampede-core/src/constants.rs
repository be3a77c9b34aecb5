use std::time::Duration;

/// Attempts beyond the first before a logical request is given up on.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff before the first retry, ignoring jitter.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Upper bound on any single backoff sleep.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Jitter added to every backoff is drawn from `[0, DEFAULT_RETRY_JITTER)`.
pub const DEFAULT_RETRY_JITTER: Duration = Duration::from_millis(1000);

/// Status codes which are worth retrying.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 4] = [429, 502, 503, 504];

/// Timeout applied to each individual attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the harness waits for workers after the stop condition fires.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Reliability bands, in percent of successful requests.
pub const DEFAULT_RELIABILITY_BANDS: (f64, f64, f64) = (98., 95., 90.);

/// Throughput bands, in requests per second.
pub const DEFAULT_THROUGHPUT_BANDS: (f64, f64, f64) = (100., 50., 10.);

/// p99 latency bands, in milliseconds. Lower is better.
pub const DEFAULT_P99_BANDS: (f64, f64, f64) = (200., 500., 1000.);
