//! The seam between the retry loop and the network.
//!
//! A [`Transport`] performs exactly one attempt and reports the raw status code. Success/failure
//! classification, timeouts, and retries all live in [`crate::client::RetryingHttpClient`], so
//! transports stay small and can be stacked: [`Instrumented`] wraps any other transport to add
//! timing, logs and metrics without the inner transport knowing about it.
use reqwest::{Client, Method};
use stampede_core::{ConfigurationError, RequestError, ScenarioDefinition};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// A fully resolved request, built once per logical request.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestSpec {
    pub scenario: String,
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestSpec {
    pub fn build(scenario: &ScenarioDefinition, base_url: &Url) -> Result<Self, RequestError> {
        let url = scenario
            .url(base_url)
            .map_err(|e| RequestError::InvalidRequest(format!("{}: {e}", scenario.path)))?;

        Ok(Self {
            scenario: scenario.name.clone(),
            method: scenario.method.clone(),
            url,
            headers: scenario.headers.clone(),
            body: scenario.body.clone(),
        })
    }
}

/// Per-attempt state threaded down the retry loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptState {
    index: u32,
}

impl AttemptState {
    pub fn first() -> Self {
        Self { index: 0 }
    }

    pub fn next(self) -> Self {
        Self {
            index: self.index + 1,
        }
    }

    /// 1-based attempt number.
    pub fn number(&self) -> u32 {
        self.index + 1
    }

    /// Attempts made before this one.
    pub fn retries(&self) -> u32 {
        self.index
    }
}

/// Performs a single attempt of a request.
pub trait Transport: Send + Sync + 'static {
    /// Send `request` once and return the response status. Status codes are not interpreted
    /// here; only failures to obtain a status are errors.
    fn send(
        &self,
        request: &RequestSpec,
        attempt: &AttemptState,
    ) -> impl Future<Output = Result<u16, RequestError>> + Send;
}

/// [`Transport`] backed by a pooled `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ConfigurationError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &RequestSpec, _attempt: &AttemptState) -> Result<u16, RequestError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();

        // Drain the body so the connection can be reused and latency covers the full response.
        response.bytes().await.map_err(classify)?;

        Ok(status)
    }
}

fn classify(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        RequestError::Timeout
    } else if err.is_builder() {
        RequestError::InvalidRequest(err.to_string())
    } else {
        RequestError::Network(err.to_string())
    }
}

/// Decorator which times every attempt, logs it, and (with the `metrics` feature) records it
/// through the `metrics` facade.
#[derive(Clone, Debug)]
pub struct Instrumented<T> {
    inner: T,
}

impl<T> Instrumented<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for Instrumented<T> {
    async fn send(&self, request: &RequestSpec, attempt: &AttemptState) -> Result<u16, RequestError> {
        let start = Instant::now();
        let res = self.inner.send(request, attempt).await;
        let elapsed = start.elapsed();

        match &res {
            Ok(status) => trace!(
                scenario = %request.scenario,
                attempt = attempt.number(),
                status,
                ?elapsed,
                "attempt complete"
            ),
            Err(err) => trace!(
                scenario = %request.scenario,
                attempt = attempt.number(),
                %err,
                ?elapsed,
                "attempt failed"
            ),
        }

        #[cfg(feature = "metrics")]
        record_metrics(&request.scenario, &res, elapsed);

        res
    }
}

#[cfg(feature = "metrics")]
fn record_metrics(scenario: &str, res: &Result<u16, RequestError>, elapsed: Duration) {
    let scenario = scenario.to_string();
    metrics::histogram!("stampede_attempt_latency", "scenario" => scenario.clone())
        .record(elapsed.as_secs_f64());

    match res {
        Ok(status) if stampede_core::is_success_status(*status) => {
            metrics::counter!("stampede_attempt_success", "scenario" => scenario).increment(1);
        }
        _ => {
            metrics::counter!("stampede_attempt_error", "scenario" => scenario).increment(1);
        }
    }
}
