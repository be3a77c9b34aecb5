use crate::{
    ConfigurationError, GradingConfig, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRYABLE_STATUS_CODES, DEFAULT_RETRY_JITTER,
    DEFAULT_SHUTDOWN_GRACE,
};
use http::{HeaderName, HeaderValue, Method};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// A weighted request template.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioDefinition {
    pub name: String,
    pub method: Method,
    /// Either a path relative to the run's base URL or an absolute URL.
    pub path: String,
    /// Relative weight. Weights do not need to sum to anything in particular.
    pub weight: f64,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl ScenarioDefinition {
    pub fn new(name: &str, method: Method, path: &str, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            method,
            path: path.to_string(),
            weight,
            headers: vec![],
            body: None,
        }
    }

    pub fn get(name: &str, path: &str, weight: f64) -> Self {
        Self::new(name, Method::GET, path, weight)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Resolve the scenario's target against `base`.
    ///
    /// Relative paths are appended to the base URL's path rather than replacing its last
    /// segment, so `http://host/api` + `items` is `http://host/api/items`. The base URL's query
    /// is kept and a query on the relative path is appended to it.
    pub fn url(&self, base: &Url) -> Result<Url, url::ParseError> {
        match Url::parse(&self.path) {
            Ok(absolute) => return Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => {}
            Err(err) => return Err(err),
        }
        if base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }

        let (rest, fragment) = match self.path.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (self.path.as_str(), None),
        };
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };

        let mut url = base.clone();
        url.set_path(&format!(
            "{}/{}",
            base.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        ));
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            let merged = match base.query().filter(|q| !q.is_empty()) {
                Some(existing) => format!("{existing}&{query}"),
                None => query.to_string(),
            };
            url.set_query(Some(&merged));
        }
        if fragment.is_some() {
            url.set_fragment(fragment);
        }
        Ok(url)
    }

    /// Check that the scenario can be turned into a request against `base`.
    pub fn validate_request(&self, base: &Url) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidScenario {
            name: self.name.clone(),
            reason,
        };

        self.url(base)
            .map_err(|e| invalid(format!("{}: {e}", self.path)))?;
        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| invalid(format!("header name `{name}`: {e}")))?;
            HeaderValue::from_str(value)
                .map_err(|e| invalid(format!("header `{name}` value: {e}")))?;
        }
        Ok(())
    }
}

/// How failed attempts are retried.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper (exclusive) bound on the uniform jitter added to each backoff.
    pub jitter: Duration,
    pub retryable_status_codes: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: DEFAULT_RETRY_JITTER,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// A policy which never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Backoff before retry `attempt` (1-based) without jitter: `base * 2^(attempt-1)`, capped
    /// at `max_delay`.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff before retry `attempt` with an already drawn jitter value. The cap applies after
    /// jitter is added.
    pub fn backoff(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .saturating_add(jitter)
            .min(self.max_delay)
    }
}

/// Idle time between a virtual user's requests: `base` plus uniform jitter in `[0, jitter)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThinkTime {
    pub base: Duration,
    pub jitter: Duration,
}

impl ThinkTime {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fixed(base: Duration) -> Self {
        Self {
            base,
            jitter: Duration::ZERO,
        }
    }

    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    /// Think time for a jitter fraction in `[0, 1)`.
    pub fn with_fraction(&self, fraction: f64) -> Duration {
        self.base + self.jitter.mul_f64(fraction.clamp(0., 1.))
    }
}

/// When a run ends. Either bound (or both) may be given; whichever fires first wins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StopCondition {
    pub duration: Option<Duration>,
    pub max_requests_per_worker: Option<u64>,
}

impl StopCondition {
    pub fn is_bounded(&self) -> bool {
        self.duration.is_some() || self.max_requests_per_worker.is_some()
    }
}

/// Everything a run needs. Built once, read-only afterwards.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Label shown in reports, usually the profile name.
    pub name: String,
    pub base_url: Url,
    pub scenarios: Vec<ScenarioDefinition>,
    pub concurrency: usize,
    pub stop: StopCondition,
    pub think_time: ThinkTime,
    pub retry_policy: RetryPolicy,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    /// Optional cap on logical requests per second across all workers.
    pub max_rps: Option<NonZeroU32>,
    pub grading: GradingConfig,
}

impl RunConfig {
    pub fn builder(base_url: &str) -> RunConfigBuilder {
        RunConfigBuilder::new(base_url)
    }

    /// Check every invariant a run depends on. Called by the harness before any worker is
    /// spawned, so a hand-assembled config gets the same treatment as a built one.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_base_url(&self.base_url)?;

        if self.scenarios.is_empty() {
            return Err(ConfigurationError::NoScenarios);
        }

        let mut names = HashSet::new();
        let mut total_weight = 0.;
        for scenario in &self.scenarios {
            if !(scenario.weight.is_finite() && scenario.weight > 0.) {
                return Err(ConfigurationError::NonPositiveWeight {
                    name: scenario.name.clone(),
                    weight: scenario.weight,
                });
            }
            total_weight += scenario.weight;
            if !total_weight.is_finite() {
                return Err(ConfigurationError::WeightOverflow(scenario.name.clone()));
            }
            if !names.insert(scenario.name.as_str()) {
                return Err(ConfigurationError::DuplicateScenario(scenario.name.clone()));
            }
            scenario.validate_request(&self.base_url)?;
        }

        if self.concurrency == 0 {
            return Err(ConfigurationError::ZeroConcurrency);
        }

        if !self.stop.is_bounded() {
            return Err(ConfigurationError::Unbounded);
        }

        self.grading.validate()
    }
}

fn validate_base_url(url: &Url) -> Result<(), ConfigurationError> {
    match url.scheme() {
        "http" | "https" if !url.cannot_be_a_base() => Ok(()),
        _ => Err(ConfigurationError::InvalidBaseUrl(url.to_string())),
    }
}

/// Chainable construction of a [`RunConfig`].
///
/// # Example
/// ```
/// use stampede_core::{RunConfig, ScenarioDefinition, ThinkTime};
/// use std::time::Duration;
///
/// let config = RunConfig::builder("http://localhost:8080")
///     .scenario(ScenarioDefinition::get("list-items", "/items", 3.))
///     .scenario(ScenarioDefinition::get("get-item", "/items/1", 1.))
///     .concurrency(5)
///     .duration(Duration::from_secs(30))
///     .think_time(ThinkTime::fixed(Duration::from_millis(250)))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.scenarios.len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct RunConfigBuilder {
    name: String,
    base_url: String,
    scenarios: Vec<ScenarioDefinition>,
    concurrency: usize,
    stop: StopCondition,
    think_time: ThinkTime,
    retry_policy: RetryPolicy,
    request_timeout: Duration,
    shutdown_grace: Duration,
    max_rps: Option<NonZeroU32>,
    grading: GradingConfig,
}

impl RunConfigBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            name: "custom".to_string(),
            base_url: base_url.to_string(),
            scenarios: vec![],
            concurrency: 1,
            stop: StopCondition::default(),
            think_time: ThinkTime::none(),
            retry_policy: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            max_rps: None,
            grading: GradingConfig::default(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn scenario(mut self, scenario: ScenarioDefinition) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn scenarios(mut self, scenarios: impl IntoIterator<Item = ScenarioDefinition>) -> Self {
        self.scenarios.extend(scenarios);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.stop.duration = Some(duration);
        self
    }

    pub fn max_requests_per_worker(mut self, max: u64) -> Self {
        self.stop.max_requests_per_worker = Some(max);
        self
    }

    pub fn think_time(mut self, think_time: ThinkTime) -> Self {
        self.think_time = think_time;
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn max_rps(mut self, max_rps: NonZeroU32) -> Self {
        self.max_rps = Some(max_rps);
        self
    }

    pub fn grading(mut self, grading: GradingConfig) -> Self {
        self.grading = grading;
        self
    }

    pub fn build(self) -> Result<RunConfig, ConfigurationError> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| ConfigurationError::InvalidBaseUrl(format!("{}: {e}", self.base_url)))?;

        let config = RunConfig {
            name: self.name,
            base_url,
            scenarios: self.scenarios,
            concurrency: self.concurrency,
            stop: self.stop,
            think_time: self.think_time,
            retry_policy: self.retry_policy,
            request_timeout: self.request_timeout,
            shutdown_grace: self.shutdown_grace,
            max_rps: self.max_rps,
            grading: self.grading,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Named run shapes. Each one is a starting point; any field can be overridden on the returned
/// builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    /// A couple of users for a short while; checks the service is up and sane.
    Smoke,
    /// Many users with short think times.
    Stress,
    /// A moderate population held for a long time.
    Endurance,
}

impl Profile {
    pub fn builder(self, base_url: &str) -> RunConfigBuilder {
        let builder = RunConfig::builder(base_url).name(self.as_str());
        match self {
            Profile::Smoke => builder
                .concurrency(2)
                .duration(Duration::from_secs(30))
                .think_time(ThinkTime::fixed(Duration::from_secs(1))),
            Profile::Stress => builder
                .concurrency(50)
                .duration(Duration::from_secs(5 * 60))
                .think_time(ThinkTime::new(
                    Duration::from_millis(100),
                    Duration::from_millis(100),
                )),
            Profile::Endurance => builder
                .concurrency(10)
                .duration(Duration::from_secs(60 * 60))
                .think_time(ThinkTime::new(
                    Duration::from_secs(1),
                    Duration::from_millis(500),
                )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Smoke => "smoke",
            Profile::Stress => "stress",
            Profile::Endurance => "endurance",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smoke" => Ok(Profile::Smoke),
            "stress" => Ok(Profile::Stress),
            "endurance" => Ok(Profile::Endurance),
            other => Err(format!(
                "unknown profile `{other}`; expected smoke, stress or endurance"
            )),
        }
    }
}
