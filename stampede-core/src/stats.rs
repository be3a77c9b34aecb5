use crate::{FailureReason, RequestOutcome};
use std::collections::BTreeMap;
use std::time::Duration;

/// Linear-interpolation percentile of an ascending slice.
///
/// `idx = (p / 100) * (n - 1)`, and the result blends `sorted[floor(idx)]` and
/// `sorted[ceil(idx)]` by the fractional part of `idx`. `p` is clamped to `[0, 100]`. Returns
/// `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let (lo, hi, frac) = rank(sorted.len(), p)?;
    Some(sorted[lo] * (1. - frac) + sorted[hi] * frac)
}

fn rank(n: usize, p: f64) -> Option<(usize, usize, f64)> {
    if n == 0 {
        return None;
    }
    let p = if p.is_nan() { 0. } else { p.clamp(0., 100.) };
    let idx = (p / 100.) * (n - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = (idx.ceil() as usize).min(n - 1);
    Some((lo, hi, idx - idx.floor()))
}

/// Mutable accumulator for one slice of outcomes.
#[derive(Clone, Debug, Default)]
pub struct Tally {
    total_requests: u64,
    success_count: u64,
    failure_count: u64,
    retries: u64,
    latencies: Vec<Duration>,
    errors: BTreeMap<FailureReason, u64>,
}

impl Tally {
    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.total_requests += 1;
        self.retries += u64::from(outcome.retry_count);
        // Requests that never left the client have no latency worth sampling.
        if outcome.failure != Some(FailureReason::InvalidRequest) {
            self.latencies.push(outcome.latency);
        }
        match &outcome.failure {
            None => self.success_count += 1,
            Some(reason) => {
                self.failure_count += 1;
                *self.errors.entry(reason.clone()).or_default() += 1;
            }
        }
    }

    pub fn merge(&mut self, other: &Tally) {
        self.total_requests += other.total_requests;
        self.success_count += other.success_count;
        self.failure_count += other.failure_count;
        self.retries += other.retries;
        self.latencies.extend_from_slice(&other.latencies);
        for (reason, count) in &other.errors {
            *self.errors.entry(reason.clone()).or_default() += count;
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn freeze(mut self) -> Stats {
        self.latencies.sort_unstable();
        Stats {
            total_requests: self.total_requests,
            success_count: self.success_count,
            failure_count: self.failure_count,
            retries: self.retries,
            latencies: self.latencies,
            errors: self.errors,
        }
    }
}

/// A tally for the whole run plus one per scenario.
#[derive(Clone, Debug, Default)]
pub struct RunTally {
    overall: Tally,
    per_scenario: BTreeMap<String, Tally>,
}

impl RunTally {
    pub fn record(&mut self, scenario: &str, outcome: &RequestOutcome) {
        self.overall.record(outcome);
        match self.per_scenario.get_mut(scenario) {
            Some(tally) => tally.record(outcome),
            None => {
                let mut tally = Tally::default();
                tally.record(outcome);
                self.per_scenario.insert(scenario.to_string(), tally);
            }
        }
    }

    pub fn merge(&mut self, other: &RunTally) {
        self.overall.merge(&other.overall);
        for (name, tally) in &other.per_scenario {
            self.per_scenario
                .entry(name.clone())
                .or_default()
                .merge(tally);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.overall.total_requests
    }

    pub fn freeze(self, elapsed: Duration) -> AggregateStats {
        AggregateStats {
            overall: self.overall.freeze(),
            per_scenario: self
                .per_scenario
                .into_iter()
                .map(|(name, tally)| (name, tally.freeze()))
                .collect(),
            elapsed,
        }
    }
}

/// Frozen statistics for a set of outcomes. Latencies are kept sorted ascending.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stats {
    total_requests: u64,
    success_count: u64,
    failure_count: u64,
    retries: u64,
    latencies: Vec<Duration>,
    errors: BTreeMap<FailureReason, u64>,
}

impl Stats {
    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    /// Sum of retries across all requests.
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// Latency samples, ascending.
    pub fn latencies(&self) -> &[Duration] {
        &self.latencies
    }

    pub fn errors(&self) -> &BTreeMap<FailureReason, u64> {
        &self.errors
    }

    /// Percentage of successful requests, or `None` when nothing was recorded.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_requests == 0 {
            None
        } else {
            Some(self.success_count as f64 / self.total_requests as f64 * 100.)
        }
    }

    pub fn percentile(&self, p: f64) -> Option<Duration> {
        let (lo, hi, frac) = rank(self.latencies.len(), p)?;
        let lo = self.latencies[lo].as_nanos() as f64;
        let hi = self.latencies[hi].as_nanos() as f64;
        Some(Duration::from_nanos((lo * (1. - frac) + hi * frac).round() as u64))
    }

    pub fn min(&self) -> Option<Duration> {
        self.latencies.first().copied()
    }

    pub fn max(&self) -> Option<Duration> {
        self.latencies.last().copied()
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: u128 = self.latencies.iter().map(Duration::as_nanos).sum();
        let mean = total / self.latencies.len() as u128;
        Some(Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX)))
    }

    /// Sample standard deviation of latency. Needs at least two samples.
    pub fn std_dev(&self) -> Option<Duration> {
        if self.latencies.len() < 2 {
            return None;
        }
        let secs: Vec<f64> = self.latencies.iter().map(Duration::as_secs_f64).collect();
        let std = statistical::standard_deviation(&secs, None);
        std.is_finite().then(|| Duration::from_secs_f64(std.max(0.)))
    }
}

/// Everything measured during a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateStats {
    pub overall: Stats,
    pub per_scenario: BTreeMap<String, Stats>,
    /// Wall-clock duration of the run as observed by the harness.
    pub elapsed: Duration,
}

impl AggregateStats {
    pub fn total_requests(&self) -> u64 {
        self.overall.total_requests
    }

    pub fn success_count(&self) -> u64 {
        self.overall.success_count
    }

    pub fn failure_count(&self) -> u64 {
        self.overall.failure_count
    }

    /// Requests per second over the run's wall-clock duration. Zero for an empty or
    /// instantaneous run.
    pub fn throughput(&self) -> f64 {
        throughput(self.overall.total_requests, self.elapsed)
    }

    pub fn scenario_throughput(&self, name: &str) -> f64 {
        self.per_scenario
            .get(name)
            .map(|s| throughput(s.total_requests, self.elapsed))
            .unwrap_or(0.)
    }
}

fn throughput(total: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if total == 0 || secs <= 0. {
        0.
    } else {
        total as f64 / secs
    }
}
