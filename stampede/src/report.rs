//! Graded, human and machine readable run reports.
use serde::Serialize;
use stampede_core::{AggregateStats, FailureReason, Grade, RunConfig, Stats};
use std::fmt;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub name: String,
    pub base_url: String,
    pub concurrency: usize,
    pub elapsed_ms: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retries: u64,
    /// Percent; `None` when nothing was recorded.
    pub success_rate: Option<f64>,
    pub requests_per_second: f64,
    pub latency: LatencySummary,
    pub grades: Grades,
    pub scenarios: Vec<ScenarioReport>,
    /// Distinct failure reasons, most frequent first.
    pub errors: Vec<ErrorCount>,
    /// Virtual users that panicked. Requests they issued but never recorded are missing from
    /// every count above.
    pub panicked_workers: usize,
}

/// Latency figures in fractional milliseconds. `None` means no data.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min_ms: Option<f64>,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub std_dev_ms: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retries: u64,
    pub success_rate: Option<f64>,
    pub requests_per_second: f64,
    pub latency: LatencySummary,
    pub errors: Vec<ErrorCount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorCount {
    pub reason: FailureReason,
    pub count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Grades {
    pub reliability: Grade,
    pub throughput: Grade,
    pub latency: Grade,
}

/// Build the report for a finished run. Grading reads the statistics and never changes them.
pub fn render(stats: &AggregateStats, config: &RunConfig) -> Report {
    let overall = &stats.overall;
    let latency = LatencySummary::from_stats(overall);

    let recorded = overall.total_requests() > 0;
    let throughput = stats.throughput();
    let grades = Grades {
        reliability: config
            .grading
            .reliability
            .grade_higher_is_better(overall.success_rate()),
        throughput: config
            .grading
            .throughput
            .grade_higher_is_better(recorded.then_some(throughput)),
        latency: config.grading.p99.grade_lower_is_better(latency.p99_ms),
    };

    // Configured scenarios come first, in config order, whether or not they were ever drawn.
    let empty = Stats::default();
    let configured = config.scenarios.iter().map(|s| s.name.as_str());
    let unconfigured = stats
        .per_scenario
        .keys()
        .map(String::as_str)
        .filter(|name| !config.scenarios.iter().any(|s| s.name == *name));
    let scenarios = configured
        .chain(unconfigured)
        .map(|name| {
            let scenario = stats.per_scenario.get(name).unwrap_or(&empty);
            ScenarioReport {
                name: name.to_string(),
                total_requests: scenario.total_requests(),
                successful_requests: scenario.success_count(),
                failed_requests: scenario.failure_count(),
                retries: scenario.retries(),
                success_rate: scenario.success_rate(),
                requests_per_second: stats.scenario_throughput(name),
                latency: LatencySummary::from_stats(scenario),
                errors: error_counts(scenario),
            }
        })
        .collect();

    Report {
        name: config.name.clone(),
        base_url: config.base_url.to_string(),
        concurrency: config.concurrency,
        elapsed_ms: millis(stats.elapsed),
        total_requests: stats.total_requests(),
        successful_requests: stats.success_count(),
        failed_requests: stats.failure_count(),
        retries: overall.retries(),
        success_rate: overall.success_rate(),
        requests_per_second: throughput,
        latency,
        grades,
        scenarios,
        errors: error_counts(overall),
        panicked_workers: 0,
    }
}

impl Report {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn error_count(&self, reason: &FailureReason) -> u64 {
        self.errors
            .iter()
            .find(|e| &e.reason == reason)
            .map(|e| e.count)
            .unwrap_or(0)
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}

impl LatencySummary {
    fn from_stats(stats: &Stats) -> Self {
        Self {
            min_ms: stats.min().map(millis),
            avg_ms: stats.mean().map(millis),
            max_ms: stats.max().map(millis),
            p50_ms: stats.percentile(50.).map(millis),
            p95_ms: stats.percentile(95.).map(millis),
            p99_ms: stats.percentile(99.).map(millis),
            std_dev_ms: stats.std_dev().map(millis),
        }
    }
}

fn error_counts(stats: &Stats) -> Vec<ErrorCount> {
    let mut errors: Vec<ErrorCount> = stats
        .errors()
        .iter()
        .map(|(reason, count)| ErrorCount {
            reason: reason.clone(),
            count: *count,
        })
        .collect();
    // Stable sort keeps the reason ordering for ties.
    errors.sort_by(|a, b| b.count.cmp(&a.count));
    errors
}

fn millis(dur: Duration) -> f64 {
    dur.as_nanos() as f64 / 1e6
}

struct Ms(Option<f64>);

impl fmt::Display for Ms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ms) => write!(f, "{ms:.2}ms"),
            None => f.write_str("-"),
        }
    }
}

struct Percent(Option<f64>);

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(rate) => write!(f, "{rate:.2}%"),
            None => f.write_str("no data"),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Elapsed is shown to the millisecond; humantime would otherwise print down to nanoseconds.
        let elapsed = Duration::from_millis(self.elapsed_ms.round() as u64);

        writeln!(f, "== {} ==", self.name)?;
        writeln!(f, "target       {}", self.base_url)?;
        writeln!(f, "concurrency  {}", self.concurrency)?;
        if self.panicked_workers > 0 {
            writeln!(f, "panicked     {} virtual users", self.panicked_workers)?;
        }
        writeln!(f, "elapsed      {}", humantime::format_duration(elapsed))?;
        writeln!(f)?;
        writeln!(
            f,
            "requests     {} total, {} ok, {} failed ({})",
            self.total_requests,
            self.successful_requests,
            self.failed_requests,
            Percent(self.success_rate)
        )?;
        writeln!(f, "retries      {}", self.retries)?;
        writeln!(f, "throughput   {:.2} req/s", self.requests_per_second)?;

        let l = &self.latency;
        writeln!(
            f,
            "latency      min {}  avg {}  max {}  std dev {}",
            Ms(l.min_ms),
            Ms(l.avg_ms),
            Ms(l.max_ms),
            Ms(l.std_dev_ms)
        )?;
        writeln!(
            f,
            "             p50 {}  p95 {}  p99 {}",
            Ms(l.p50_ms),
            Ms(l.p95_ms),
            Ms(l.p99_ms)
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "reliability  {}\nthroughput   {}\nlatency      {}",
            self.grades.reliability, self.grades.throughput, self.grades.latency
        )?;

        if !self.scenarios.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "{:<20} {:>9} {:>9} {:>9} {:>10} {:>10} {:>10}",
                "scenario", "requests", "success", "req/s", "p50", "p95", "p99"
            )?;
            for s in &self.scenarios {
                writeln!(
                    f,
                    "{:<20} {:>9} {:>9} {:>9.2} {:>10} {:>10} {:>10}",
                    s.name,
                    s.total_requests,
                    Percent(s.success_rate).to_string(),
                    s.requests_per_second,
                    Ms(s.latency.p50_ms).to_string(),
                    Ms(s.latency.p95_ms).to_string(),
                    Ms(s.latency.p99_ms).to_string(),
                )?;
            }
        }

        if !self.errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "errors")?;
            for e in &self.errors {
                writeln!(f, "  {:<18} {}", e.reason.to_string(), e.count)?;
            }
        }

        Ok(())
    }
}
