use crate::{
    ConfigurationError, DEFAULT_P99_BANDS, DEFAULT_RELIABILITY_BANDS, DEFAULT_THROUGHPUT_BANDS,
};
use serde::Serialize;
use std::fmt;

/// Qualitative label for one dimension of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Poor,
    /// Nothing was measured, so nothing can be graded.
    NoData,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Grade::Excellent => "EXCELLENT",
            Grade::Good => "GOOD",
            Grade::Fair => "FAIR",
            Grade::Poor => "POOR",
            Grade::NoData => "NO DATA",
        };
        f.write_str(label)
    }
}

/// Three thresholds splitting a metric into four grades.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bands {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
}

impl Bands {
    pub fn new(excellent: f64, good: f64, fair: f64) -> Self {
        Self {
            excellent,
            good,
            fair,
        }
    }

    /// Grade a metric where bigger values are better (success rate, throughput).
    pub fn grade_higher_is_better(&self, value: Option<f64>) -> Grade {
        match value {
            None => Grade::NoData,
            Some(v) if v >= self.excellent => Grade::Excellent,
            Some(v) if v >= self.good => Grade::Good,
            Some(v) if v >= self.fair => Grade::Fair,
            Some(_) => Grade::Poor,
        }
    }

    /// Grade a metric where smaller values are better (latency).
    pub fn grade_lower_is_better(&self, value: Option<f64>) -> Grade {
        match value {
            None => Grade::NoData,
            Some(v) if v <= self.excellent => Grade::Excellent,
            Some(v) if v <= self.good => Grade::Good,
            Some(v) if v <= self.fair => Grade::Fair,
            Some(_) => Grade::Poor,
        }
    }

    fn is_finite(&self) -> bool {
        self.excellent.is_finite() && self.good.is_finite() && self.fair.is_finite()
    }
}

impl From<(f64, f64, f64)> for Bands {
    fn from((excellent, good, fair): (f64, f64, f64)) -> Self {
        Self::new(excellent, good, fair)
    }
}

/// Thresholds used to label a finished run. Grading only affects presentation.
#[derive(Clone, Debug, PartialEq)]
pub struct GradingConfig {
    /// Success rate in percent; higher is better.
    pub reliability: Bands,
    /// Requests per second; higher is better.
    pub throughput: Bands,
    /// p99 latency in milliseconds; lower is better.
    pub p99: Bands,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            reliability: DEFAULT_RELIABILITY_BANDS.into(),
            throughput: DEFAULT_THROUGHPUT_BANDS.into(),
            p99: DEFAULT_P99_BANDS.into(),
        }
    }
}

impl GradingConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, bands) in [
            ("reliability", &self.reliability),
            ("throughput", &self.throughput),
        ] {
            if !bands.is_finite() || bands.excellent < bands.good || bands.good < bands.fair {
                return Err(ConfigurationError::InvalidGrading(format!(
                    "{name} bands must satisfy excellent >= good >= fair, got {bands:?}"
                )));
            }
        }

        let p99 = &self.p99;
        if !p99.is_finite() || p99.excellent > p99.good || p99.good > p99.fair {
            return Err(ConfigurationError::InvalidGrading(format!(
                "p99 bands must satisfy excellent <= good <= fair, got {p99:?}"
            )));
        }

        Ok(())
    }
}
