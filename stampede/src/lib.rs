#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod aggregator;
mod client;
mod harness;
mod report;
mod selector;
mod stop;
mod transport;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{MetricsAggregator, WorkerRecorder};
pub use client::RetryingHttpClient;
pub use harness::{run_load_test, Harness};
pub use report::{render, ErrorCount, Grades, LatencySummary, Report, ScenarioReport};
pub use selector::ScenarioSelector;
pub use stop::{CancelHandle, StopSignal};
pub use transport::{AttemptState, HttpTransport, Instrumented, RequestSpec, Transport};
pub use worker::{VirtualUser, WorkerSummary};

pub use stampede_core::*;

pub mod prelude {
    pub use crate::harness::{run_load_test, Harness};
    pub use crate::report::Report;
    pub use crate::stop::CancelHandle;
    pub use stampede_core::{
        ConfigurationError, GradingConfig, Profile, RetryPolicy, RunConfig, ScenarioDefinition,
        ThinkTime,
    };
}
