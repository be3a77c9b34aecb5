//! Plain data and statistics shared by the stampede engine.
//!
//! Nothing in here performs I/O. Configuration is validated here, outcomes are tallied here, and
//! percentiles are computed here, so all of it can be tested without a network or a runtime.
mod config;
mod constants;
mod data;
mod error;
mod grading;
mod stats;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use error::*;
pub use grading::*;
pub use stats::*;

pub use http::Method;
