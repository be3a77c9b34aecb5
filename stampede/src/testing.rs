//! In-memory transports for unit tests.
use crate::transport::{AttemptState, RequestSpec, Transport};
use reqwest::Method;
use stampede_core::RequestError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug)]
pub(crate) enum Step {
    Respond(u16, Duration),
    Fail(RequestError, Duration),
    /// Panics the calling task.
    Panic,
}

impl Step {
    pub fn respond(status: u16, delay: Duration) -> Self {
        Step::Respond(status, delay)
    }

    pub fn fail(err: RequestError, delay: Duration) -> Self {
        Step::Fail(err, delay)
    }
}

/// Plays back a fixed script of responses, then repeats `fallback` forever.
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicU64,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Step>, fallback: Step) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            calls: AtomicU64::new(0),
        }
    }

    /// Always answers `status` after `delay`.
    pub fn always(status: u16, delay: Duration) -> Self {
        Self::new([], Step::respond(status, delay))
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, _request: &RequestSpec, _attempt: &AttemptState) -> Result<u16, RequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Respond(status, delay) => {
                tokio::time::sleep(delay).await;
                Ok(status)
            }
            Step::Fail(err, delay) => {
                tokio::time::sleep(delay).await;
                Err(err)
            }
            Step::Panic => panic!("scripted transport panicked"),
        }
    }
}

pub(crate) fn request(scenario: &str) -> RequestSpec {
    RequestSpec {
        scenario: scenario.to_string(),
        method: Method::GET,
        url: Url::parse("http://stampede.test/").unwrap(),
        headers: vec![],
        body: None,
    }
}
