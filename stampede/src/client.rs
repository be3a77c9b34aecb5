//! Retrying HTTP client
use crate::stop::StopSignal;
use crate::transport::{AttemptState, RequestSpec, Transport};
use rand::Rng;
use stampede_core::{is_success_status, RequestError, RequestOutcome, RetryPolicy};
use std::time::Duration;
use tokio::time::{timeout, Instant};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Executes logical requests: one or more attempts, separated by exponential backoff with
/// jitter, collapsed into a single [`RequestOutcome`].
pub struct RetryingHttpClient<T> {
    transport: T,
    policy: RetryPolicy,
    request_timeout: Duration,
}

impl<T: Transport> RetryingHttpClient<T> {
    pub fn new(transport: T, policy: RetryPolicy, request_timeout: Duration) -> Self {
        Self {
            transport,
            policy,
            request_timeout,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run `request` to completion.
    ///
    /// Latency is measured from the start of the first attempt to the final resolution and so
    /// includes every backoff sleep. A backoff that would run past the end of the run is not
    /// taken; the last attempt's failure is returned instead.
    #[instrument(name = "request", skip_all, fields(scenario = %request.scenario))]
    pub async fn execute(&self, request: &RequestSpec, stop: &StopSignal) -> RequestOutcome {
        let started = Instant::now();
        let mut attempt = AttemptState::first();

        loop {
            let error = match self.attempt(request, &attempt).await {
                Ok(status) => {
                    return RequestOutcome::success(
                        &request.scenario,
                        status,
                        started.elapsed(),
                        attempt.retries(),
                    )
                }
                Err(error) => error,
            };

            let retries = attempt.retries();
            let fail = |error: &RequestError| {
                RequestOutcome::failure(&request.scenario, error, started.elapsed(), retries)
            };

            if !error.is_retryable(&self.policy) {
                trace!(%error, "terminal failure");
                return fail(&error);
            }
            if retries >= self.policy.max_retries {
                debug!(%error, retries, "retries exhausted");
                return fail(&error);
            }

            let delay = self.policy.backoff(retries + 1, self.draw_jitter());
            if let Some(remaining) = stop.remaining() {
                if delay > remaining {
                    debug!(%error, ?delay, ?remaining, "backoff exceeds remaining run time");
                    return fail(&error);
                }
            }

            debug!(attempt = attempt.number(), %error, ?delay, "retrying");
            if !stop.sleep(delay).await {
                debug!(%error, "run stopped during backoff");
                return fail(&error);
            }

            attempt = attempt.next();
        }
    }

    async fn attempt(&self, request: &RequestSpec, attempt: &AttemptState) -> Result<u16, RequestError> {
        match timeout(self.request_timeout, self.transport.send(request, attempt)).await {
            Err(_) => Err(RequestError::Timeout),
            Ok(Err(err)) => Err(err),
            Ok(Ok(status)) if is_success_status(status) => Ok(status),
            Ok(Ok(status)) => Err(RequestError::Status(status)),
        }
    }

    fn draw_jitter(&self) -> Duration {
        let bound = u64::try_from(self.policy.jitter.as_nanos()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(0..bound))
    }
}
