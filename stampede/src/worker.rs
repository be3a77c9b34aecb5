use crate::aggregator::WorkerRecorder;
use crate::client::RetryingHttpClient;
use crate::selector::ScenarioSelector;
use crate::stop::StopSignal;
use crate::transport::{RequestSpec, Transport};
use governor::DefaultDirectRateLimiter;
use rand::Rng;
use stampede_core::{RequestOutcome, ThinkTime};
use std::sync::Arc;
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};
use url::Url;

/// Diagnostics from a single virtual user. The aggregator, not this, is authoritative.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerSummary {
    pub id: usize,
    pub issued: u64,
}

/// One simulated client: selects, executes, records, thinks, repeats. Requests from one virtual
/// user never overlap.
pub struct VirtualUser<T> {
    pub(crate) id: usize,
    pub(crate) base_url: Url,
    pub(crate) selector: Arc<ScenarioSelector>,
    pub(crate) client: Arc<RetryingHttpClient<T>>,
    pub(crate) recorder: WorkerRecorder,
    pub(crate) think_time: ThinkTime,
    pub(crate) stop: Arc<StopSignal>,
    pub(crate) limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl<T: Transport> VirtualUser<T> {
    #[instrument(name = "virtual_user", skip_all, fields(id = self.id))]
    pub async fn run(self) -> WorkerSummary {
        trace!("Virtual user started");
        let mut issued = 0;

        loop {
            if self.stop.should_stop(issued) {
                break;
            }

            if let Some(limiter) = &self.limiter {
                tokio::select! {
                    _ = limiter.until_ready() => {},
                    _ = self.stop.stopped() => break,
                }
            }

            let scenario = self.selector.select();
            let outcome = match RequestSpec::build(scenario, &self.base_url) {
                Ok(request) => self.client.execute(&request, &self.stop).await,
                Err(err) => {
                    warn!(scenario = %scenario.name, %err, "Unable to build request");
                    RequestOutcome::failure(&scenario.name, &err, Duration::ZERO, 0)
                }
            };
            issued += 1;
            self.recorder.record(&scenario.name, outcome);

            let fraction: f64 = rand::thread_rng().gen();
            let think = self.think_time.with_fraction(fraction);
            if !think.is_zero() {
                self.stop.sleep(think).await;
            }
        }

        debug!(issued, "Virtual user finished");
        WorkerSummary {
            id: self.id,
            issued,
        }
    }
}
