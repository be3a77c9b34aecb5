use crate::aggregator::MetricsAggregator;
use crate::client::RetryingHttpClient;
use crate::report::{render, Report};
use crate::selector::ScenarioSelector;
use crate::stop::{CancelHandle, StopSignal};
use crate::transport::{HttpTransport, Instrumented, Transport};
use crate::worker::{VirtualUser, WorkerSummary};
use governor::{Quota, RateLimiter};
use stampede_core::{ConfigurationError, RunConfig};
use std::sync::Arc;
use tokio::task::JoinSet;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Run `config` against real HTTP and return its report.
///
/// Only a [`ConfigurationError`] is returned as an error, and always before any request is issued.
/// Individual request failures end up in the report.
#[instrument(name = "load_test", skip_all, fields(name = %config.name))]
pub async fn run_load_test(config: RunConfig) -> Result<Report, ConfigurationError> {
    Harness::new(config)?.run().await
}

/// Owns a run: spawns the virtual users, enforces the stop signal and shutdown grace, then
/// aggregates and renders.
pub struct Harness<T> {
    config: RunConfig,
    transport: T,
    cancel: CancelHandle,
}

impl Harness<Instrumented<HttpTransport>> {
    pub fn new(config: RunConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let transport = Instrumented::new(HttpTransport::new()?);
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> Harness<T> {
    pub fn with_transport(config: RunConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            cancel: CancelHandle::new(),
        }
    }

    /// Handle to stop the run early. Workers finish their current request and the report covers
    /// everything recorded so far.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn run(self) -> Result<Report, ConfigurationError> {
        let Self {
            config,
            transport,
            cancel,
        } = self;

        config.validate()?;
        let selector = Arc::new(ScenarioSelector::new(config.scenarios.clone())?);
        let client = Arc::new(RetryingHttpClient::new(
            transport,
            config.retry_policy.clone(),
            config.request_timeout,
        ));
        let limiter = config
            .max_rps
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));
        let aggregator = MetricsAggregator::new();

        info!(
            base_url = %config.base_url,
            concurrency = config.concurrency,
            scenarios = config.scenarios.len(),
            duration = ?config.stop.duration,
            max_requests_per_worker = ?config.stop.max_requests_per_worker,
            max_rps = ?config.max_rps,
            "Starting load test"
        );

        let stop = Arc::new(StopSignal::with_handle(&config.stop, cancel));
        let mut workers = JoinSet::new();
        for id in 0..config.concurrency {
            let user = VirtualUser {
                id,
                base_url: config.base_url.clone(),
                selector: selector.clone(),
                client: client.clone(),
                recorder: aggregator.recorder(),
                think_time: config.think_time,
                stop: stop.clone(),
                limiter: limiter.clone(),
            };
            workers.spawn(user.run());
        }

        let joined = join_workers(&mut workers, &stop, &config).await;
        let elapsed = stop.elapsed();

        let stats = aggregator.finalize(elapsed);
        if joined.panicked > 0 {
            error!(
                panicked = joined.panicked,
                concurrency = config.concurrency,
                "Virtual users panicked; report covers only what they recorded"
            );
        }

        let mut report = render(&stats, &config);
        report.panicked_workers = joined.panicked;
        info!(
            total = report.total_requests,
            issued = joined.issued,
            failed = report.failed_requests,
            rps = report.requests_per_second,
            ?elapsed,
            "Load test complete"
        );
        Ok(report)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Joined {
    /// Requests reported by the workers which returned.
    issued: u64,
    panicked: usize,
}

/// Wait for every worker. Once the run is stopped, stragglers get `shutdown_grace` to return
/// before being aborted.
async fn join_workers(
    workers: &mut JoinSet<WorkerSummary>,
    stop: &StopSignal,
    config: &RunConfig,
) -> Joined {
    let mut joined = Joined::default();
    let finished = {
        let drain = async {
            while let Some(res) = workers.join_next().await {
                match res {
                    Ok(summary) => {
                        trace!(id = summary.id, issued = summary.issued, "Worker returned");
                        joined.issued += summary.issued;
                    }
                    Err(err) if err.is_panic() => {
                        error!("Worker panicked: {err}");
                        joined.panicked += 1;
                    }
                    Err(_) => {}
                }
            }
        };
        tokio::pin!(drain);

        let drained = tokio::select! {
            _ = &mut drain => true,
            _ = stop.stopped() => false,
        };
        drained
            || tokio::time::timeout(config.shutdown_grace, &mut drain)
                .await
                .is_ok()
    };

    if !finished {
        warn!(
            remaining = workers.len(),
            grace = ?config.shutdown_grace,
            "Shutdown grace expired, aborting workers"
        );
        workers.abort_all();
        while let Some(res) = workers.join_next().await {
            if res.is_err_and(|err| err.is_panic()) {
                joined.panicked += 1;
            }
        }
    }

    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedTransport, Step};
    use stampede_core::{
        FailureReason, Grade, RetryPolicy, ScenarioDefinition, StopCondition, ThinkTime,
    };
    use std::time::Duration;
    use tokio::time::Instant;

    const MS: Duration = Duration::from_millis(1);

    fn config() -> RunConfig {
        RunConfig::builder("http://stampede.test")
            .name("harness")
            .scenario(ScenarioDefinition::get("a", "/a", 1.))
            .scenario(ScenarioDefinition::get("b", "/b", 2.))
            .concurrency(5)
            .max_requests_per_worker(4)
            .retry_policy(RetryPolicy::none())
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn empty_scenarios_fail_before_spawning() {
        let mut config = config();
        config.scenarios.clear();

        let transport = ScriptedTransport::always(200, MS);
        let harness = Harness::with_transport(config, transport);
        assert_eq!(harness.run().await, Err(ConfigurationError::NoScenarios));
    }

    #[tokio::test]
    async fn run_load_test_rejects_zero_concurrency() {
        let mut config = config();
        config.concurrency = 0;

        assert_eq!(
            run_load_test(config).await,
            Err(ConfigurationError::ZeroConcurrency)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn every_worker_contributes_its_cap() {
        let mut config = config();
        config.concurrency = 16;
        config.stop = StopCondition {
            duration: None,
            max_requests_per_worker: Some(250),
        };

        let report = Harness::with_transport(config, ScriptedTransport::always(200, Duration::ZERO))
            .run()
            .await
            .unwrap();

        assert_eq!(report.total_requests, 16 * 250);
        assert_eq!(report.successful_requests, 16 * 250);
        let by_scenario: u64 = report.scenarios.iter().map(|s| s.total_requests).sum();
        assert_eq!(by_scenario, report.total_requests);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_bound_run() {
        let mut config = config();
        config.stop = StopCondition {
            duration: Some(Duration::from_secs(2)),
            max_requests_per_worker: None,
        };
        config.scenarios = vec![ScenarioDefinition::get("a", "/a", 1.)];

        let start = Instant::now();
        let report = Harness::with_transport(config, ScriptedTransport::always(200, 10 * MS))
            .run()
            .await
            .unwrap();

        // 5 workers, 10ms per request, no think time: about 5 * 200 requests.
        assert!(
            (900..=1005).contains(&report.total_requests),
            "{}",
            report.total_requests
        );
        assert_eq!(report.success_rate, Some(100.));
        let p99 = report.latency.p99_ms.unwrap();
        assert!((10. ..12.).contains(&p99), "{p99}");
        assert!(start.elapsed() < Duration::from_millis(2100));
        assert_eq!(report.grades.reliability, Grade::Excellent);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_success_still_reports() {
        let report = Harness::with_transport(config(), ScriptedTransport::always(500, MS))
            .run()
            .await
            .unwrap();

        assert_eq!(report.total_requests, 20);
        assert_eq!(report.success_rate, Some(0.));
        assert_eq!(report.error_count(&FailureReason::Status(500)), 20);
        assert_eq!(report.grades.reliability, Grade::Poor);
        assert_eq!(report.panicked_workers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_handle_stops_an_unbounded_duration() {
        let mut config = config();
        config.stop = StopCondition {
            duration: Some(Duration::from_secs(3600)),
            max_requests_per_worker: None,
        };
        config.think_time = ThinkTime::fixed(Duration::from_millis(90));

        let harness = Harness::with_transport(config, ScriptedTransport::always(200, 10 * MS));
        let cancel = harness.cancel_handle();
        let run = tokio::spawn(harness.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let report = run.await.unwrap().unwrap();

        // 5 workers at one request per 100ms for 1s.
        assert!(
            (45..=60).contains(&report.total_requests),
            "{}",
            report.total_requests
        );
        assert!(report.elapsed_ms < 1100.);
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn panicked_worker_is_reported() {
        // The first request panics its virtual user; the other four run to their cap.
        let transport = ScriptedTransport::new([Step::Panic], Step::respond(200, MS));
        let report = Harness::with_transport(config(), transport)
            .run()
            .await
            .unwrap();

        assert_eq!(report.panicked_workers, 1);
        assert_eq!(report.total_requests, 4 * 4);
        assert_eq!(report.successful_requests, 4 * 4);
        assert!(report.to_string().contains("panicked     1 virtual users"));
        assert!(logs_contain("Worker panicked"));
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn stragglers_are_aborted_after_grace() {
        let mut config = config();
        config.concurrency = 2;
        config.stop = StopCondition {
            duration: Some(Duration::from_secs(1)),
            max_requests_per_worker: None,
        };
        config.request_timeout = Duration::from_secs(600);
        config.shutdown_grace = Duration::from_secs(2);

        // The second request hangs far past the deadline and the grace period.
        let transport = ScriptedTransport::new(
            [Step::respond(200, 100 * MS), Step::respond(200, 100 * MS)],
            Step::respond(200, Duration::from_secs(300)),
        );
        let start = Instant::now();
        let report = Harness::with_transport(config, transport)
            .run()
            .await
            .unwrap();

        assert_eq!(report.total_requests, 2);
        assert!(start.elapsed() < Duration::from_millis(3100));
        assert!(logs_contain("Shutdown grace expired"));
    }
}
