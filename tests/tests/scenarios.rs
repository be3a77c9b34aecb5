mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use stampede::{FailureReason, Grade, RetryPolicy};
    use stampede::prelude::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    #[ntest::timeout(30_000)]
    async fn steady_10ms_endpoint() {
        init().await;

        let config = RunConfig::builder(MOCK_URL)
            .name("steady")
            .scenario(ScenarioDefinition::get("a", "/delay/ms/10", 1.))
            .concurrency(5)
            .duration(Duration::from_secs(2))
            .build()
            .unwrap();

        let report = run_load_test(config).await.unwrap();

        assert_eq!(report.success_rate, Some(100.));
        assert_eq!(report.failed_requests, 0);
        // At most 5 * (2000ms / 10ms), less for connection and scheduling overhead.
        assert!(dbg!(report.total_requests) <= 1_000);
        assert!(report.total_requests >= 400);
        let p99 = report.latency.p99_ms.unwrap();
        assert!(dbg!(p99) >= 10.);
        assert!(p99 < 60.);
        assert!(report.elapsed_ms < 2_500.);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    #[ntest::timeout(30_000)]
    async fn weighted_mix_and_error_histogram() {
        init().await;

        let config = RunConfig::builder(MOCK_URL)
            .name("mix")
            .scenario(ScenarioDefinition::get("ok", "/delay/ms/1", 3.))
            .scenario(ScenarioDefinition::get("missing", "/status/404", 1.))
            .concurrency(4)
            .max_requests_per_worker(250)
            .build()
            .unwrap();

        let report = run_load_test(config).await.unwrap();

        assert_eq!(report.total_requests, 1_000);
        let ok = report.scenario("ok").unwrap();
        let missing = report.scenario("missing").unwrap();
        assert_eq!(ok.total_requests + missing.total_requests, 1_000);
        // Expected 750/250.
        assert!(dbg!(ok.total_requests) > 650 && ok.total_requests < 850);
        assert_eq!(missing.successful_requests, 0);
        assert_eq!(missing.retries, 0);
        assert_eq!(
            report.error_count(&FailureReason::Status(404)),
            missing.total_requests
        );
        assert_eq!(report.grades.reliability, Grade::Poor);

        let text = report.to_string();
        assert!(text.contains("HTTP 404"));
    }

    #[tokio::test]
    async fn empty_scenarios_are_rejected() {
        init().await;

        let mut config = RunConfig::builder(MOCK_URL)
            .scenario(ScenarioDefinition::get("a", "/delay/ms/1", 1.))
            .max_requests_per_worker(1)
            .build()
            .unwrap();
        config.scenarios.clear();

        assert_eq!(
            run_load_test(config).await.unwrap_err(),
            ConfigurationError::NoScenarios
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn headers_and_body_are_sent() {
        init().await;

        let config = RunConfig::builder(MOCK_URL)
            .scenario(
                ScenarioDefinition::get("with-header", "/require-header/x-run-id", 1.)
                    .header("x-run-id", "integration"),
            )
            .scenario(
                ScenarioDefinition::new("echo", stampede::Method::POST, "/echo", 1.)
                    .header("content-type", "application/json")
                    .body(r#"{"hello":"world"}"#),
            )
            .concurrency(2)
            .max_requests_per_worker(20)
            .retry_policy(RetryPolicy::none())
            .build()
            .unwrap();

        let report = run_load_test(config).await.unwrap();
        assert_eq!(report.total_requests, 40);
        assert_eq!(report.failed_requests, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn rate_cap_bounds_throughput() {
        init().await;

        let config = RunConfig::builder(MOCK_URL)
            .scenario(ScenarioDefinition::get("a", "/delay/ms/1", 1.))
            .concurrency(8)
            .duration(Duration::from_secs(2))
            .max_rps(std::num::NonZeroU32::new(50).unwrap())
            .build()
            .unwrap();

        let report = run_load_test(config).await.unwrap();
        assert!(dbg!(report.requests_per_second) <= 60.);
        assert!(report.total_requests >= 60);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn cancel_handle_ends_the_run() {
        init().await;

        let config = RunConfig::builder(MOCK_URL)
            .scenario(ScenarioDefinition::get("a", "/delay/ms/5", 1.))
            .concurrency(4)
            .duration(Duration::from_secs(3600))
            .build()
            .unwrap();

        let harness = Harness::new(config).unwrap();
        let cancel = harness.cancel_handle();
        let run = tokio::spawn(harness.run());

        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();

        let report = run.await.unwrap().unwrap();
        assert!(report.total_requests > 0);
        assert!(report.elapsed_ms < 5_000.);
    }
}
