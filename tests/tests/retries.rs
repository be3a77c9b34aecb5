mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use stampede::{FailureReason, RetryPolicy};
    use stampede::prelude::*;
    use std::time::Duration;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            jitter: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn two_503s_then_success() {
        init().await;

        let path = format!("/flaky/2/key/{}", unique_key("two-503s"));
        let config = RunConfig::builder(MOCK_URL)
            .scenario(ScenarioDefinition::get("flaky", &path, 1.))
            .concurrency(1)
            .max_requests_per_worker(1)
            .retry_policy(policy(3))
            .build()
            .unwrap();

        let report = run_load_test(config).await.unwrap();

        assert_eq!(report.total_requests, 1);
        assert_eq!(report.successful_requests, 1);
        assert_eq!(report.retries, 2);
        // Latency covers both backoffs: at least 50ms + 100ms.
        assert!(dbg!(report.latency.max_ms.unwrap()) >= 150.);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn exhausted_retries_are_one_failure() {
        init().await;

        let path = format!("/flaky/10/key/{}", unique_key("exhausted"));
        let config = RunConfig::builder(MOCK_URL)
            .scenario(ScenarioDefinition::get("flaky", &path, 1.))
            .concurrency(1)
            .max_requests_per_worker(1)
            .retry_policy(policy(2))
            .build()
            .unwrap();

        let report = run_load_test(config).await.unwrap();

        assert_eq!(report.total_requests, 1);
        assert_eq!(report.failed_requests, 1);
        assert_eq!(report.retries, 2);
        assert_eq!(report.error_count(&FailureReason::Status(503)), 1);
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn no_retries_means_no_backoff() {
        init().await;

        let path = format!("/flaky/1/key/{}", unique_key("no-retries"));
        let config = RunConfig::builder(MOCK_URL)
            .scenario(ScenarioDefinition::get("flaky", &path, 1.))
            .concurrency(1)
            .max_requests_per_worker(2)
            .retry_policy(RetryPolicy::none())
            .build()
            .unwrap();

        let report = run_load_test(config).await.unwrap();

        assert_eq!(report.total_requests, 2);
        assert_eq!(report.failed_requests, 1);
        assert_eq!(report.retries, 0);
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn connection_refused_is_a_network_error() {
        init().await;

        let config = RunConfig::builder("http://127.0.0.1:1")
            .scenario(ScenarioDefinition::get("nowhere", "/", 1.))
            .concurrency(1)
            .max_requests_per_worker(3)
            .retry_policy(policy(1))
            .build()
            .unwrap();

        let report = run_load_test(config).await.unwrap();

        assert_eq!(report.total_requests, 3);
        assert_eq!(report.error_count(&FailureReason::Network), 3);
        assert_eq!(report.retries, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn rate_limited_endpoint_is_retried() {
        init().await;

        let path = format!("/limited/20/key/{}", unique_key("limited"));
        let config = RunConfig::builder(MOCK_URL)
            .scenario(ScenarioDefinition::get("limited", &path, 1.))
            .concurrency(4)
            .duration(Duration::from_secs(2))
            .retry_policy(RetryPolicy {
                max_retries: 5,
                base_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(200),
                jitter: Duration::from_millis(50),
                ..Default::default()
            })
            .build()
            .unwrap();

        let report = run_load_test(config).await.unwrap();

        assert!(report.total_requests > 0);
        assert!(dbg!(report.retries) > 0);
        for error in &report.errors {
            assert!(matches!(
                error.reason,
                FailureReason::Status(429) | FailureReason::Status(503)
            ));
        }
    }
}
