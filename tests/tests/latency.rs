mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;
    use stampede::prelude::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    #[ntest::timeout(30_000)]
    async fn percentiles_track_server_latency() {
        init().await;

        let config = RunConfig::builder(MOCK_URL)
            .scenario(ScenarioDefinition::get("normal", "/delay/normal/50/10", 1.))
            .concurrency(10)
            .duration(Duration::from_secs(3))
            .build()
            .unwrap();

        let report = run_load_test(config).await.unwrap();
        let latency = &report.latency;

        assert!(dbg!(latency.p50_ms.unwrap()) > 40.);
        assert!(latency.p50_ms.unwrap() < 70.);
        assert!(latency.p50_ms <= latency.p95_ms);
        assert!(latency.p95_ms <= latency.p99_ms);
        assert!(latency.p99_ms <= latency.max_ms);
        assert!(dbg!(latency.std_dev_ms.unwrap()) > 1.);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn think_time_paces_workers() {
        init().await;

        let config = RunConfig::builder(MOCK_URL)
            .scenario(ScenarioDefinition::get("fast", "/delay/ms/1", 1.))
            .concurrency(2)
            .duration(Duration::from_secs(2))
            .think_time(ThinkTime::fixed(Duration::from_millis(100)))
            .build()
            .unwrap();

        let report = run_load_test(config).await.unwrap();

        // Each worker cycles at most every ~101ms: about 20 requests each.
        assert!(dbg!(report.total_requests) <= 42);
        assert!(report.total_requests >= 20);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["total_requests"], report.total_requests);
    }
}
