use metrics_util::AtomicBucket;
use stampede_core::{AggregateStats, RequestOutcome, RunTally};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

type Shard = Arc<Mutex<RunTally>>;

/// Collects outcomes from every virtual user.
///
/// Each worker gets its own shard through [`MetricsAggregator::recorder`], so the hot path never
/// contends with other workers; shards are merged when the run is finalized. Outcomes can also be
/// recorded directly with [`MetricsAggregator::record`], which goes through a single shared shard.
///
/// Shards stay registered even if their worker is aborted, so everything recorded before an
/// abort still shows up in the final statistics.
pub struct MetricsAggregator {
    shards: AtomicBucket<Shard>,
    shared: Shard,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        let shared = Shard::default();
        let shards = AtomicBucket::new();
        shards.push(shared.clone());
        Self { shards, shared }
    }

    /// A recorder with a shard of its own. Intended to be owned by exactly one worker.
    pub fn recorder(&self) -> WorkerRecorder {
        let shard = Shard::default();
        self.shards.push(shard.clone());
        WorkerRecorder { shard }
    }

    pub fn record(&self, scenario: &str, outcome: RequestOutcome) {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(scenario, &outcome);
    }

    /// Merge every shard into a frozen snapshot. `elapsed` is the run's wall-clock duration and
    /// is only used for throughput.
    pub fn finalize(&self, elapsed: Duration) -> AggregateStats {
        let mut merged = RunTally::default();
        for shard in self.shards.data() {
            let shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            merged.merge(&shard);
        }

        debug!(
            total = merged.total_requests(),
            ?elapsed,
            "Finalized metrics"
        );
        merged.freeze(elapsed)
    }
}

/// Per-worker handle onto a [`MetricsAggregator`] shard.
pub struct WorkerRecorder {
    shard: Shard,
}

impl WorkerRecorder {
    pub fn record(&self, scenario: &str, outcome: RequestOutcome) {
        self.shard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(scenario, &outcome);
    }

    pub fn recorded(&self) -> u64 {
        self.shard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .total_requests()
    }
}
