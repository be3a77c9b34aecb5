use stampede_core::StopCondition;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Cloneable handle that cancels a run from outside the harness, e.g. on ctrl-c.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Run-wide stop signal shared by every virtual user.
///
/// The deadline is authoritative over all local timers: every sleep taken through
/// [`StopSignal::sleep`] is clipped to it and interrupted by [`StopSignal::cancel`].
#[derive(Debug)]
pub struct StopSignal {
    started: Instant,
    deadline: Option<Instant>,
    max_requests_per_worker: Option<u64>,
    cancel: CancelHandle,
}

impl StopSignal {
    /// Starts the run clock.
    pub fn new(condition: &StopCondition) -> Self {
        Self::with_handle(condition, CancelHandle::new())
    }

    /// Starts the run clock, cancellable through an existing `cancel` handle.
    pub fn with_handle(condition: &StopCondition, cancel: CancelHandle) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: condition.duration.map(|d| started + d),
            max_requests_per_worker: condition.max_requests_per_worker,
            cancel,
        }
    }

    /// Whether a worker that has already issued `issued` requests should stop.
    pub fn should_stop(&self, issued: u64) -> bool {
        self.is_stopped()
            || self
                .max_requests_per_worker
                .is_some_and(|max| issued >= max)
    }

    /// Cancelled, or past the deadline.
    pub fn is_stopped(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop every worker at its next check and interrupt any sleep in progress.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Time left before the deadline. `None` if the run has no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Sleep for `dur`, but never past the deadline and never after cancellation. Returns `true`
    /// only if the full duration was slept.
    pub async fn sleep(&self, dur: Duration) -> bool {
        let mut wake = Instant::now() + dur;
        let mut clipped = false;
        if let Some(deadline) = self.deadline {
            if deadline < wake {
                wake = deadline;
                clipped = true;
            }
        }

        tokio::select! {
            _ = sleep_until(wake) => !clipped && !self.is_cancelled(),
            _ = self.wait_cancelled() => false,
        }
    }

    /// Resolves once the run is stopped, by deadline or cancellation.
    pub async fn stopped(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = sleep_until(deadline) => {},
                    _ = self.wait_cancelled() => {},
                }
            }
            None => self.wait_cancelled().await,
        }
    }

    async fn wait_cancelled(&self) {
        let mut rx = self.cancel.tx.subscribe();
        loop {
            let cancelled = *rx.borrow_and_update();
            if cancelled {
                return;
            }
            if rx.changed().await.is_err() {
                // The handle keeps the sender alive for as long as `self` is borrowed.
                std::future::pending::<()>().await;
            }
        }
    }
}
