//! Owned, cancellable fixed-interval tasks

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A background task that runs an async job every `period`.
///
/// Each run is awaited before the next tick is considered, so runs never
/// overlap; ticks that elapse while a run is in flight are skipped, not
/// queued. Cancellation takes effect between runs, never inside one.
/// Dropping the handle cancels the task.
pub struct PeriodicTask {
    name: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn onto the current tokio runtime. The first run happens one
    /// `period` after spawning.
    pub fn spawn<F, Fut>(name: &str, period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task_name = name.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                job().await;
            }
            debug!(task = %task_name, "periodic task stopped");
        });

        debug!(task = %name, period_ms = period.as_millis() as u64, "periodic task started");

        Self {
            name: name.to_string(),
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request a stop; an in-flight run finishes first
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait for the task to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(task = %self.name, error = %e, "periodic task ended abnormally");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
