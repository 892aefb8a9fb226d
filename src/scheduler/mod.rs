pub mod auto_messages;

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

/// A cancellable handle to a running recurring task.
pub struct TaskHandle {
    inner: JoinHandle<()>,
}

impl TaskHandle {
    /// Stop the task. An in-flight firing runs to completion; no further
    /// firings are scheduled. Safe to call more than once.
    pub fn stop(&self) {
        self.inner.abort();
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// Run `action` once every `interval`, starting after the first full
/// interval has elapsed. A failed firing is logged and the cadence
/// continues; only [`TaskHandle::stop`] ends the schedule.
pub fn spawn_every<F>(interval: Duration, name: impl Into<String>, action: F) -> TaskHandle
where
    F: Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
{
    let name = name.into();
    debug!("Starting recurring task '{}' every {:?}", name, interval);

    let inner = tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = action().await {
                warn!("Recurring task '{}' firing failed: {:#}", name, e);
            }
        }
    });

    TaskHandle { inner }
}
