//! Background LED work
//!
//! LED commands never block the workflow that issues them. Each command is
//! a detached task on the runner; delayed actions (auto-off after a flash)
//! are scheduled the same way and outlive the request that created them.

use std::future::Future;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::trace;

/// Spawns and tracks fire-and-forget LED tasks
#[derive(Debug, Clone, Default)]
pub struct LedTaskRunner {
    tracker: TaskTracker,
}

impl LedTaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a unit of LED work in the background
    pub fn spawn<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(work);
        trace!("LED task spawned ({} pending)", self.tracker.len());
    }

    /// Run a unit of LED work once `delay` has passed
    pub fn spawn_after<F>(&self, delay: Duration, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            tokio::time::sleep(delay).await;
            work.await;
        });
    }

    /// Tasks not yet finished
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task spawned so far has finished, delayed ones included
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_idle_covers_delayed_work() {
        let runner = LedTaskRunner::new();
        let done = Arc::new(AtomicUsize::new(0));

        let counter = done.clone();
        runner.spawn(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = done.clone();
        runner.spawn_after(Duration::from_millis(30), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        runner.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(runner.pending(), 0);

        // usable again after draining
        let counter = done.clone();
        runner.spawn(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        runner.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_spawn_after_does_not_block_caller() {
        let runner = LedTaskRunner::new();
        let done = Arc::new(AtomicUsize::new(0));

        let counter = done.clone();
        runner.spawn_after(Duration::from_millis(50), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(done.load(Ordering::SeqCst), 0);

        runner.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
