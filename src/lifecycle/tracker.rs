//! Background work tracking.
//!
//! # Responsibilities
//! - Count every long-lived task spawned by a subsystem or the engine
//! - Let shutdown wait until the count reaches zero
//!
//! # Design Decisions
//! - Increment happens before the task is spawned, decrement when its guard drops
//!   (normal exit, panic, or runtime teardown alike)
//! - Waiters are woken through a `Notify` rather than polled

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::observability::metrics;

#[derive(Debug, Default)]
struct Inner {
    active: AtomicUsize,
    idle: Notify,
}

/// Counting barrier for background work. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct WorkTracker {
    inner: Arc<Inner>,
}

impl WorkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one unit of work. The returned guard releases it on drop.
    pub fn track(&self, name: &'static str) -> WorkGuard {
        let active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_background_tasks(active);
        tracing::trace!(task = name, active, "Background task registered");
        WorkGuard {
            inner: Arc::clone(&self.inner),
            name,
        }
    }

    /// Spawn `future` as a tracked task and return its join handle.
    pub fn spawn<F>(&self, name: &'static str, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.track(name);
        tokio::spawn(async move {
            let _guard = guard;
            future.await
        })
    }

    /// Number of tasks currently registered.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Wait until no task is registered.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Like [`WorkTracker::wait`], bounded by `timeout`. Returns false on timeout.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

/// Registration of one unit of background work.
#[derive(Debug)]
pub struct WorkGuard {
    inner: Arc<Inner>,
    name: &'static str,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        let remaining = self.inner.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_background_tasks(remaining);
        tracing::trace!(task = self.name, remaining, "Background task finished");
        if remaining == 0 {
            self.inner.idle.notify_waiters();
        }
    }
}
