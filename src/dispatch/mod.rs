//! Event dispatcher.
//!
//! # Data Flow
//! ```text
//! publish(topic, payload)
//!     → bounded job queue (max_jobs)
//!     → worker pool (workers)
//!     → per-topic broadcast channel
//!     → subscribers
//! ```
//!
//! # Design Decisions
//! - `publish` never waits: a full queue is an error the caller sees
//! - Topics are created lazily by the first subscriber
//! - Jobs still queued at stop are dropped

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::DispatchConfig;
use crate::error::SubsystemError;
use crate::lifecycle::signals::{StopListener, StopSignal};
use crate::lifecycle::subsystem::{Lifecycle, Subsystem};
use crate::lifecycle::tracker::WorkTracker;

/// Subsystem name.
pub const NAME: &str = "dispatch";

pub const DEFAULT_WORKERS: usize = 10;

pub const DEFAULT_MAX_JOBS: usize = 100;

/// A published event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub topic: String,
    pub payload: serde_json::Value,
}

type Topics = DashMap<String, broadcast::Sender<Event>>;

struct Pool {
    stop: StopSignal,
    workers: Vec<JoinHandle<()>>,
}

/// Worker pool fanning events out to topic subscribers.
pub struct Dispatcher {
    lifecycle: Lifecycle<Pool>,
    workers: usize,
    max_jobs: usize,
    tracker: WorkTracker,
    topics: Arc<Topics>,
    queue: ArcSwapOption<mpsc::Sender<Event>>,
}

impl Dispatcher {
    pub fn setup(config: Option<&DispatchConfig>, tracker: &WorkTracker) -> Result<Self, SubsystemError> {
        let config = config.ok_or_else(|| SubsystemError::nil_config(NAME))?;
        let workers = if config.workers == 0 { DEFAULT_WORKERS } else { config.workers };
        let max_jobs = if config.max_jobs == 0 { DEFAULT_MAX_JOBS } else { config.max_jobs };

        Ok(Self {
            lifecycle: Lifecycle::configured(NAME),
            workers,
            max_jobs,
            tracker: tracker.clone(),
            topics: Arc::new(DashMap::new()),
            queue: ArcSwapOption::empty(),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    /// Queue an event for delivery.
    pub fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), SubsystemError> {
        let guard = self.queue.load();
        let Some(queue) = guard.as_ref() else {
            return Err(SubsystemError::not_started(NAME));
        };
        let event = Event {
            topic: topic.to_string(),
            payload,
        };
        queue.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubsystemError::resource(
                NAME,
                format!("job queue full ({} jobs)", self.max_jobs),
            ),
            mpsc::error::TrySendError::Closed(_) => SubsystemError::not_started(NAME),
        })
    }

    /// Receive every event later published on `topic`.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Event> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.max_jobs).0)
            .subscribe()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

async fn worker(
    id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<Event>>>,
    topics: Arc<Topics>,
    mut stop: StopListener,
) {
    loop {
        let next = async { jobs.lock().await.recv().await };
        tokio::select! {
            job = next => match job {
                Some(event) => {
                    if let Some(tx) = topics.get(&event.topic) {
                        let delivered = tx.send(event).unwrap_or(0);
                        tracing::trace!(worker = id, delivered, "Event dispatched");
                    }
                }
                None => break,
            },
            _ = stop.stopped() => break,
        }
    }
}

#[async_trait]
impl Subsystem for Dispatcher {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .start(|| async {
                let (tx, rx) = mpsc::channel(self.max_jobs);
                let jobs = Arc::new(Mutex::new(rx));
                let stop = StopSignal::new();

                let workers = (0..self.workers)
                    .map(|id| {
                        self.tracker.spawn(
                            "dispatch_worker",
                            worker(id, Arc::clone(&jobs), Arc::clone(&self.topics), stop.subscribe()),
                        )
                    })
                    .collect();
                self.queue.store(Some(Arc::new(tx)));

                tracing::debug!(
                    subsystem = NAME,
                    workers = self.workers,
                    max_jobs = self.max_jobs,
                    "Dispatcher workers spawned"
                );
                Ok(Pool { stop, workers })
            })
            .await
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .stop(|pool| async move {
                self.queue.store(None);
                pool.stop.trigger();
                for handle in pool.workers {
                    if let Err(e) = handle.await {
                        tracing::warn!(subsystem = NAME, error = %e, "Dispatch worker ended abnormally");
                    }
                }
            })
            .await
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("lifecycle", &self.lifecycle)
            .field("workers", &self.workers)
            .field("max_jobs", &self.max_jobs)
            .field("topics", &self.topics.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;

    #[test]
    fn test_zero_values_take_defaults() {
        let d = Dispatcher::setup(Some(&DispatchConfig::default()), &WorkTracker::new()).unwrap();
        assert_eq!(d.workers(), 10);
        assert_eq!(d.max_jobs(), 100);
        assert_eq!(
            Dispatcher::setup(None, &WorkTracker::new()).unwrap_err().kind(),
            ErrorKind::NilConfig
        );
    }

    #[tokio::test]
    async fn test_publish_requires_running() {
        let d = Dispatcher::setup(Some(&DispatchConfig::default()), &WorkTracker::new()).unwrap();
        let err = d.publish("orders", serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotStarted);
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let tracker = WorkTracker::new();
        let config = DispatchConfig {
            workers: 2,
            max_jobs: 8,
            ..DispatchConfig::default()
        };
        let d = Dispatcher::setup(Some(&config), &tracker).unwrap();
        d.start().await.unwrap();
        assert_eq!(tracker.active(), 2);

        let mut rx = d.subscribe("ticker");
        d.publish("ticker", serde_json::json!({"pair": "BTC-USD"})).unwrap();
        d.publish("unheard", serde_json::json!(null)).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.topic, "ticker");
        assert_eq!(event.payload["pair"], "BTC-USD");

        d.stop().await.unwrap();
        assert_eq!(tracker.active(), 0);
        assert_eq!(
            d.publish("ticker", serde_json::json!(1)).unwrap_err().kind(),
            ErrorKind::NotStarted
        );
    }

    #[tokio::test]
    async fn test_full_queue_is_reported() {
        let config = DispatchConfig {
            workers: 1,
            max_jobs: 1,
            ..DispatchConfig::default()
        };
        let d = Dispatcher::setup(Some(&config), &WorkTracker::new()).unwrap();
        d.start().await.unwrap();

        let mut saw_full = false;
        for i in 0..1000 {
            if let Err(e) = d.publish("flood", serde_json::json!(i)) {
                assert_eq!(e.kind(), ErrorKind::Resource);
                saw_full = true;
                break;
            }
        }
        assert!(saw_full);
        d.stop().await.unwrap();
    }
}
