//! Communications relayer.
//!
//! # Data Flow
//! ```text
//! push_event(subject, body)
//!     → bounded queue (buffer_size)
//!     → relay task
//!     → every enabled relayer
//! ```
//!
//! # Design Decisions
//! - Relayers are log sinks here; transport integrations plug in behind the same queue
//! - Events still queued when stop is requested are flushed before `stop` returns

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::CommunicationsConfig;
use crate::error::SubsystemError;
use crate::lifecycle::signals::{StopListener, StopSignal};
use crate::lifecycle::subsystem::{Lifecycle, Subsystem};
use crate::lifecycle::tracker::WorkTracker;

/// Subsystem name.
pub const NAME: &str = "communications";

/// An outbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

struct Relay {
    stop: StopSignal,
    task: JoinHandle<()>,
}

/// Fans notifications out to the configured relayers.
pub struct CommunicationsManager {
    lifecycle: Lifecycle<Relay>,
    buffer_size: usize,
    relayers: Arc<Vec<String>>,
    tracker: WorkTracker,
    queue: ArcSwapOption<mpsc::Sender<Message>>,
    delivered: Arc<AtomicU64>,
}

impl CommunicationsManager {
    pub fn setup(
        config: Option<&CommunicationsConfig>,
        tracker: &WorkTracker,
    ) -> Result<Self, SubsystemError> {
        let config = config.ok_or_else(|| SubsystemError::nil_config(NAME))?;

        let relayers: Vec<String> = config
            .relayers
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.name.clone())
            .collect();
        if relayers.is_empty() {
            return Err(SubsystemError::invalid_config(NAME, "no relayers enabled"));
        }

        Ok(Self {
            lifecycle: Lifecycle::configured(NAME),
            buffer_size: config.buffer_size.max(1),
            relayers: Arc::new(relayers),
            tracker: tracker.clone(),
            queue: ArcSwapOption::empty(),
            delivered: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn relayers(&self) -> &[String] {
        &self.relayers
    }

    /// Number of (message, relayer) deliveries so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Queue a notification for every relayer.
    pub fn push_event(&self, subject: impl Into<String>, body: impl Into<String>) -> Result<(), SubsystemError> {
        let guard = self.queue.load();
        let Some(queue) = guard.as_ref() else {
            return Err(SubsystemError::not_started(NAME));
        };
        let message = Message {
            subject: subject.into(),
            body: body.into(),
        };
        queue.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                SubsystemError::resource(NAME, "relay buffer full")
            }
            mpsc::error::TrySendError::Closed(_) => SubsystemError::not_started(NAME),
        })
    }
}

fn relay(message: &Message, relayers: &[String], delivered: &AtomicU64) {
    for relayer in relayers {
        tracing::info!(
            subsystem = NAME,
            relayer = %relayer,
            subject = %message.subject,
            body = %message.body,
            "Relaying event"
        );
        delivered.fetch_add(1, Ordering::Relaxed);
    }
}

async fn relay_loop(
    mut rx: mpsc::Receiver<Message>,
    relayers: Arc<Vec<String>>,
    delivered: Arc<AtomicU64>,
    mut stop: StopListener,
) {
    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(message) => relay(&message, &relayers, &delivered),
                None => return,
            },
            _ = stop.stopped() => break,
        }
    }

    rx.close();
    while let Ok(message) = rx.try_recv() {
        relay(&message, &relayers, &delivered);
    }
}

#[async_trait]
impl Subsystem for CommunicationsManager {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .start(|| async {
                let (tx, rx) = mpsc::channel(self.buffer_size);
                let stop = StopSignal::new();
                let task = self.tracker.spawn(
                    "communications_relay",
                    relay_loop(
                        rx,
                        Arc::clone(&self.relayers),
                        Arc::clone(&self.delivered),
                        stop.subscribe(),
                    ),
                );
                self.queue.store(Some(Arc::new(tx)));
                tracing::debug!(subsystem = NAME, relayers = ?self.relayers, "Relay task spawned");
                Ok(Relay { stop, task })
            })
            .await
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .stop(|relay| async move {
                self.queue.store(None);
                relay.stop.trigger();
                if let Err(e) = relay.task.await {
                    tracing::warn!(subsystem = NAME, error = %e, "Relay task ended abnormally");
                }
            })
            .await
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }
}

impl std::fmt::Debug for CommunicationsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommunicationsManager")
            .field("lifecycle", &self.lifecycle)
            .field("relayers", &self.relayers)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}
