//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tradebot_engine::config::{Config, ConfigError, ConfigStore, PortfolioAddress};
use tradebot_engine::lifecycle::signals::{StopListener, StopSignal};
use tradebot_engine::lifecycle::{Entry, Lifecycle, Subsystem, SubsystemHandle, WorkTracker};
use tradebot_engine::SubsystemError;

/// In-memory configuration store that records every save.
#[derive(Default)]
pub struct MemoryStore {
    config: Config,
    saved: Mutex<Vec<Config>>,
}

impl MemoryStore {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            saved: Mutex::new(Vec::new()),
        })
    }

    pub fn saves(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    pub fn last_saved(&self) -> Option<Config> {
        self.saved.lock().unwrap().last().cloned()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(self.config.clone())
    }

    fn save(&self, config: &Config) -> Result<(), ConfigError> {
        self.saved.lock().unwrap().push(config.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Behaviour knobs for [`Mock`].
#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    pub fail_start: bool,
    pub stop_delay: Option<Duration>,
    /// Address captured into `config.portfolio` on shutdown.
    pub captures: Option<String>,
}

struct Worker {
    stop: StopSignal,
    task: tokio::task::JoinHandle<()>,
}

/// A subsystem that owns one tracked background loop while running.
pub struct Mock {
    lifecycle: Lifecycle<Worker>,
    tracker: WorkTracker,
    options: MockOptions,
    allocations: AtomicUsize,
}

impl Mock {
    pub fn new(name: &'static str, tracker: &WorkTracker, options: MockOptions) -> Arc<Self> {
        Arc::new(Self {
            lifecycle: Lifecycle::configured(name),
            tracker: tracker.clone(),
            options,
            allocations: AtomicUsize::new(0),
        })
    }

    /// Number of times resources were allocated.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }
}

async fn idle(mut stop: StopListener) {
    stop.stopped().await;
}

#[async_trait]
impl Subsystem for Mock {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .start(|| async {
                if self.options.fail_start {
                    return Err(SubsystemError::resource(self.lifecycle.name(), "mock refused to start"));
                }
                tokio::task::yield_now().await;
                self.allocations.fetch_add(1, Ordering::SeqCst);
                let stop = StopSignal::new();
                let task = self.tracker.spawn("mock_worker", idle(stop.subscribe()));
                Ok(Worker { stop, task })
            })
            .await
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        let delay = self.options.stop_delay;
        self.lifecycle
            .stop(|worker| async move {
                worker.stop.trigger();
                let _ = worker.task.await;
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
            })
            .await
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    fn capture_state(&self, config: &mut Config) {
        if let Some(address) = &self.options.captures {
            config.portfolio.addresses.push(PortfolioAddress {
                address: address.clone(),
                coin: "BTC".to_string(),
                balance: 0.0,
                description: String::new(),
            });
        }
    }
}

/// Registry entry constructing a [`Mock`] with the given options.
pub fn mock_entry(name: &'static str, options: MockOptions) -> Entry {
    Entry::new(name, move |ctx| {
        Ok(SubsystemHandle::new(Mock::new(name, ctx.tracker(), options.clone())))
    })
}

/// Registry entry that requires `dependency` to have been constructed.
pub fn dependent_entry(name: &'static str, dependency: &'static str) -> Entry {
    Entry::new(name, move |ctx| {
        ctx.dependency::<Mock>(dependency)
            .ok_or_else(|| SubsystemError::missing_dependency(name, dependency))?;
        Ok(SubsystemHandle::new(Mock::new(name, ctx.tracker(), MockOptions::default())))
    })
    .depends_on(&[dependency])
}

/// Registry entry whose setup always fails.
pub fn failing_entry(name: &'static str) -> Entry {
    Entry::new(name, move |_| Err(SubsystemError::invalid_config(name, "mock setup failure")))
}
