//! Portfolio manager.
//!
//! # Data Flow
//! ```text
//! config.portfolio.addresses ──setup──▶ address book (DashMap)
//!     add/remove at runtime
//!     periodic summary task logs per-coin totals while running
//!     engine stop: capture_state writes the book back to config
//! ```
//!
//! # Design Decisions
//! - The address book outlives start/stop so it can be captured after a failed start
//! - An empty book never overwrites the configured one

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{Config, PortfolioAddress, PortfolioConfig};
use crate::error::SubsystemError;
use crate::lifecycle::signals::{StopListener, StopSignal};
use crate::lifecycle::subsystem::{Lifecycle, Subsystem};
use crate::lifecycle::tracker::WorkTracker;

/// Subsystem name.
pub const NAME: &str = "portfolio";

struct Summary {
    stop: StopSignal,
    task: JoinHandle<()>,
}

/// Tracks wallet and exchange addresses and their balances.
pub struct PortfolioManager {
    lifecycle: Lifecycle<Summary>,
    book: Arc<DashMap<String, PortfolioAddress>>,
    interval: Duration,
    tracker: WorkTracker,
}

impl PortfolioManager {
    pub fn setup(config: Option<&PortfolioConfig>, tracker: &WorkTracker) -> Result<Self, SubsystemError> {
        let config = config.ok_or_else(|| SubsystemError::nil_config(NAME))?;
        if config.summary_interval_secs == 0 {
            return Err(SubsystemError::invalid_config(NAME, "summary_interval_secs is zero"));
        }

        let book = DashMap::new();
        for entry in &config.addresses {
            book.insert(entry.address.clone(), entry.clone());
        }

        Ok(Self {
            lifecycle: Lifecycle::configured(NAME),
            book: Arc::new(book),
            interval: Duration::from_secs(config.summary_interval_secs),
            tracker: tracker.clone(),
        })
    }

    /// Insert or replace an address. Returns true if it was new.
    pub fn add_address(&self, entry: PortfolioAddress) -> bool {
        self.book.insert(entry.address.clone(), entry).is_none()
    }

    pub fn remove_address(&self, address: &str) -> Option<PortfolioAddress> {
        self.book.remove(address).map(|(_, entry)| entry)
    }

    /// All addresses ordered by coin, then address.
    pub fn addresses(&self) -> Vec<PortfolioAddress> {
        let mut all: Vec<_> = self.book.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.coin.cmp(&b.coin).then_with(|| a.address.cmp(&b.address)));
        all
    }

    /// Summed balance per coin.
    pub fn totals(&self) -> BTreeMap<String, f64> {
        totals(&self.book)
    }
}

fn totals(book: &DashMap<String, PortfolioAddress>) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for entry in book.iter() {
        *totals.entry(entry.coin.clone()).or_insert(0.0) += entry.balance;
    }
    totals
}

async fn summarize(
    book: Arc<DashMap<String, PortfolioAddress>>,
    interval: Duration,
    mut stop: StopListener,
) {
    let mut ticker = time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (coin, balance) in totals(&book) {
                    tracing::info!(subsystem = NAME, coin = %coin, balance, "Portfolio balance");
                }
            }
            _ = stop.stopped() => break,
        }
    }
}

#[async_trait]
impl Subsystem for PortfolioManager {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .start(|| async {
                let stop = StopSignal::new();
                let task = self.tracker.spawn(
                    "portfolio_summary",
                    summarize(Arc::clone(&self.book), self.interval, stop.subscribe()),
                );
                tracing::debug!(subsystem = NAME, addresses = self.book.len(), "Portfolio tracking");
                Ok(Summary { stop, task })
            })
            .await
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .stop(|summary| async move {
                summary.stop.trigger();
                if let Err(e) = summary.task.await {
                    tracing::warn!(subsystem = NAME, error = %e, "Summary task ended abnormally");
                }
            })
            .await
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    fn capture_state(&self, config: &mut Config) {
        if !self.book.is_empty() {
            config.portfolio.addresses = self.addresses();
        }
    }
}

impl std::fmt::Debug for PortfolioManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioManager")
            .field("lifecycle", &self.lifecycle)
            .field("addresses", &self.book.len())
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(address: &str, coin: &str, balance: f64) -> PortfolioAddress {
        PortfolioAddress {
            address: address.into(),
            coin: coin.into(),
            balance,
            description: String::new(),
        }
    }

    #[test]
    fn test_address_book_seeded_from_config() {
        let config = PortfolioConfig {
            addresses: vec![address("b1", "BTC", 1.5), address("e1", "ETH", 3.0)],
            ..PortfolioConfig::default()
        };
        let p = PortfolioManager::setup(Some(&config), &WorkTracker::new()).unwrap();
        assert!(p.add_address(address("b2", "BTC", 0.5)));
        assert!(!p.add_address(address("b2", "BTC", 0.25)));
        assert_eq!(p.totals()["BTC"], 1.75);
        assert_eq!(p.remove_address("e1").unwrap().coin, "ETH");
        assert_eq!(p.addresses().len(), 2);
    }

    #[test]
    fn test_capture_writes_back_non_empty_book() {
        let tracker = WorkTracker::new();
        let mut config = Config::default();
        config.portfolio.addresses = vec![address("keep", "LTC", 1.0)];

        let empty = PortfolioManager::setup(Some(&PortfolioConfig::default()), &tracker).unwrap();
        empty.capture_state(&mut config);
        assert_eq!(config.portfolio.addresses[0].address, "keep");

        let p = PortfolioManager::setup(Some(&PortfolioConfig::default()), &tracker).unwrap();
        p.add_address(address("new", "BTC", 2.0));
        p.capture_state(&mut config);
        assert_eq!(config.portfolio.addresses, vec![address("new", "BTC", 2.0)]);
    }

    #[tokio::test]
    async fn test_summary_task_tracked() {
        let tracker = WorkTracker::new();
        let p = PortfolioManager::setup(Some(&PortfolioConfig::default()), &tracker).unwrap();
        p.start().await.unwrap();
        assert_eq!(tracker.active(), 1);
        p.stop().await.unwrap();
        assert_eq!(tracker.active(), 0);
        p.start().await.unwrap();
        assert!(p.is_running());
        p.stop().await.unwrap();
    }
}
