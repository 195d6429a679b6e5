//! Order manager.
//!
//! # Data Flow
//! ```text
//! submit/cancel/fill (running only)
//!     → order book (DashMap by id)
//!     → communications.push_event (hard dependency)
//!     → dispatch.publish("orders") when a dispatcher is present
//!
//! sweep task (tracked): drops finished orders past the retention window
//! ```
//!
//! # Design Decisions
//! - Setup fails without communications; dispatch is optional
//! - Notification failures are logged, never fail the order operation

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time;
use uuid::Uuid;

use crate::communications::{self, CommunicationsManager};
use crate::config::OrderManagerConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ErrorKind, SubsystemError};
use crate::lifecycle::signals::{StopListener, StopSignal};
use crate::lifecycle::subsystem::{Lifecycle, Subsystem};
use crate::lifecycle::tracker::WorkTracker;

/// Subsystem name.
pub const NAME: &str = "order_manager";

/// Dispatch topic carrying order updates.
pub const ORDERS_TOPIC: &str = "orders";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Active,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Active)
    }
}

/// A new order as submitted by a strategy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderRequest {
    pub exchange: String,
    pub pair: String,
    pub side: Side,
    pub amount: f64,
    pub price: f64,
}

/// A tracked order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub exchange: String,
    pub pair: String,
    pub side: Side,
    pub amount: f64,
    pub price: f64,
    pub status: OrderStatus,
    #[serde(skip)]
    updated: Instant,
}

/// Order operation errors.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error(transparent)]
    Subsystem(#[from] SubsystemError),

    #[error("invalid order: {0}")]
    Invalid(String),

    #[error("order {0} not found")]
    NotFound(Uuid),

    #[error("order {id} already {status:?}")]
    Finished { id: Uuid, status: OrderStatus },
}

struct Sweeper {
    stop: StopSignal,
    task: JoinHandle<()>,
}

/// Tracks orders for their whole life and announces changes.
pub struct OrderManager {
    lifecycle: Lifecycle<Sweeper>,
    orders: Arc<DashMap<Uuid, Order>>,
    communications: Arc<CommunicationsManager>,
    dispatch: Option<Arc<Dispatcher>>,
    sweep_interval: Duration,
    retention: Duration,
    verbose: bool,
    tracker: WorkTracker,
}

impl OrderManager {
    pub fn setup(
        config: Option<&OrderManagerConfig>,
        communications: Option<Arc<CommunicationsManager>>,
        dispatch: Option<Arc<Dispatcher>>,
        tracker: &WorkTracker,
    ) -> Result<Self, SubsystemError> {
        let config = config.ok_or_else(|| SubsystemError::nil_config(NAME))?;
        let communications = communications
            .ok_or_else(|| SubsystemError::missing_dependency(NAME, communications::NAME))?;
        if config.sweep_interval_secs == 0 {
            return Err(SubsystemError::invalid_config(NAME, "sweep_interval_secs is zero"));
        }

        Ok(Self {
            lifecycle: Lifecycle::configured(NAME),
            orders: Arc::new(DashMap::new()),
            communications,
            dispatch,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            retention: Duration::from_secs(config.retention_secs),
            verbose: config.verbose,
            tracker: tracker.clone(),
        })
    }

    fn ensure_running(&self) -> Result<(), OrderError> {
        if self.lifecycle.is_running() {
            Ok(())
        } else {
            Err(SubsystemError::not_started(NAME).into())
        }
    }

    pub fn submit(&self, request: OrderRequest) -> Result<Order, OrderError> {
        self.ensure_running()?;
        if !(request.amount > 0.0) {
            return Err(OrderError::Invalid("amount must be positive".into()));
        }
        if !(request.price >= 0.0) {
            return Err(OrderError::Invalid("price must not be negative".into()));
        }
        if request.exchange.is_empty() || request.pair.is_empty() {
            return Err(OrderError::Invalid("exchange and pair are required".into()));
        }

        let order = Order {
            id: Uuid::new_v4(),
            exchange: request.exchange,
            pair: request.pair,
            side: request.side,
            amount: request.amount,
            price: request.price,
            status: OrderStatus::Active,
            updated: Instant::now(),
        };
        self.orders.insert(order.id, order.clone());
        self.announce("Order submitted", &order);
        Ok(order)
    }

    pub fn cancel(&self, id: Uuid) -> Result<Order, OrderError> {
        self.finish(id, OrderStatus::Cancelled, "Order cancelled")
    }

    pub fn fill(&self, id: Uuid) -> Result<Order, OrderError> {
        self.finish(id, OrderStatus::Filled, "Order filled")
    }

    fn finish(&self, id: Uuid, status: OrderStatus, subject: &str) -> Result<Order, OrderError> {
        self.ensure_running()?;
        let order = {
            let mut entry = self.orders.get_mut(&id).ok_or(OrderError::NotFound(id))?;
            if entry.status.is_terminal() {
                return Err(OrderError::Finished {
                    id,
                    status: entry.status,
                });
            }
            entry.status = status;
            entry.updated = Instant::now();
            entry.clone()
        };
        self.announce(subject, &order);
        Ok(order)
    }

    pub fn get(&self, id: Uuid) -> Option<Order> {
        self.orders.get(&id).map(|o| o.clone())
    }

    pub fn active_orders(&self) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|o| !o.status.is_terminal())
            .map(|o| o.clone())
            .collect()
    }

    /// Drop finished orders older than the retention window. Returns how many.
    pub fn sweep(&self) -> usize {
        sweep(&self.orders, self.retention)
    }

    fn announce(&self, subject: &str, order: &Order) {
        let body = format!(
            "{} {:?} {} {} @ {} on {} [{:?}]",
            order.id, order.side, order.amount, order.pair, order.price, order.exchange, order.status
        );
        if self.verbose {
            tracing::debug!(subsystem = NAME, order_id = %order.id, status = ?order.status, "{subject}");
        }
        if let Err(e) = self.communications.push_event(subject, body) {
            tracing::warn!(subsystem = NAME, error = %e, "Order notification not relayed");
        }
        if let Some(dispatch) = &self.dispatch {
            let payload = match serde_json::to_value(order) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(subsystem = NAME, error = %e, "Order not serializable");
                    return;
                }
            };
            match dispatch.publish(ORDERS_TOPIC, payload) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotStarted => {}
                Err(e) => tracing::warn!(subsystem = NAME, error = %e, "Order update not dispatched"),
            }
        }
    }
}

fn sweep(orders: &DashMap<Uuid, Order>, retention: Duration) -> usize {
    let before = orders.len();
    orders.retain(|_, o| !(o.status.is_terminal() && o.updated.elapsed() >= retention));
    before - orders.len()
}

async fn sweep_loop(
    orders: Arc<DashMap<Uuid, Order>>,
    interval: Duration,
    retention: Duration,
    mut stop: StopListener,
) {
    let mut ticker = time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = sweep(&orders, retention);
                if removed > 0 {
                    tracing::debug!(subsystem = NAME, removed, "Finished orders swept");
                }
            }
            _ = stop.stopped() => break,
        }
    }
}

#[async_trait]
impl Subsystem for OrderManager {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .start(|| async {
                let stop = StopSignal::new();
                let task = self.tracker.spawn(
                    "order_sweeper",
                    sweep_loop(
                        Arc::clone(&self.orders),
                        self.sweep_interval,
                        self.retention,
                        stop.subscribe(),
                    ),
                );
                Ok(Sweeper { stop, task })
            })
            .await
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .stop(|sweeper| async move {
                sweeper.stop.trigger();
                if let Err(e) = sweeper.task.await {
                    tracing::warn!(subsystem = NAME, error = %e, "Sweeper task ended abnormally");
                }
                let active = self.active_orders().len();
                if active > 0 {
                    tracing::warn!(subsystem = NAME, active, "Stopping with active orders");
                }
            })
            .await
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }
}

impl std::fmt::Debug for OrderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderManager")
            .field("lifecycle", &self.lifecycle)
            .field("orders", &self.orders.len())
            .field("dispatch", &self.dispatch.is_some())
            .field("sweep_interval", &self.sweep_interval)
            .field("retention", &self.retention)
            .finish()
    }
}
