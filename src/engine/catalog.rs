//! The concrete subsystem set and how each one is wired.
//!
//! Declared order is the startup order among independent entries:
//!
//! ```text
//! database (required) → dispatch → internet_monitor → communications
//!     → portfolio → order_manager (needs communications, after dispatch)
//!     → api_server (background start)
//! ```

use std::sync::Arc;

use crate::communications::{self, CommunicationsManager};
use crate::config::Config;
use crate::connectivity::{self, ConnectionMonitor};
use crate::database::{self, DatabaseManager};
use crate::dispatch::{self, Dispatcher};
use crate::http::{self, ApiServer};
use crate::lifecycle::graph::GraphError;
use crate::lifecycle::{Entry, Registry, StartMode, SubsystemHandle};
use crate::orders::{self, OrderManager};
use crate::portfolio::{self, PortfolioManager};

/// Build the registry for `config` (already overlaid with settings).
pub fn registry(config: &Config) -> Result<Registry, GraphError> {
    Registry::new(vec![
        Entry::new(database::NAME, |ctx| {
            let db = DatabaseManager::setup(Some(&ctx.config().database), ctx.tracker())?;
            Ok(SubsystemHandle::new(Arc::new(db)))
        })
        .enabled(config.database.enabled)
        .required(true),
        Entry::new(dispatch::NAME, |ctx| {
            let d = Dispatcher::setup(Some(&ctx.config().dispatch), ctx.tracker())?;
            Ok(SubsystemHandle::new(Arc::new(d)))
        })
        .enabled(config.dispatch.enabled),
        Entry::new(connectivity::NAME, |ctx| {
            let m = ConnectionMonitor::setup(Some(&ctx.config().connection_monitor), ctx.tracker())?;
            Ok(SubsystemHandle::new(Arc::new(m)))
        })
        .enabled(config.connection_monitor.enabled),
        Entry::new(communications::NAME, |ctx| {
            let c = CommunicationsManager::setup(Some(&ctx.config().communications), ctx.tracker())?;
            Ok(SubsystemHandle::new(Arc::new(c)))
        })
        .enabled(config.communications.enabled),
        Entry::new(portfolio::NAME, |ctx| {
            let p = PortfolioManager::setup(Some(&ctx.config().portfolio), ctx.tracker())?;
            Ok(SubsystemHandle::new(Arc::new(p)))
        })
        .enabled(config.portfolio.enabled),
        Entry::new(orders::NAME, |ctx| {
            let om = OrderManager::setup(
                Some(&ctx.config().order_manager),
                ctx.dependency::<CommunicationsManager>(communications::NAME),
                ctx.dependency::<Dispatcher>(dispatch::NAME),
                ctx.tracker(),
            )?;
            Ok(SubsystemHandle::new(Arc::new(om)))
        })
        .enabled(config.order_manager.enabled)
        .depends_on(&[communications::NAME])
        .after(&[dispatch::NAME]),
        Entry::new(http::NAME, |ctx| {
            let api = ApiServer::setup(
                Some(&ctx.config().remote_control),
                &ctx.config().name,
                ctx.roster(),
                ctx.tracker(),
            )?;
            Ok(SubsystemHandle::new(Arc::new(api)))
        })
        .enabled(config.remote_control.enabled)
        .start_mode(StartMode::Background),
    ])
}
