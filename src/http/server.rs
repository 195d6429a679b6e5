//! API server subsystem.
//!
//! # Responsibilities
//! - Bind the configured address on start (bind failure rolls the start back)
//! - Serve the status routes from a tracked task
//! - Graceful shutdown on stop: stop accepting, finish in-flight requests
//!
//! # Design Decisions
//! - The engine starts this subsystem from a background task so a slow bind
//!   never delays the rest of startup

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::config::RemoteControlConfig;
use crate::error::SubsystemError;
use crate::http::handlers::{get_health, get_subsystem, get_subsystems, ApiState};
use crate::lifecycle::signals::StopSignal;
use crate::lifecycle::subsystem::{Lifecycle, Subsystem};
use crate::lifecycle::tracker::WorkTracker;
use crate::lifecycle::Roster;

/// Subsystem name.
pub const NAME: &str = "api_server";

struct Serving {
    stop: StopSignal,
    task: JoinHandle<()>,
}

/// HTTP status API over the engine roster.
pub struct ApiServer {
    lifecycle: Lifecycle<Serving>,
    bind_address: String,
    state: ApiState,
    tracker: WorkTracker,
    local_addr: ArcSwapOption<SocketAddr>,
}

impl ApiServer {
    pub fn setup(
        config: Option<&RemoteControlConfig>,
        engine_name: &str,
        roster: &Roster,
        tracker: &WorkTracker,
    ) -> Result<Self, SubsystemError> {
        let config = config.ok_or_else(|| SubsystemError::nil_config(NAME))?;
        if config.bind_address.parse::<SocketAddr>().is_err() {
            return Err(SubsystemError::invalid_config(
                NAME,
                format!("bind_address {:?} is not a socket address", config.bind_address),
            ));
        }

        Ok(Self {
            lifecycle: Lifecycle::configured(NAME),
            bind_address: config.bind_address.clone(),
            state: ApiState {
                engine_name: Arc::from(engine_name),
                roster: roster.clone(),
                started: Instant::now(),
            },
            tracker: tracker.clone(),
            local_addr: ArcSwapOption::empty(),
        })
    }

    /// Address actually bound, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.load().as_deref().copied()
    }

    fn build_router(state: ApiState) -> Router {
        Router::new()
            .route("/health", get(get_health))
            .route("/subsystems", get(get_subsystems))
            .route("/subsystems/{name}", get(get_subsystem))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }
}

#[async_trait]
impl Subsystem for ApiServer {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .start(|| async {
                let listener = match TcpListener::bind(&self.bind_address).await {
                    Ok(listener) => listener,
                    Err(e) => return Err(SubsystemError::resource(NAME, e)),
                };
                let addr = match listener.local_addr() {
                    Ok(addr) => addr,
                    Err(e) => return Err(SubsystemError::resource(NAME, e)),
                };

                let stop = StopSignal::new();
                let mut stopped = stop.subscribe();
                let app = Self::build_router(self.state.clone());
                let task = self.tracker.spawn("api_server_http", async move {
                    let served = axum::serve(listener, app)
                        .with_graceful_shutdown(async move { stopped.stopped().await })
                        .await;
                    if let Err(e) = served {
                        tracing::error!(subsystem = NAME, error = %e, "API server failed");
                    }
                });

                self.local_addr.store(Some(Arc::new(addr)));
                tracing::info!(subsystem = NAME, address = %addr, "API server listening");
                Ok(Serving { stop, task })
            })
            .await
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .stop(|serving| async move {
                self.local_addr.store(None);
                serving.stop.trigger();
                if let Err(e) = serving.task.await {
                    tracing::warn!(subsystem = NAME, error = %e, "API server task ended abnormally");
                }
            })
            .await
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }
}

impl std::fmt::Debug for ApiServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiServer")
            .field("lifecycle", &self.lifecycle)
            .field("bind_address", &self.bind_address)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}
