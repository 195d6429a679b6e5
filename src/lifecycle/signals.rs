//! Stop signalling.
//!
//! # Responsibilities
//! - [`StopSignal`]: cooperative stop notification for a subsystem's background tasks
//! - [`wait_for_shutdown_signal`]: wait for SIGINT/SIGTERM (Ctrl-C elsewhere)
//!
//! # Design Decisions
//! - A dropped `StopSignal` counts as a stop, so tasks never outlive their owner's resources

use tokio::sync::broadcast;

/// Broadcast stop notification.
///
/// Background tasks subscribe before they are spawned and exit when
/// [`StopSignal::trigger`] fires or the signal itself is dropped.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: broadcast::Sender<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> StopListener {
        StopListener { rx: self.tx.subscribe() }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of listeners still alive.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a [`StopSignal`].
#[derive(Debug)]
pub struct StopListener {
    rx: broadcast::Receiver<()>,
}

impl StopListener {
    /// Resolves once a stop was triggered or every sender is gone.
    pub async fn stopped(&mut self) {
        let _ = self.rx.recv().await;
    }
}

/// Wait for a process termination signal.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = sigterm.recv() => {},
    }
    tracing::info!("Shutdown signal received");
    Ok(())
}

/// Wait for a process termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    Ok(())
}
