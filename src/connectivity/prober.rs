//! Periodic connectivity prober.
//!
//! # Responsibilities
//! - Resolve the configured probe targets once, at construction
//! - Run probe rounds on a fixed interval from a tracked background task
//! - Feed results into the shared [`LinkStatus`]

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time;

use crate::connectivity::state::{Connectivity, LinkStatus};
use crate::lifecycle::signals::{StopListener, StopSignal};
use crate::lifecycle::tracker::WorkTracker;

/// DNS port probed when an entry has no port.
pub const DNS_PORT: u16 = 53;

pub const DEFAULT_DNS_LIST: [&str; 4] = ["8.8.8.8", "8.8.4.4", "1.1.1.1", "1.0.0.1"];

pub const DEFAULT_DOMAIN_LIST: [&str; 3] = ["www.google.com", "www.cloudflare.com", "www.facebook.com"];

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Prober construction errors.
#[derive(Debug, Error)]
pub enum ProberError {
    #[error("invalid DNS server {0:?}")]
    InvalidDns(String),

    #[error("no probe targets")]
    NoTargets,
}

/// Resolved prober settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    pub dns_list: Vec<String>,
    pub domain_list: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
    pub online_threshold: u32,
    pub offline_threshold: u32,
}

/// Parse `IP` or `IP:port`; bare addresses get port 53.
pub fn parse_dns_target(entry: &str) -> Result<SocketAddr, ProberError> {
    let entry = entry.trim();
    if let Ok(addr) = entry.parse::<SocketAddr>() {
        return Ok(addr);
    }
    entry
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| ProberError::InvalidDns(entry.to_string()))
}

/// A running prober.
#[derive(Debug)]
pub struct Prober {
    status: Arc<LinkStatus>,
    stop: StopSignal,
    task: JoinHandle<()>,
}

impl Prober {
    /// Validate targets and spawn the probe loop.
    pub fn spawn(settings: &ProbeSettings, tracker: &WorkTracker) -> Result<Self, ProberError> {
        let dns = settings
            .dns_list
            .iter()
            .map(|entry| parse_dns_target(entry))
            .collect::<Result<Vec<_>, _>>()?;
        if dns.is_empty() && settings.domain_list.is_empty() {
            return Err(ProberError::NoTargets);
        }

        let status = Arc::new(LinkStatus::new(
            settings.online_threshold,
            settings.offline_threshold,
        ));
        let stop = StopSignal::new();

        let probe_loop = ProbeLoop {
            dns,
            domains: settings.domain_list.clone(),
            interval: settings.interval.max(Duration::from_millis(10)),
            timeout: settings.timeout,
            status: Arc::clone(&status),
        };
        let task = tracker.spawn("connectivity_prober", probe_loop.run(stop.subscribe()));

        Ok(Self { status, stop, task })
    }

    pub fn status(&self) -> Arc<LinkStatus> {
        Arc::clone(&self.status)
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_online()
    }

    /// Stop the loop and wait for its last round to finish.
    pub async fn shutdown(self) {
        self.stop.trigger();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Connectivity prober task ended abnormally");
        }
    }
}

struct ProbeLoop {
    dns: Vec<SocketAddr>,
    domains: Vec<String>,
    interval: Duration,
    timeout: Duration,
    status: Arc<LinkStatus>,
}

impl ProbeLoop {
    async fn run(self, mut stop: StopListener) {
        tracing::debug!(
            dns_targets = self.dns.len(),
            domains = self.domains.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Connectivity prober starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reachable = self.round().await;
                    match self.status.record(reachable) {
                        Some(Connectivity::Online) => tracing::info!("Internet connectivity restored"),
                        Some(Connectivity::Offline) => tracing::warn!("Internet connectivity lost"),
                        _ => {}
                    }
                }
                _ = stop.stopped() => {
                    tracing::debug!("Connectivity prober received stop signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One round: reachable if any DNS server accepts a connection or any
    /// domain resolves.
    async fn round(&self) -> bool {
        for addr in &self.dns {
            match time::timeout(self.timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => return true,
                Ok(Err(e)) => tracing::trace!(target_addr = %addr, error = %e, "DNS probe failed"),
                Err(_) => tracing::trace!(target_addr = %addr, "DNS probe timed out"),
            }
        }

        for domain in &self.domains {
            let lookup = tokio::net::lookup_host((domain.as_str(), 443));
            match time::timeout(self.timeout, lookup).await {
                Ok(Ok(mut addrs)) => {
                    if addrs.next().is_some() {
                        return true;
                    }
                    tracing::trace!(domain = %domain, "Domain resolved to nothing");
                }
                Ok(Err(e)) => tracing::trace!(domain = %domain, error = %e, "Domain lookup failed"),
                Err(_) => tracing::trace!(domain = %domain, "Domain lookup timed out"),
            }
        }

        false
    }
}
