//! Internet link state machine.
//!
//! # State Transitions
//! ```text
//! Unknown/Offline → Online: consecutive reachable rounds >= online_threshold
//! Unknown/Online → Offline: consecutive unreachable rounds >= offline_threshold
//! ```
//!
//! # Design Decisions
//! - Hysteresis prevents flapping on a single lost probe
//! - Counters reset on the opposite result
//! - Only the probe loop records results; readers are lock-free

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::lifecycle::state::AtomicState;

/// Last known connectivity.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Unknown = 0,
    Online = 1,
    Offline = 2,
}

impl From<u8> for Connectivity {
    fn from(val: u8) -> Self {
        match val {
            1 => Connectivity::Online,
            2 => Connectivity::Offline,
            _ => Connectivity::Unknown,
        }
    }
}

impl From<Connectivity> for u8 {
    fn from(state: Connectivity) -> Self {
        state as u8
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Unknown => write!(f, "unknown"),
            Connectivity::Online => write!(f, "online"),
            Connectivity::Offline => write!(f, "offline"),
        }
    }
}

/// Shared view of the link, written by the prober.
#[derive(Debug)]
pub struct LinkStatus {
    state: AtomicState<Connectivity>,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    online_threshold: u32,
    offline_threshold: u32,
}

impl LinkStatus {
    /// Thresholds below 1 are treated as 1.
    pub fn new(online_threshold: u32, offline_threshold: u32) -> Self {
        Self {
            state: AtomicState::new(Connectivity::Unknown),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            online_threshold: online_threshold.max(1),
            offline_threshold: offline_threshold.max(1),
        }
    }

    pub fn current(&self) -> Connectivity {
        self.state.load()
    }

    pub fn is_online(&self) -> bool {
        self.state.is(Connectivity::Online)
    }

    /// Record one probe round. Returns the new state if it changed.
    pub fn record(&self, reachable: bool) -> Option<Connectivity> {
        let (target, count, threshold) = if reachable {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            let n = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
            (Connectivity::Online, n, self.online_threshold)
        } else {
            self.consecutive_successes.store(0, Ordering::Relaxed);
            let n = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            (Connectivity::Offline, n, self.offline_threshold)
        };

        let current = self.state.load();
        if current == target || count < threshold {
            return None;
        }
        self.state.transition(current, target).ok().map(|()| target)
    }
}
