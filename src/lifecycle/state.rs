//! Lifecycle state machines.
//!
//! # States
//! ```text
//! Subsystem:  Unconfigured ──setup──▶ Stopped ◀──start/stop──▶ Running
//! Engine:     Idle ─▶ Starting ─▶ Up ─▶ Stopping ─▶ Idle
//! ```
//!
//! # Design Decisions
//! - States are stored as `u8` in an atomic; reads never take a lock
//! - The only mutation is [`AtomicState::transition`], a compare-and-swap
//! - A failed transition reports the state that was actually observed

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};

/// State of a single subsystem.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsystemState {
    /// Setup was never run; no backing resources exist.
    Unconfigured = 0,
    Stopped = 1,
    Running = 2,
}

impl From<u8> for SubsystemState {
    fn from(val: u8) -> Self {
        match val {
            1 => SubsystemState::Stopped,
            2 => SubsystemState::Running,
            _ => SubsystemState::Unconfigured,
        }
    }
}

impl From<SubsystemState> for u8 {
    fn from(state: SubsystemState) -> Self {
        state as u8
    }
}

impl fmt::Display for SubsystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubsystemState::Unconfigured => write!(f, "unconfigured"),
            SubsystemState::Stopped => write!(f, "stopped"),
            SubsystemState::Running => write!(f, "running"),
        }
    }
}

/// State of the engine as a whole.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Idle = 0,
    Starting = 1,
    Up = 2,
    Stopping = 3,
}

impl From<u8> for EngineState {
    fn from(val: u8) -> Self {
        match val {
            1 => EngineState::Starting,
            2 => EngineState::Up,
            3 => EngineState::Stopping,
            _ => EngineState::Idle,
        }
    }
}

impl From<EngineState> for u8 {
    fn from(state: EngineState) -> Self {
        state as u8
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Starting => write!(f, "starting"),
            EngineState::Up => write!(f, "up"),
            EngineState::Stopping => write!(f, "stopping"),
        }
    }
}

/// A named state stored in an [`AtomicU8`].
///
/// `S` is one of the state enums above; only the `u8` conversions are needed.
pub struct AtomicState<S> {
    raw: AtomicU8,
    _state: PhantomData<fn() -> S>,
}

impl<S> AtomicState<S>
where
    S: Copy + PartialEq + From<u8> + Into<u8>,
{
    pub fn new(initial: S) -> Self {
        Self {
            raw: AtomicU8::new(initial.into()),
            _state: PhantomData,
        }
    }

    /// Current state.
    pub fn load(&self) -> S {
        S::from(self.raw.load(Ordering::Acquire))
    }

    /// Move from `from` to `to` atomically.
    ///
    /// Fails with the observed state if it was not `from`. Exactly one of any
    /// number of concurrent callers with the same `from` succeeds.
    pub fn transition(&self, from: S, to: S) -> Result<(), S> {
        self.raw
            .compare_exchange(from.into(), to.into(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(S::from)
    }

    /// Whether the current state equals `state`.
    pub fn is(&self, state: S) -> bool {
        self.load() == state
    }
}

impl<S> fmt::Debug for AtomicState<S>
where
    S: Copy + PartialEq + From<u8> + Into<u8> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicState").field(&self.load()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_transition_requires_expected_state() {
        let state = AtomicState::new(SubsystemState::Stopped);
        assert!(state.transition(SubsystemState::Stopped, SubsystemState::Running).is_ok());
        assert_eq!(state.load(), SubsystemState::Running);

        let err = state
            .transition(SubsystemState::Stopped, SubsystemState::Running)
            .unwrap_err();
        assert_eq!(err, SubsystemState::Running);

        assert!(state.transition(SubsystemState::Running, SubsystemState::Stopped).is_ok());
        assert!(state.is(SubsystemState::Stopped));
    }

    #[test]
    fn test_unconfigured_rejects_start() {
        let state = AtomicState::new(SubsystemState::Unconfigured);
        let err = state
            .transition(SubsystemState::Stopped, SubsystemState::Running)
            .unwrap_err();
        assert_eq!(err, SubsystemState::Unconfigured);
    }

    #[test]
    fn test_unknown_raw_value_maps_to_default() {
        assert_eq!(SubsystemState::from(42), SubsystemState::Unconfigured);
        assert_eq!(EngineState::from(42), EngineState::Idle);
    }

    #[test]
    fn test_concurrent_transition_has_single_winner() {
        let state = Arc::new(AtomicState::new(EngineState::Idle));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || state.transition(EngineState::Idle, EngineState::Starting).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(state.load(), EngineState::Starting);
    }
}
