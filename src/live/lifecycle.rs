//! Connection lifecycle.
//!
//! `Connecting → Initializing → Ready → Paused ⇄ Ready → Stopped`. `Stopped`
//! is terminal and reachable from every other state.

use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::duration_ms;
use crate::error::{ExecutionError, LiveResult};

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Connecting,
    Initializing,
    Ready,
    Paused,
    Stopped,
}

impl LifecycleState {
    /// Whether `self → next` is a legal edge.
    ///
    /// `Ready → Ready` is a resume-driven refresh and `Paused → Paused` a
    /// repeated pause; both are allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Stopped, _) => false,
            (_, Self::Stopped) => true,
            (Self::Connecting, Self::Initializing)
            | (Self::Initializing, Self::Ready)
            | (Self::Ready | Self::Paused, Self::Ready | Self::Paused) => true,
            _ => false,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, lock-guarded lifecycle state.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Start in `Connecting`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Connecting),
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check a pause or resume edge. Both need readiness to have been
    /// observed, so `Initializing` only leaves through [`Lifecycle::mark_ready`].
    pub fn check_control(&self, to: LifecycleState) -> LiveResult<LifecycleState> {
        match self.state() {
            current @ (LifecycleState::Ready | LifecycleState::Paused) => {
                edge(current, to)?;
                Ok(current)
            }
            LifecycleState::Stopped => Err(ExecutionError::Stopped.into()),
            from => Err(ExecutionError::InvalidState { from, to }.into()),
        }
    }

    /// Move to `to`, returning the previous state.
    pub fn transition(&self, to: LifecycleState) -> LiveResult<LifecycleState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let from = *state;
        edge(from, to)?;
        *state = to;
        Ok(from)
    }

    /// Latch readiness. Returns false when readiness had already been observed.
    pub fn mark_ready(&self) -> LiveResult<bool> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            LifecycleState::Initializing => {
                *state = LifecycleState::Ready;
                Ok(true)
            }
            LifecycleState::Ready | LifecycleState::Paused => Ok(false),
            from => {
                edge(from, LifecycleState::Ready)?;
                Ok(false)
            }
        }
    }

    /// Fail once the engine is stopped.
    pub fn ensure_running(&self) -> LiveResult<LifecycleState> {
        match self.state() {
            LifecycleState::Stopped => Err(ExecutionError::Stopped.into()),
            state => Ok(state),
        }
    }
}

fn edge(from: LifecycleState, to: LifecycleState) -> LiveResult<()> {
    if from == LifecycleState::Stopped {
        return Err(ExecutionError::Stopped.into());
    }
    if !from.can_transition_to(to) {
        return Err(ExecutionError::InvalidState { from, to }.into());
    }
    Ok(())
}

/// Poll `is_ready` every `poll` until it reports true or `timeout` elapses.
///
/// Readiness is checked before the deadline on each round, so a reader that
/// becomes ready exactly at the deadline still succeeds. Returns the elapsed
/// wait on success.
pub fn wait_for_ready<F>(is_ready: F, timeout: Duration, poll: Duration) -> LiveResult<Duration>
where
    F: Fn() -> bool,
{
    let started = Instant::now();
    loop {
        if is_ready() {
            return Ok(started.elapsed());
        }
        if started.elapsed() > timeout {
            return Err(ExecutionError::InitTimeout {
                duration_ms: duration_ms(timeout),
            }
            .into());
        }
        thread::sleep(poll);
    }
}
