//! Session lifecycle state.

use std::fmt;

/// Stage of a proxied session.
///
/// Sessions only ever move forward: `Open → Relaying → Draining → Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Both legs are connected; nothing has been relayed yet.
    Open,
    /// Both pumps and the engine are running.
    Relaying,
    /// A pump stopped; the engine is working through what was published.
    Draining,
    /// Every task of the session has finished and its sinks are released.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Relaying => "relaying",
            Self::Draining => "draining",
            Self::Closed => "closed",
        })
    }
}

/// Tracks a session through [`SessionState`], refusing backward moves.
#[derive(Debug)]
pub struct SessionLifecycle {
    state: SessionState,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self {
            state: SessionState::Open,
        }
    }
}

impl SessionLifecycle {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState { self.state }

    /// Move to `next` if it lies ahead of the current state.
    ///
    /// Returns `true` if the state changed. Skipping stages is allowed, so a
    /// session that fails before relaying may go straight to `Closed`.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if next <= self.state {
            return false;
        }
        self.state = next;
        true
    }

    /// Returns `true` once the session reached [`SessionState::Closed`].
    #[must_use]
    pub fn is_closed(&self) -> bool { self.state == SessionState::Closed }
}
