//! Session lifecycle states.
//!
//! ```text
//!  Unbound ──connect──► Connecting ──ok──► Open ──close──► Closing ──► Closed
//!     ▲                     │                ▲
//!     └─────── failed ──────┘                │
//!     └──────────────── accepted ────────────┘
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Not bound to a socket yet
    Unbound = 0,
    /// Outbound connect in flight
    Connecting = 1,
    /// Socket open, receive loop running
    Open = 2,
    /// Close in progress
    Closing = 3,
    /// Terminal
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unbound,
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Lock-free state cell; transitions are compare-and-swap so exactly one
/// caller wins each edge.
#[derive(Debug)]
pub(crate) struct AtomicSessionState(AtomicU8);

impl AtomicSessionState {
    pub(crate) fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves `from` to `to`. On failure returns the state actually observed.
    pub(crate) fn transition(&self, from: SessionState, to: SessionState) -> Result<(), SessionState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(SessionState::from_u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_transition() {
        let state = AtomicSessionState::new(SessionState::Unbound);
        assert_eq!(
            state.transition(SessionState::Open, SessionState::Closing),
            Err(SessionState::Unbound)
        );
        assert!(state
            .transition(SessionState::Unbound, SessionState::Connecting)
            .is_ok());
        assert_eq!(state.load(), SessionState::Connecting);
    }

    #[test]
    fn test_single_winner() {
        let state = Arc::new(AtomicSessionState::new(SessionState::Open));
        let winners: usize = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    state
                        .transition(SessionState::Open, SessionState::Closing)
                        .is_ok() as usize
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
    }
}
