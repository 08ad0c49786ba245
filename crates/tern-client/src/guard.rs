//! Single-stream admission control for a chat session.

use tern_protocol::ChatState;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a stream is already in flight for this session")]
/// Returned by [`SessionGuard::acquire`] while the session is busy.
pub struct GuardRejected;

#[derive(Debug, Clone, Copy, Default)]
/// Admits at most one in-flight stream per [`ChatState`].
///
/// The guard owns no state of its own; it reads and flips the session flags
/// so the assembler and the guard always agree on whether the session is free.
pub struct SessionGuard;

impl SessionGuard {
    pub fn can_start(state: &ChatState) -> bool {
        !state.is_busy()
    }

    /// Marks the session as loading and streaming and clears any previous error.
    pub fn acquire(state: &mut ChatState) -> Result<(), GuardRejected> {
        if !Self::can_start(state) {
            return Err(GuardRejected);
        }
        state.is_loading = true;
        state.is_streaming = true;
        state.error = None;
        Ok(())
    }

    pub fn release(state: &mut ChatState) {
        state.is_loading = false;
        state.is_streaming = false;
    }
}

#[cfg(test)]
mod tests {
    use tern_protocol::ChatState;

    use super::{GuardRejected, SessionGuard};

    #[test]
    fn unit_acquire_sets_both_flags_and_clears_error() {
        let mut state = ChatState {
            error: Some("previous".to_string()),
            ..ChatState::default()
        };
        SessionGuard::acquire(&mut state).expect("free session");
        assert!(state.is_loading && state.is_streaming);
        assert!(state.error.is_none());
    }

    #[test]
    fn functional_busy_session_rejects_until_released() {
        let mut state = ChatState::default();
        SessionGuard::acquire(&mut state).expect("first acquire");
        assert_eq!(SessionGuard::acquire(&mut state), Err(GuardRejected));

        SessionGuard::release(&mut state);
        assert!(SessionGuard::can_start(&state));
        SessionGuard::acquire(&mut state).expect("acquire after release");
    }

    #[test]
    fn regression_loading_alone_keeps_session_busy() {
        let state = ChatState {
            is_loading: true,
            ..ChatState::default()
        };
        assert!(!SessionGuard::can_start(&state));
    }
}
