//! Session lifecycle shared by the presence and project services.
//!
//! ```text
//! Uninitialized ──start──► Connecting ──connected──► Connected
//!                              ▲                         │
//!                              └──────── Disconnected ◄──┘
//!        any state ──stop──► Destroyed
//! ```

/// Service lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Connecting,
    Connected,
    Disconnected,
    Destroyed,
}

impl SessionState {
    /// Whether a session is currently open (not yet stopped).
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Connected | SessionState::Disconnected
        )
    }

    /// State after the transport reports `connected`.
    pub fn on_connected(self) -> Self {
        match self {
            SessionState::Destroyed => SessionState::Destroyed,
            _ => SessionState::Connected,
        }
    }

    /// State after the transport reports `disconnected`.
    pub fn on_disconnected(self) -> Self {
        match self {
            SessionState::Destroyed => SessionState::Destroyed,
            _ => SessionState::Disconnected,
        }
    }
}

/// Misuse of the session API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session already active: {0}")]
    AlreadyActive(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_states() {
        assert!(!SessionState::Uninitialized.is_live());
        assert!(SessionState::Connecting.is_live());
        assert!(SessionState::Connected.is_live());
        assert!(SessionState::Disconnected.is_live());
        assert!(!SessionState::Destroyed.is_live());
    }

    #[test]
    fn test_destroyed_is_sticky() {
        assert_eq!(SessionState::Destroyed.on_connected(), SessionState::Destroyed);
        assert_eq!(SessionState::Destroyed.on_disconnected(), SessionState::Destroyed);
    }

    #[test]
    fn test_reconnect_cycle() {
        let state = SessionState::Connecting.on_connected();
        assert_eq!(state, SessionState::Connected);
        let state = state.on_disconnected();
        assert_eq!(state, SessionState::Disconnected);
        assert_eq!(state.on_connected(), SessionState::Connected);
    }
}
