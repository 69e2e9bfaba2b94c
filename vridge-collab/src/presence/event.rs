use super::model::{CursorPosition, PeerPresence};
use crate::bus::BusEvent;

/// Local events raised by the presence service.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    Connected,
    Disconnected,
    UserJoin(PeerPresence),
    UserLeave(PeerPresence),
    CursorUpdate(PeerPresence),
    UserClick {
        user_id: String,
        position: CursorPosition,
    },
}

/// Subscription key for [`PresenceEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceEventKind {
    Connected,
    Disconnected,
    UserJoin,
    UserLeave,
    CursorUpdate,
    UserClick,
}

impl PresenceEventKind {
    pub const ALL: [PresenceEventKind; 6] = [
        PresenceEventKind::Connected,
        PresenceEventKind::Disconnected,
        PresenceEventKind::UserJoin,
        PresenceEventKind::UserLeave,
        PresenceEventKind::CursorUpdate,
        PresenceEventKind::UserClick,
    ];

    /// Event name as UI code knows it.
    pub fn as_str(self) -> &'static str {
        match self {
            PresenceEventKind::Connected => "connected",
            PresenceEventKind::Disconnected => "disconnected",
            PresenceEventKind::UserJoin => "user:join",
            PresenceEventKind::UserLeave => "user:leave",
            PresenceEventKind::CursorUpdate => "cursor:update",
            PresenceEventKind::UserClick => "user:click",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl BusEvent for PresenceEvent {
    type Kind = PresenceEventKind;

    fn kind(&self) -> PresenceEventKind {
        match self {
            PresenceEvent::Connected => PresenceEventKind::Connected,
            PresenceEvent::Disconnected => PresenceEventKind::Disconnected,
            PresenceEvent::UserJoin(_) => PresenceEventKind::UserJoin,
            PresenceEvent::UserLeave(_) => PresenceEventKind::UserLeave,
            PresenceEvent::CursorUpdate(_) => PresenceEventKind::CursorUpdate,
            PresenceEvent::UserClick { .. } => PresenceEventKind::UserClick,
        }
    }
}
