//! Collaboration session state, free of I/O.
//!
//! The session owns the peer map and the local activity timers (move
//! throttle, typing stop, idle). It never sleeps or sends: callers feed it
//! local input and incoming envelopes together with the current instant, and
//! it returns the messages to publish and the events to raise. The async
//! driver in [`service`](super::service) sleeps until [`next_deadline`].
//!
//! ```text
//! LocalInput ──► on_input() ──► Vec<PresenceMessage> ──► channel
//!                    │
//!              timers armed ──► poll_timers() ──► typing.stop / user.idle
//!
//! Envelope ──► handle_envelope() ──► peer map ──► Vec<PresenceEvent>
//! ```
//!
//! [`next_deadline`]: CollaborationSession::next_deadline

use std::collections::HashMap;

use tokio::time::{Duration, Instant};

use super::color::color_for;
use super::event::PresenceEvent;
use super::message::{JoinPayload, PresenceMessage};
use super::model::{CursorPosition, PeerPresence, TextSelection};
use crate::config::{LocalUser, SyncConfig};
use crate::envelope::{now_ms, Envelope};

/// Local input delivered by the host UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalInput {
    PointerMove(CursorPosition),
    TouchMove(CursorPosition),
    Click(CursorPosition),
    TouchStart(CursorPosition),
    /// `None` when the selection was cleared.
    SelectionChange(Option<TextSelection>),
    KeyDown,
    KeyUp,
    Focus,
    Blur,
}

/// One presence session for the local user.
pub struct CollaborationSession {
    session_id: String,
    local: LocalUser,
    color: &'static str,
    peers: HashMap<String, PeerPresence>,

    cursor_throttle: Duration,
    typing_timeout: Duration,
    idle_timeout: Duration,

    last_move_sent: Option<Instant>,
    typing: bool,
    typing_deadline: Option<Instant>,
    idle: bool,
    idle_deadline: Option<Instant>,
}

impl CollaborationSession {
    /// Open a session at `now`. The idle timer starts running immediately.
    pub fn new(session_id: impl Into<String>, local: LocalUser, config: &SyncConfig, now: Instant) -> Self {
        let color = color_for(&local.user_id);
        Self {
            session_id: session_id.into(),
            local,
            color,
            peers: HashMap::new(),
            cursor_throttle: config.cursor_throttle,
            typing_timeout: config.typing_timeout,
            idle_timeout: config.idle_timeout,
            last_move_sent: None,
            typing: false,
            typing_deadline: None,
            idle: false,
            idle_deadline: Some(now + config.idle_timeout),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn local_user(&self) -> &LocalUser {
        &self.local
    }

    /// The local user's palette color.
    pub fn color(&self) -> &'static str {
        self.color
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    // ── Outbound ─────────────────────────────────────────────────

    /// Process one local input event and return what should be published.
    pub fn on_input(&mut self, input: LocalInput, now: Instant) -> Vec<PresenceMessage> {
        let mut out = Vec::new();

        match input {
            LocalInput::PointerMove(position) | LocalInput::TouchMove(position) => {
                self.mark_active(now, &mut out);
                let throttled = self
                    .last_move_sent
                    .is_some_and(|sent| now.duration_since(sent) < self.cursor_throttle);
                if !throttled {
                    self.last_move_sent = Some(now);
                    out.push(PresenceMessage::Move(position));
                }
            }
            LocalInput::Click(position) | LocalInput::TouchStart(position) => {
                self.mark_active(now, &mut out);
                out.push(PresenceMessage::Click(position));
            }
            LocalInput::SelectionChange(selection) => {
                self.mark_active(now, &mut out);
                if let Some(selection) = selection.filter(|s| !s.is_collapsed()) {
                    out.push(PresenceMessage::Select(selection));
                }
            }
            LocalInput::KeyDown => {
                self.mark_active(now, &mut out);
                self.typing_deadline = None;
                if !self.typing {
                    self.typing = true;
                    out.push(PresenceMessage::TypingStart);
                }
            }
            LocalInput::KeyUp => {
                self.mark_active(now, &mut out);
                if self.typing {
                    self.typing_deadline = Some(now + self.typing_timeout);
                }
            }
            LocalInput::Focus => {
                if !self.idle {
                    out.push(PresenceMessage::Active);
                }
                self.mark_active(now, &mut out);
            }
            LocalInput::Blur => {
                if !self.idle {
                    self.idle_deadline = Some(now + self.idle_timeout);
                }
            }
        }

        out
    }

    fn mark_active(&mut self, now: Instant, out: &mut Vec<PresenceMessage>) {
        if self.idle {
            self.idle = false;
            out.push(PresenceMessage::Active);
        }
        self.idle_deadline = Some(now + self.idle_timeout);
    }

    /// Fire every timer whose deadline has passed.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<PresenceMessage> {
        let mut out = Vec::new();

        if self.typing_deadline.is_some_and(|deadline| now >= deadline) {
            self.typing_deadline = None;
            self.typing = false;
            out.push(PresenceMessage::TypingStop);
        }

        if self.idle_deadline.is_some_and(|deadline| now >= deadline) {
            self.idle_deadline = None;
            if !self.idle {
                self.idle = true;
                out.push(PresenceMessage::Idle);
            }
        }

        out
    }

    /// Earliest pending timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.typing_deadline, self.idle_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Profile announcement for the local user.
    pub fn join_message(&self) -> PresenceMessage {
        PresenceMessage::Join(JoinPayload {
            display_name: self.local.display_name.clone(),
            color: Some(self.color.to_string()),
            avatar_ref: self.local.avatar_ref.clone(),
        })
    }

    pub fn leave_message(&self) -> PresenceMessage {
        PresenceMessage::Leave
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Apply an incoming envelope and return the local events it raises.
    ///
    /// Envelopes from the local user, without a sender, of unknown type or
    /// with an undecodable payload change nothing.
    pub fn handle_envelope(&mut self, envelope: &Envelope) -> Vec<PresenceEvent> {
        if envelope.sender_id.is_empty() || envelope.is_from(&self.local.user_id) {
            return Vec::new();
        }

        match PresenceMessage::from_envelope(envelope) {
            Ok(Some(message)) => self.apply(&envelope.sender_id, message, now_ms()),
            Ok(None) => {
                log::debug!("Ignoring presence message of type {}", envelope.kind);
                Vec::new()
            }
            Err(e) => {
                log::debug!("Dropping presence envelope from {}: {e}", envelope.sender_id);
                Vec::new()
            }
        }
    }

    /// Apply a decoded message from `user_id` at `at_ms`.
    pub fn apply(&mut self, user_id: &str, message: PresenceMessage, at_ms: i64) -> Vec<PresenceEvent> {
        match message {
            PresenceMessage::Join(join) => {
                let peer = PeerPresence::joined(user_id, join.display_name, join.color, join.avatar_ref, at_ms);
                self.peers.insert(user_id.to_string(), peer.clone());
                vec![PresenceEvent::UserJoin(peer)]
            }
            PresenceMessage::Leave => self
                .peers
                .remove(user_id)
                .map(PresenceEvent::UserLeave)
                .into_iter()
                .collect(),
            PresenceMessage::Move(position) => {
                vec![self.update_peer(user_id, at_ms, |peer| peer.position = position)]
            }
            PresenceMessage::Click(position) => {
                let update = self.update_peer(user_id, at_ms, |peer| peer.position = position.clone());
                vec![
                    update,
                    PresenceEvent::UserClick {
                        user_id: user_id.to_string(),
                        position,
                    },
                ]
            }
            PresenceMessage::Select(selection) => {
                vec![self.update_peer(user_id, at_ms, |peer| peer.selection = Some(selection))]
            }
            PresenceMessage::TypingStart => vec![self.update_peer(user_id, at_ms, |peer| peer.is_typing = true)],
            PresenceMessage::TypingStop => vec![self.update_peer(user_id, at_ms, |peer| peer.is_typing = false)],
            PresenceMessage::Idle => vec![self.update_peer(user_id, at_ms, |peer| peer.is_active = false)],
            PresenceMessage::Active => vec![self.update_peer(user_id, at_ms, |peer| peer.is_active = true)],
        }
    }

    fn update_peer(&mut self, user_id: &str, at_ms: i64, update: impl FnOnce(&mut PeerPresence)) -> PresenceEvent {
        // Peers that joined before we connected show up through their first event.
        let peer = self
            .peers
            .entry(user_id.to_string())
            .or_insert_with(|| PeerPresence::placeholder(user_id, at_ms));
        update(peer);
        peer.last_activity_at = at_ms;
        PresenceEvent::CursorUpdate(peer.clone())
    }

    // ── Queries ──────────────────────────────────────────────────

    /// All known peers, ordered by user id.
    pub fn users(&self) -> Vec<PeerPresence> {
        let mut users: Vec<PeerPresence> = self.peers.values().cloned().collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub fn user(&self, user_id: &str) -> Option<&PeerPresence> {
        self.peers.get(user_id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Drop every peer and cancel every timer.
    pub fn clear(&mut self) {
        self.peers.clear();
        self.typing = false;
        self.typing_deadline = None;
        self.idle_deadline = None;
    }
}
