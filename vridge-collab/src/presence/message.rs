//! Presence wire messages.
//!
//! Presence travels as [`Envelope`]s on the session channel. The sender is
//! identified by the envelope's `senderId`, so payloads never repeat it.
//!
//! | type           | payload                                   |
//! |----------------|-------------------------------------------|
//! | `user.join`    | `{displayName, color, avatarRef?}`        |
//! | `user.leave`   | none                                      |
//! | `cursor.move`  | `{position: {x, y, elementRef?, capturedAt}}` |
//! | `cursor.click` | same as `cursor.move`                     |
//! | `cursor.select`| `{selection: {start, end, elementRef, text?}}` |
//! | `typing.*`, `user.idle`, `user.active` | none              |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::{CursorPosition, TextSelection, UNKNOWN_USER};
use crate::envelope::{Envelope, EnvelopeError};

pub const USER_JOIN: &str = "user.join";
pub const USER_LEAVE: &str = "user.leave";
pub const CURSOR_MOVE: &str = "cursor.move";
pub const CURSOR_CLICK: &str = "cursor.click";
pub const CURSOR_SELECT: &str = "cursor.select";
pub const TYPING_START: &str = "typing.start";
pub const TYPING_STOP: &str = "typing.stop";
pub const USER_IDLE: &str = "user.idle";
pub const USER_ACTIVE: &str = "user.active";

/// Profile announced on join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    #[serde(default = "unknown_user", alias = "userName")]
    pub display_name: String,
    #[serde(default, alias = "userColor")]
    pub color: Option<String>,
    #[serde(default, alias = "userAvatar", skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

fn unknown_user() -> String {
    UNKNOWN_USER.to_string()
}

/// Presence messages, one variant per wire type.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceMessage {
    Join(JoinPayload),
    Leave,
    Move(CursorPosition),
    Click(CursorPosition),
    Select(TextSelection),
    TypingStart,
    TypingStop,
    Idle,
    Active,
}

#[derive(Serialize)]
struct PositionOut<'a> {
    position: &'a CursorPosition,
}

#[derive(Serialize)]
struct SelectionOut<'a> {
    selection: &'a TextSelection,
}

/// Older clients wrap the body, newer ones may send it bare.
#[derive(Deserialize)]
#[serde(untagged)]
enum PositionIn {
    Wrapped { position: CursorPosition },
    Bare(CursorPosition),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectionIn {
    Wrapped { selection: TextSelection },
    Bare(TextSelection),
}

impl PresenceMessage {
    /// Wire type string.
    pub fn kind(&self) -> &'static str {
        match self {
            PresenceMessage::Join(_) => USER_JOIN,
            PresenceMessage::Leave => USER_LEAVE,
            PresenceMessage::Move(_) => CURSOR_MOVE,
            PresenceMessage::Click(_) => CURSOR_CLICK,
            PresenceMessage::Select(_) => CURSOR_SELECT,
            PresenceMessage::TypingStart => TYPING_START,
            PresenceMessage::TypingStop => TYPING_STOP,
            PresenceMessage::Idle => USER_IDLE,
            PresenceMessage::Active => USER_ACTIVE,
        }
    }

    /// Decode an envelope. Unknown types yield `Ok(None)`.
    pub fn from_envelope(envelope: &Envelope) -> Result<Option<Self>, EnvelopeError> {
        let message = match envelope.kind.as_str() {
            USER_JOIN => PresenceMessage::Join(envelope.payload_as()?),
            USER_LEAVE => PresenceMessage::Leave,
            CURSOR_MOVE => PresenceMessage::Move(position(envelope)?),
            CURSOR_CLICK => PresenceMessage::Click(position(envelope)?),
            CURSOR_SELECT => PresenceMessage::Select(match envelope.payload_as()? {
                SelectionIn::Wrapped { selection } | SelectionIn::Bare(selection) => selection,
            }),
            TYPING_START => PresenceMessage::TypingStart,
            TYPING_STOP => PresenceMessage::TypingStop,
            USER_IDLE => PresenceMessage::Idle,
            USER_ACTIVE => PresenceMessage::Active,
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    /// Wrap in an envelope from `sender_id`.
    pub fn into_envelope(self, sender_id: &str) -> Result<Envelope, EnvelopeError> {
        let kind = self.kind();
        match &self {
            PresenceMessage::Join(payload) => Envelope::with_payload(kind, sender_id, payload),
            PresenceMessage::Move(position) | PresenceMessage::Click(position) => {
                Envelope::with_payload(kind, sender_id, &PositionOut { position })
            }
            PresenceMessage::Select(selection) => {
                Envelope::with_payload(kind, sender_id, &SelectionOut { selection })
            }
            PresenceMessage::Leave
            | PresenceMessage::TypingStart
            | PresenceMessage::TypingStop
            | PresenceMessage::Idle
            | PresenceMessage::Active => Ok(Envelope::new(kind, sender_id, Value::Null)),
        }
    }
}

fn position(envelope: &Envelope) -> Result<CursorPosition, EnvelopeError> {
    match envelope.payload_as()? {
        PositionIn::Wrapped { position } | PositionIn::Bare(position) => Ok(position),
    }
}
