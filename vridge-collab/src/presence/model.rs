//! Presence data carried on the wire and held per peer.

use serde::{Deserialize, Serialize};

use super::color::color_for;

/// Display name given to peers first seen through a non-join event.
pub const UNKNOWN_USER: &str = "Unknown User";

/// Pointer or touch location in client coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
    /// Element under the pointer, when the host can name it.
    #[serde(default, alias = "elementId", skip_serializing_if = "Option::is_none")]
    pub element_ref: Option<String>,
    /// Capture time, milliseconds since Unix epoch.
    #[serde(default, alias = "timestamp")]
    pub captured_at: i64,
}

impl CursorPosition {
    pub fn new(x: f64, y: f64, captured_at: i64) -> Self {
        Self {
            x,
            y,
            element_ref: None,
            captured_at,
        }
    }

    pub fn on_element(mut self, element_ref: impl Into<String>) -> Self {
        self.element_ref = Some(element_ref.into());
        self
    }
}

/// A text range inside one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSelection {
    #[serde(default, alias = "elementId")]
    pub element_ref: String,
    #[serde(default, alias = "startOffset")]
    pub start: u32,
    #[serde(default, alias = "endOffset")]
    pub end: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl TextSelection {
    pub fn new(element_ref: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            element_ref: element_ref.into(),
            start,
            end,
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// An empty range (caret only).
    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// One remote participant in a collaboration session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerPresence {
    pub user_id: String,
    pub display_name: String,
    pub color: String,
    pub avatar_ref: Option<String>,
    pub position: CursorPosition,
    pub selection: Option<TextSelection>,
    pub is_active: bool,
    pub is_typing: bool,
    /// Milliseconds since Unix epoch of the last event from this peer.
    pub last_activity_at: i64,
}

impl PeerPresence {
    /// A peer announced by `user.join`.
    pub fn joined(
        user_id: &str,
        display_name: String,
        color: Option<String>,
        avatar_ref: Option<String>,
        now_ms: i64,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name,
            color: color.unwrap_or_else(|| color_for(user_id).to_string()),
            avatar_ref,
            position: CursorPosition::new(0.0, 0.0, now_ms),
            selection: None,
            is_active: true,
            is_typing: false,
            last_activity_at: now_ms,
        }
    }

    /// A peer first seen through some other event.
    pub fn placeholder(user_id: &str, now_ms: i64) -> Self {
        Self::joined(user_id, UNKNOWN_USER.to_string(), None, None, now_ms)
    }
}
