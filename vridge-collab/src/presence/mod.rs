//! Peer presence for a collaboration session.
//!
//! ## Architecture
//!
//! ```text
//! Host input (pointer, keys, focus)
//!       │
//!       ▼
//! InputHandle ──► driver task ──► CollaborationSession::on_input()
//!                     │                  │ (50ms move throttle,
//!                     │                  │  typing / idle timers)
//!                     │                  ▼
//!                     │           PresenceMessage ──► Envelope ──► Channel
//!                     │
//!                     └──◄── Channel ◄── remote peers
//!                               │
//!                               ▼
//!                   CollaborationSession::handle_envelope()
//!                               │
//!                               ▼
//!                   EventBus<PresenceEvent> ──► UI
//! ```

pub mod color;
pub mod event;
pub mod message;
pub mod model;
pub mod service;
pub mod session;

pub use color::{color_for, CURSOR_PALETTE};
pub use event::{PresenceEvent, PresenceEventKind};
pub use message::{JoinPayload, PresenceMessage};
pub use model::{CursorPosition, PeerPresence, TextSelection, UNKNOWN_USER};
pub use service::{InputHandle, PresenceService};
pub use session::{CollaborationSession, LocalInput};
