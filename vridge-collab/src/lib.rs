//! # vridge-collab — Real-time presence and project sync for Vridge
//!
//! Keeps peer cursors and a shared project record consistent across
//! everyone connected to the same session, over a JSON envelope channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐                    ┌──────────────────┐
//! │ PresenceService  │                    │ ProjectSyncSvc   │
//! │ (one session)    │                    │ (one project)    │
//! └───┬─────────┬────┘                    └───┬─────────┬────┘
//!     │         │                             │         │
//!     │         ▼                             ▼         │
//!     │   ┌──────────┐   Envelope (JSON) ┌──────────┐   │  PATCH
//!     │   │ Channel  │ ◄────────────────►│ Channel  │   ▼
//!     │   │ ws / hub │                   │ ws / hub │ ProjectApi
//!     │   └──────────┘                   └──────────┘ (fallback)
//!     ▼
//! ┌──────────────┐                        ┌──────────────┐
//! │ EventBus     │ ──► UI                 │ EventBus     │ ──► UI
//! │ (presence)   │                        │ (project)    │
//! └──────────────┘                        └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`envelope`] — `{type, senderId, payload, timestamp}` wire unit
//! - [`channel`] — Channel trait, WebSocket transport, in-process hub
//! - [`bus`] — Local publish/subscribe for service events
//! - [`presence`] — Peer cursors, selections, typing and idle state
//! - [`project`] — Project record sync with optimistic writes
//! - [`config`] — Endpoints and timings
//! - [`lifecycle`] — Session state machine shared by both services

pub mod bus;
pub mod channel;
pub mod config;
pub mod envelope;
pub mod lifecycle;
pub mod presence;
pub mod project;

// Re-exports for convenience
pub use bus::{BusEvent, EventBus, ListenerId};
pub use channel::{
    BroadcastGroup, BroadcastStats, Channel, ChannelError, ChannelEvent, Connector, HubChannel,
    LocalHub, WsChannel, WsConnector,
};
pub use config::{LocalUser, SyncConfig};
pub use envelope::{now_ms, Envelope, EnvelopeError};
pub use lifecycle::{SessionError, SessionState};
pub use presence::{
    CursorPosition, InputHandle, LocalInput, PeerPresence, PresenceEvent, PresenceEventKind,
    PresenceService, TextSelection,
};
pub use project::{
    ApiError, HttpProjectApi, Milestone, MilestonePatch, ProjectApi, ProjectEvent, ProjectEventKind,
    ProjectMember, ProjectState, ProjectStatus, ProjectSyncService,
};
