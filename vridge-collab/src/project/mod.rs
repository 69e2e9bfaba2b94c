//! Shared project record sync.
//!
//! ## Architecture
//!
//! ```text
//! update_status / update_progress / update_milestone
//!       │
//!       ▼
//! SyncState::begin_*() ──► local event ──► ProjectMessage ──► Channel
//!       │
//!       ▼
//! ProjectApi PATCH ──► SyncState::settle_*()
//!                            │ (failure: roll the field back,
//!                            │  raise `error`)
//!                            ▼
//!                  EventBus<ProjectEvent> ──► UI
//!
//! Channel ──► driver task ──► SyncState::handle_envelope()
//!                 │
//!                 └── every 30s: sync.request
//! ```

pub mod api;
pub mod event;
pub mod message;
pub mod model;
pub mod optimistic;
pub mod service;
pub mod state;

pub use api::{ApiError, HttpProjectApi, ProjectApi};
pub use event::{ProjectEvent, ProjectEventKind};
pub use message::ProjectMessage;
pub use model::{
    clamp_progress, MemberRole, Milestone, MilestonePatch, ProjectMember, ProjectPatch, ProjectState,
    ProjectStatus,
};
pub use optimistic::{Optimistic, Ticket};
pub use service::ProjectSyncService;
pub use state::{PendingWrite, SyncState};
