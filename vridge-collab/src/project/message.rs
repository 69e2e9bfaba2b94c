//! Project sync wire messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{lenient, MilestonePatch, ProjectMember, ProjectState, ProjectStatus};
use crate::envelope::{Envelope, EnvelopeError};

pub const STATUS_CHANGE: &str = "project.status.change";
pub const PROGRESS_UPDATE: &str = "project.progress.update";
pub const MEMBER_JOIN: &str = "project.member.join";
pub const MEMBER_LEAVE: &str = "project.member.leave";
pub const MEMBER_ONLINE: &str = "project.member.online";
pub const MEMBER_OFFLINE: &str = "project.member.offline";
pub const MILESTONE_UPDATE: &str = "project.milestone.update";
pub const DEADLINE_CHANGE: &str = "project.deadline.change";
pub const SYNC_REQUEST: &str = "sync.request";
pub const SYNC_RESPONSE: &str = "sync.response";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(deserialize_with = "lenient::progress")]
    pub progress: u8,
}

/// Identifies a member in leave / online / offline messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRef {
    #[serde(alias = "user_id", deserialize_with = "lenient::id")]
    pub user_id: String,
}

/// `{id, ...fields}`; an unknown id creates the milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneUpdate {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(flatten)]
    pub patch: MilestonePatch,
}

/// Either date may be absent; absent dates are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineChange {
    #[serde(
        default,
        alias = "start_date",
        deserialize_with = "lenient::opt_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(
        default,
        alias = "end_date",
        deserialize_with = "lenient::opt_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(alias = "project_id", deserialize_with = "lenient::id")]
    pub project_id: String,
    /// `updatedAt` of the requester's copy.
    #[serde(default, deserialize_with = "lenient::opt_date")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub project: Option<ProjectState>,
}

/// Project messages, one variant per wire type.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectMessage {
    StatusChange(StatusChange),
    ProgressUpdate(ProgressUpdate),
    MemberJoin(ProjectMember),
    MemberLeave(MemberRef),
    MemberOnline(MemberRef),
    MemberOffline(MemberRef),
    MilestoneUpdate(MilestoneUpdate),
    DeadlineChange(DeadlineChange),
    SyncRequest(SyncRequest),
    SyncResponse(SyncResponse),
}

impl ProjectMessage {
    pub fn status(status: ProjectStatus) -> Self {
        ProjectMessage::StatusChange(StatusChange { status })
    }

    pub fn progress(progress: u8) -> Self {
        ProjectMessage::ProgressUpdate(ProgressUpdate {
            progress: progress.min(100),
        })
    }

    pub fn online(user_id: impl Into<String>) -> Self {
        ProjectMessage::MemberOnline(MemberRef { user_id: user_id.into() })
    }

    pub fn offline(user_id: impl Into<String>) -> Self {
        ProjectMessage::MemberOffline(MemberRef { user_id: user_id.into() })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProjectMessage::StatusChange(_) => STATUS_CHANGE,
            ProjectMessage::ProgressUpdate(_) => PROGRESS_UPDATE,
            ProjectMessage::MemberJoin(_) => MEMBER_JOIN,
            ProjectMessage::MemberLeave(_) => MEMBER_LEAVE,
            ProjectMessage::MemberOnline(_) => MEMBER_ONLINE,
            ProjectMessage::MemberOffline(_) => MEMBER_OFFLINE,
            ProjectMessage::MilestoneUpdate(_) => MILESTONE_UPDATE,
            ProjectMessage::DeadlineChange(_) => DEADLINE_CHANGE,
            ProjectMessage::SyncRequest(_) => SYNC_REQUEST,
            ProjectMessage::SyncResponse(_) => SYNC_RESPONSE,
        }
    }

    /// Decode an envelope. Unknown types yield `Ok(None)`.
    pub fn from_envelope(envelope: &Envelope) -> Result<Option<Self>, EnvelopeError> {
        let message = match envelope.kind.as_str() {
            STATUS_CHANGE => ProjectMessage::StatusChange(envelope.payload_as()?),
            PROGRESS_UPDATE => ProjectMessage::ProgressUpdate(envelope.payload_as()?),
            MEMBER_JOIN => ProjectMessage::MemberJoin(envelope.payload_as()?),
            MEMBER_LEAVE => ProjectMessage::MemberLeave(envelope.payload_as()?),
            MEMBER_ONLINE => ProjectMessage::MemberOnline(envelope.payload_as()?),
            MEMBER_OFFLINE => ProjectMessage::MemberOffline(envelope.payload_as()?),
            MILESTONE_UPDATE => ProjectMessage::MilestoneUpdate(envelope.payload_as()?),
            DEADLINE_CHANGE => ProjectMessage::DeadlineChange(envelope.payload_as()?),
            SYNC_REQUEST => ProjectMessage::SyncRequest(envelope.payload_as()?),
            SYNC_RESPONSE => ProjectMessage::SyncResponse(envelope.payload_as()?),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    pub fn into_envelope(self, sender_id: &str) -> Result<Envelope, EnvelopeError> {
        let kind = self.kind();
        match &self {
            ProjectMessage::StatusChange(p) => Envelope::with_payload(kind, sender_id, p),
            ProjectMessage::ProgressUpdate(p) => Envelope::with_payload(kind, sender_id, p),
            ProjectMessage::MemberJoin(p) => Envelope::with_payload(kind, sender_id, p),
            ProjectMessage::MemberLeave(p)
            | ProjectMessage::MemberOnline(p)
            | ProjectMessage::MemberOffline(p) => Envelope::with_payload(kind, sender_id, p),
            ProjectMessage::MilestoneUpdate(p) => Envelope::with_payload(kind, sender_id, p),
            ProjectMessage::DeadlineChange(p) => Envelope::with_payload(kind, sender_id, p),
            ProjectMessage::SyncRequest(p) => Envelope::with_payload(kind, sender_id, p),
            ProjectMessage::SyncResponse(p) => Envelope::with_payload(kind, sender_id, p),
        }
    }
}
