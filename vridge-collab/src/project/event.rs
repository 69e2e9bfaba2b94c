use super::api::ApiError;
use super::model::{Milestone, ProjectMember, ProjectState};
use crate::bus::BusEvent;

/// Local events raised by the project sync service.
///
/// Project-level variants carry a snapshot of the whole record after the
/// change; member and milestone variants carry the affected entity.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectEvent {
    Connected,
    Disconnected,
    ProjectLoaded(ProjectState),
    StatusChange(ProjectState),
    ProgressUpdate(ProjectState),
    MemberJoin(ProjectMember),
    MemberLeave(ProjectMember),
    MemberOnline(ProjectMember),
    MemberOffline(ProjectMember),
    MilestoneUpdate(Milestone),
    MilestoneNew(Milestone),
    DeadlineChange(ProjectState),
    ProjectSynced(ProjectState),
    Error(ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectEventKind {
    Connected,
    Disconnected,
    ProjectLoaded,
    StatusChange,
    ProgressUpdate,
    MemberJoin,
    MemberLeave,
    MemberOnline,
    MemberOffline,
    MilestoneUpdate,
    MilestoneNew,
    DeadlineChange,
    ProjectSynced,
    Error,
}

impl ProjectEventKind {
    pub const ALL: [ProjectEventKind; 14] = [
        ProjectEventKind::Connected,
        ProjectEventKind::Disconnected,
        ProjectEventKind::ProjectLoaded,
        ProjectEventKind::StatusChange,
        ProjectEventKind::ProgressUpdate,
        ProjectEventKind::MemberJoin,
        ProjectEventKind::MemberLeave,
        ProjectEventKind::MemberOnline,
        ProjectEventKind::MemberOffline,
        ProjectEventKind::MilestoneUpdate,
        ProjectEventKind::MilestoneNew,
        ProjectEventKind::DeadlineChange,
        ProjectEventKind::ProjectSynced,
        ProjectEventKind::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectEventKind::Connected => "connected",
            ProjectEventKind::Disconnected => "disconnected",
            ProjectEventKind::ProjectLoaded => "project:loaded",
            ProjectEventKind::StatusChange => "status:change",
            ProjectEventKind::ProgressUpdate => "progress:update",
            ProjectEventKind::MemberJoin => "member:join",
            ProjectEventKind::MemberLeave => "member:leave",
            ProjectEventKind::MemberOnline => "member:online",
            ProjectEventKind::MemberOffline => "member:offline",
            ProjectEventKind::MilestoneUpdate => "milestone:update",
            ProjectEventKind::MilestoneNew => "milestone:new",
            ProjectEventKind::DeadlineChange => "deadline:change",
            ProjectEventKind::ProjectSynced => "project:synced",
            ProjectEventKind::Error => "error",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl BusEvent for ProjectEvent {
    type Kind = ProjectEventKind;

    fn kind(&self) -> ProjectEventKind {
        match self {
            ProjectEvent::Connected => ProjectEventKind::Connected,
            ProjectEvent::Disconnected => ProjectEventKind::Disconnected,
            ProjectEvent::ProjectLoaded(_) => ProjectEventKind::ProjectLoaded,
            ProjectEvent::StatusChange(_) => ProjectEventKind::StatusChange,
            ProjectEvent::ProgressUpdate(_) => ProjectEventKind::ProgressUpdate,
            ProjectEvent::MemberJoin(_) => ProjectEventKind::MemberJoin,
            ProjectEvent::MemberLeave(_) => ProjectEventKind::MemberLeave,
            ProjectEvent::MemberOnline(_) => ProjectEventKind::MemberOnline,
            ProjectEvent::MemberOffline(_) => ProjectEventKind::MemberOffline,
            ProjectEvent::MilestoneUpdate(_) => ProjectEventKind::MilestoneUpdate,
            ProjectEvent::MilestoneNew(_) => ProjectEventKind::MilestoneNew,
            ProjectEvent::DeadlineChange(_) => ProjectEventKind::DeadlineChange,
            ProjectEvent::ProjectSynced(_) => ProjectEventKind::ProjectSynced,
            ProjectEvent::Error(_) => ProjectEventKind::Error,
        }
    }
}
