//! Project sync state, free of I/O.
//!
//! Holds the canonical [`ProjectState`] and one optimistic ledger per
//! locally writable field. Local writes go through a `begin_*` / `settle_*`
//! pair: `begin_*` applies the change immediately and hands back the
//! message to broadcast plus a [`Ticket`]; `settle_*` takes the fallback
//! API's verdict and rolls the field back on failure.

use std::collections::HashMap;

use super::api::ApiError;
use super::event::ProjectEvent;
use super::message::{MilestoneUpdate, ProjectMessage, SyncRequest};
use super::model::{clamp_progress, Milestone, MilestonePatch, ProjectMember, ProjectState, ProjectStatus};
use super::optimistic::{Optimistic, Ticket};
use crate::envelope::Envelope;

/// A local write that has been applied and still awaits the fallback API.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub ticket: Ticket,
    pub event: ProjectEvent,
    pub message: ProjectMessage,
}

pub struct SyncState {
    project_id: String,
    local_user_id: String,
    project: Option<ProjectState>,
    status: Optimistic<ProjectStatus>,
    progress: Optimistic<u8>,
    milestones: HashMap<String, Optimistic<Milestone>>,
}

impl SyncState {
    pub fn new(project_id: impl Into<String>, local_user_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            local_user_id: local_user_id.into(),
            project: None,
            status: Optimistic::new(),
            progress: Optimistic::new(),
            milestones: HashMap::new(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn project(&self) -> Option<&ProjectState> {
        self.project.as_ref()
    }

    pub fn online_members(&self) -> Vec<ProjectMember> {
        self.project.as_ref().map(ProjectState::online_members).unwrap_or_default()
    }

    /// Install a freshly loaded record.
    pub fn load(&mut self, project: ProjectState) -> ProjectEvent {
        self.replace(project.clone());
        ProjectEvent::ProjectLoaded(project)
    }

    /// Ledgers are reset, never dropped, so tickets issued before the
    /// replacement can not match a later write.
    fn replace(&mut self, project: ProjectState) {
        self.project = Some(project);
        self.status.reset();
        self.progress.reset();
        for ledger in self.milestones.values_mut() {
            ledger.reset();
        }
    }

    /// Periodic resync request for the current copy.
    pub fn sync_request(&self) -> ProjectMessage {
        ProjectMessage::SyncRequest(SyncRequest {
            project_id: self.project_id.clone(),
            timestamp: self.project.as_ref().map(|p| p.updated_at),
        })
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Apply an incoming envelope and return the local events it raises.
    pub fn handle_envelope(&mut self, envelope: &Envelope) -> Vec<ProjectEvent> {
        if envelope.is_from(&self.local_user_id) {
            return Vec::new();
        }

        match ProjectMessage::from_envelope(envelope) {
            Ok(Some(message)) => self.apply(message),
            Ok(None) => {
                log::debug!("Ignoring project message of type {}", envelope.kind);
                Vec::new()
            }
            Err(e) => {
                log::debug!("Dropping project envelope from {}: {e}", envelope.sender_id);
                Vec::new()
            }
        }
    }

    /// Apply a decoded remote message.
    pub fn apply(&mut self, message: ProjectMessage) -> Vec<ProjectEvent> {
        if let ProjectMessage::SyncResponse(response) = message {
            return match response.project {
                Some(project) if project.id == self.project_id => {
                    self.replace(project.clone());
                    vec![ProjectEvent::ProjectSynced(project)]
                }
                Some(project) => {
                    log::debug!("Ignoring sync response for project {}", project.id);
                    Vec::new()
                }
                None => Vec::new(),
            };
        }

        let Some(project) = self.project.as_mut() else {
            return Vec::new();
        };

        let event = match message {
            ProjectMessage::StatusChange(change) => {
                project.status = change.status;
                project.touch();
                self.status.amend(|status| *status = change.status);
                ProjectEvent::StatusChange(project.clone())
            }
            ProjectMessage::ProgressUpdate(update) => {
                let progress = update.progress.min(100);
                project.progress = progress;
                project.touch();
                self.progress.amend(|p| *p = progress);
                ProjectEvent::ProgressUpdate(project.clone())
            }
            ProjectMessage::MemberJoin(mut member) => {
                member.is_online = true;
                match project.member_mut(&member.user_id) {
                    Some(existing) => {
                        member.joined_at = existing.joined_at;
                        *existing = member.clone();
                    }
                    None => project.members.push(member.clone()),
                }
                project.touch();
                ProjectEvent::MemberJoin(member)
            }
            ProjectMessage::MemberLeave(who) => {
                let Some(index) = project.members.iter().position(|m| m.user_id == who.user_id) else {
                    return Vec::new();
                };
                let member = project.members.remove(index);
                project.touch();
                ProjectEvent::MemberLeave(member)
            }
            ProjectMessage::MemberOnline(who) => match set_online(project, &who.user_id, true) {
                Some(member) => ProjectEvent::MemberOnline(member),
                None => return Vec::new(),
            },
            ProjectMessage::MemberOffline(who) => match set_online(project, &who.user_id, false) {
                Some(member) => ProjectEvent::MemberOffline(member),
                None => return Vec::new(),
            },
            ProjectMessage::MilestoneUpdate(MilestoneUpdate { id, patch }) => {
                let patch = patch.clamped();
                let event = match project.milestone_mut(&id) {
                    Some(milestone) => {
                        patch.apply_to(milestone);
                        ProjectEvent::MilestoneUpdate(milestone.clone())
                    }
                    None => {
                        let milestone = patch.clone().into_milestone(id.clone());
                        project.milestones.push(milestone.clone());
                        ProjectEvent::MilestoneNew(milestone)
                    }
                };
                if let Some(ledger) = self.milestones.get_mut(&id) {
                    ledger.amend(|committed| patch.apply_to(committed));
                }
                project.touch();
                event
            }
            ProjectMessage::DeadlineChange(change) => {
                if let Some(start) = change.start_date {
                    project.start_date = Some(start);
                }
                if let Some(end) = change.end_date {
                    project.end_date = Some(end);
                }
                project.touch();
                ProjectEvent::DeadlineChange(project.clone())
            }
            // Addressed to the server; peers have nothing to do.
            ProjectMessage::SyncRequest(_) => return Vec::new(),
            ProjectMessage::SyncResponse(_) => return Vec::new(),
        };

        vec![event]
    }

    // ── Local writes ─────────────────────────────────────────────

    pub fn begin_status(&mut self, status: ProjectStatus) -> Option<PendingWrite> {
        let project = self.project.as_mut()?;
        let ticket = self.status.propose(project.status, status);
        project.status = status;
        project.touch();
        Some(PendingWrite {
            ticket,
            event: ProjectEvent::StatusChange(project.clone()),
            message: ProjectMessage::status(status),
        })
    }

    pub fn settle_status(&mut self, ticket: Ticket, result: Result<(), ApiError>) -> Option<ProjectEvent> {
        match result {
            Ok(()) => {
                self.status.confirm(ticket);
                None
            }
            Err(e) => {
                if let (Some(previous), Some(project)) = (self.status.reject(ticket), self.project.as_mut()) {
                    log::warn!("Status update failed, rolling back to {}", previous.as_str());
                    project.status = previous;
                }
                Some(ProjectEvent::Error(e))
            }
        }
    }

    /// Progress is clamped to `0..=100` before it is applied or sent.
    pub fn begin_progress(&mut self, progress: i64) -> Option<PendingWrite> {
        let project = self.project.as_mut()?;
        let progress = clamp_progress(progress);
        let ticket = self.progress.propose(project.progress, progress);
        project.progress = progress;
        project.touch();
        Some(PendingWrite {
            ticket,
            event: ProjectEvent::ProgressUpdate(project.clone()),
            message: ProjectMessage::progress(progress),
        })
    }

    pub fn settle_progress(&mut self, ticket: Ticket, result: Result<(), ApiError>) -> Option<ProjectEvent> {
        match result {
            Ok(()) => {
                self.progress.confirm(ticket);
                None
            }
            Err(e) => {
                if let (Some(previous), Some(project)) = (self.progress.reject(ticket), self.project.as_mut()) {
                    log::warn!("Progress update failed, rolling back to {previous}");
                    project.progress = previous;
                }
                Some(ProjectEvent::Error(e))
            }
        }
    }

    /// Unknown milestone ids and empty patches are a no-op for local writes.
    pub fn begin_milestone(&mut self, id: &str, patch: &MilestonePatch) -> Option<PendingWrite> {
        if patch.is_empty() {
            return None;
        }
        let project = self.project.as_mut()?;
        let milestone = project.milestone_mut(id)?;
        let patch = patch.clone().clamped();

        let before = milestone.clone();
        patch.apply_to(milestone);
        let after = milestone.clone();
        let ticket = self
            .milestones
            .entry(id.to_string())
            .or_default()
            .propose(before, after.clone());

        Some(PendingWrite {
            ticket,
            event: ProjectEvent::MilestoneUpdate(after),
            message: ProjectMessage::MilestoneUpdate(MilestoneUpdate {
                id: id.to_string(),
                patch,
            }),
        })
    }

    pub fn settle_milestone(
        &mut self,
        id: &str,
        ticket: Ticket,
        result: Result<(), ApiError>,
    ) -> Option<ProjectEvent> {
        let ledger = self.milestones.get_mut(id);
        match result {
            Ok(()) => {
                if let Some(ledger) = ledger {
                    ledger.confirm(ticket);
                }
                None
            }
            Err(e) => {
                let previous = ledger.and_then(|ledger| ledger.reject(ticket));
                let target = self.project.as_mut().and_then(|p| p.milestone_mut(id));
                if let (Some(previous), Some(milestone)) = (previous, target) {
                    log::warn!("Milestone {id} update failed, rolling back");
                    *milestone = previous;
                }
                Some(ProjectEvent::Error(e))
            }
        }
    }
}

/// Unknown members are left alone.
fn set_online(project: &mut ProjectState, user_id: &str, online: bool) -> Option<ProjectMember> {
    let member = project.member_mut(user_id)?;
    member.is_online = online;
    let member = member.clone();
    project.touch();
    Some(member)
}
