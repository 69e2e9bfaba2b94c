//! Shared project record.
//!
//! Records arrive from two places: the fallback API and `sync.response`
//! frames. Both are decoded leniently. Keys may be camelCase or snake_case,
//! ids may be strings or numbers, and missing fields take defaults.
//! Progress is always clamped to `0..=100` on the way in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display name for members whose record omits one.
pub const UNKNOWN_MEMBER: &str = "Unknown";

/// Clamp a progress value to `0..=100`.
pub fn clamp_progress(progress: i64) -> u8 {
    progress.clamp(0, 100) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    InProgress,
    Review,
    Completed,
    OnHold,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Review => "review",
            ProjectStatus::Completed => "completed",
            ProjectStatus::OnHold => "on_hold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Editor,
    #[default]
    Viewer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMember {
    #[serde(alias = "user_id", deserialize_with = "lenient::id")]
    pub user_id: String,
    #[serde(
        default = "unknown_member",
        alias = "userName",
        alias = "user_name",
        alias = "display_name",
        deserialize_with = "lenient::member_name"
    )]
    pub display_name: String,
    #[serde(
        default,
        alias = "userAvatar",
        alias = "user_avatar",
        alias = "avatar_ref",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_ref: Option<String>,
    #[serde(default, deserialize_with = "lenient::null_default")]
    pub role: MemberRole,
    #[serde(default = "Utc::now", alias = "joined_at", deserialize_with = "lenient::date_or_now")]
    pub joined_at: DateTime<Utc>,
    #[serde(default, alias = "is_online", deserialize_with = "lenient::null_default")]
    pub is_online: bool,
}

fn unknown_member() -> String {
    UNKNOWN_MEMBER.to_string()
}

impl ProjectMember {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, role: MemberRole) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar_ref: None,
            role,
            joined_at: Utc::now(),
            is_online: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(default, alias = "title", deserialize_with = "lenient::null_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "due_date", deserialize_with = "lenient::opt_date")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::null_default")]
    pub completed: bool,
    #[serde(default, deserialize_with = "lenient::progress")]
    pub progress: u8,
}

impl Milestone {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            due_date: None,
            completed: false,
            progress: 0,
        }
    }
}

/// Partial milestone fields. Used for local edits, the `milestone.update`
/// payload and the milestone PATCH body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestonePatch {
    #[serde(default, alias = "title", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        alias = "due_date",
        deserialize_with = "lenient::opt_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_progress",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress: Option<u8>,
}

impl MilestonePatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn progress(mut self, progress: i64) -> Self {
        self.progress = Some(clamp_progress(progress));
        self
    }

    pub fn due(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// The same patch with progress clamped.
    pub fn clamped(mut self) -> Self {
        self.progress = self.progress.map(|p| p.min(100));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.completed.is_none()
            && self.progress.is_none()
    }

    /// Shallow-merge into an existing milestone.
    pub fn apply_to(&self, milestone: &mut Milestone) {
        if let Some(name) = &self.name {
            milestone.name = name.clone();
        }
        if let Some(description) = &self.description {
            milestone.description = Some(description.clone());
        }
        if let Some(due_date) = self.due_date {
            milestone.due_date = Some(due_date);
        }
        if let Some(completed) = self.completed {
            milestone.completed = completed;
        }
        if let Some(progress) = self.progress {
            milestone.progress = progress.min(100);
        }
    }

    /// Build a new milestone from the patch, defaults elsewhere.
    pub fn into_milestone(self, id: impl Into<String>) -> Milestone {
        let mut milestone = Milestone::new(id, "");
        self.apply_to(&mut milestone);
        milestone
    }
}

/// Partial project fields for the project PATCH body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl ProjectPatch {
    pub fn status(status: ProjectStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress.min(100)),
            ..Self::default()
        }
    }
}

/// Canonical shared state of one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(default, alias = "title", deserialize_with = "lenient::null_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::null_default")]
    pub status: ProjectStatus,
    #[serde(default, deserialize_with = "lenient::progress")]
    pub progress: u8,
    #[serde(default, alias = "start_date", deserialize_with = "lenient::opt_date")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, alias = "end_date", deserialize_with = "lenient::opt_date")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now", alias = "updated_at", deserialize_with = "lenient::date_or_now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient::null_default")]
    pub members: Vec<ProjectMember>,
    #[serde(default, deserialize_with = "lenient::null_default")]
    pub milestones: Vec<Milestone>,
}

impl ProjectState {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            status: ProjectStatus::Planning,
            progress: 0,
            start_date: None,
            end_date: None,
            updated_at: Utc::now(),
            members: Vec::new(),
            milestones: Vec::new(),
        }
    }

    /// Stamp `updated_at` with the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn member(&self, user_id: &str) -> Option<&ProjectMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn member_mut(&mut self, user_id: &str) -> Option<&mut ProjectMember> {
        self.members.iter_mut().find(|m| m.user_id == user_id)
    }

    pub fn milestone(&self, id: &str) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.id == id)
    }

    pub fn milestone_mut(&mut self, id: &str) -> Option<&mut Milestone> {
        self.milestones.iter_mut().find(|m| m.id == id)
    }

    pub fn online_members(&self) -> Vec<ProjectMember> {
        self.members.iter().filter(|m| m.is_online).cloned().collect()
    }
}

/// Field deserializers that accept the shapes older backends produce.
pub(crate) mod lenient {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use serde::de::{self, Deserializer};
    use serde::Deserialize;
    use serde_json::Value;

    use super::{clamp_progress, UNKNOWN_MEMBER};

    /// String or integer id.
    pub fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(de::Error::custom(format!("expected string or number id, got {other}"))),
        }
    }

    /// `null` becomes the type's default.
    pub fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }

    pub fn member_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_MEMBER.to_string()))
    }

    fn number_to_progress<E: de::Error>(value: Value) -> Result<Option<u8>, E> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_f64()
                .map(|p| Some(clamp_progress(p.round() as i64)))
                .ok_or_else(|| E::custom("progress out of range")),
            other => Err(E::custom(format!("expected numeric progress, got {other}"))),
        }
    }

    /// Any JSON number, rounded and clamped. `null` is 0.
    pub fn progress<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        Ok(number_to_progress::<D::Error>(Value::deserialize(deserializer)?)?.unwrap_or(0))
    }

    pub fn opt_progress<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
        number_to_progress(Value::deserialize(deserializer)?)
    }

    /// RFC 3339, naive datetime, plain date, or epoch milliseconds.
    /// Anything unparseable is treated as absent.
    pub fn opt_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => parse_date(&s),
            Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
            _ => None,
        })
    }

    pub fn date_or_now<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        Ok(opt_date(deserializer)?.unwrap_or_else(Utc::now))
    }

    pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_clamp_progress() {
        assert_eq!(clamp_progress(150), 100);
        assert_eq!(clamp_progress(-5), 0);
        assert_eq!(clamp_progress(42), 42);
    }

    #[test]
    fn test_parse_snake_case_record() {
        let project: ProjectState = serde_json::from_value(json!({
            "id": 42,
            "title": "Spring campaign",
            "status": "in_progress",
            "progress": 37.6,
            "start_date": "2024-03-01",
            "end_date": "2024-04-15T18:00:00Z",
            "updated_at": "2024-03-10T09:30:00.123",
            "members": [
                { "user_id": 7, "user_name": "Mina", "role": "owner", "is_online": true },
                { "user_id": "u-8" }
            ],
            "milestones": [
                { "id": "m-1", "title": "Script", "due_date": "2024-03-20", "progress": 250 }
            ]
        }))
        .unwrap();

        assert_eq!(project.id, "42");
        assert_eq!(project.name, "Spring campaign");
        assert_eq!(project.status, ProjectStatus::InProgress);
        assert_eq!(project.progress, 38);
        assert_eq!(project.start_date, Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
        assert_eq!(project.end_date, Some(Utc.with_ymd_and_hms(2024, 4, 15, 18, 0, 0).unwrap()));

        assert_eq!(project.members[0].user_id, "7");
        assert_eq!(project.members[0].role, MemberRole::Owner);
        assert!(project.members[0].is_online);
        assert_eq!(project.members[1].display_name, "Unknown");
        assert_eq!(project.members[1].role, MemberRole::Viewer);
        assert!(!project.members[1].is_online);

        assert_eq!(project.milestones[0].name, "Script");
        assert_eq!(project.milestones[0].progress, 100);
        assert!(!project.milestones[0].completed);
    }

    #[test]
    fn test_parse_minimal_record() {
        let before = Utc::now();
        let project: ProjectState = serde_json::from_value(json!({ "id": "p-1", "status": null })).unwrap();
        assert_eq!(project.status, ProjectStatus::Planning);
        assert_eq!(project.progress, 0);
        assert!(project.members.is_empty());
        assert!(project.milestones.is_empty());
        assert!(project.start_date.is_none());
        assert!(project.updated_at >= before);
    }

    #[test]
    fn test_camel_case_roundtrip_keys() {
        let mut project = ProjectState::new("p-1", "Demo");
        project.members.push(ProjectMember::new("u-1", "Ann", MemberRole::Editor));
        let value = serde_json::to_value(&project).unwrap();

        assert_eq!(value["status"], "planning");
        assert!(value.get("updatedAt").is_some());
        assert_eq!(value["members"][0]["displayName"], "Ann");
        assert_eq!(value["members"][0]["role"], "editor");

        let back: ProjectState = serde_json::from_value(value).unwrap();
        assert_eq!(back, project);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        assert!(serde_json::from_value::<ProjectState>(json!({ "name": "x" })).is_err());
        assert!(serde_json::from_value::<ProjectState>(json!({ "id": true })).is_err());
    }

    #[test]
    fn test_milestone_patch_merge() {
        let mut milestone = Milestone::new("m-1", "Storyboard");
        milestone.progress = 10;

        MilestonePatch::default().progress(140).completed(true).apply_to(&mut milestone);
        assert_eq!(milestone.name, "Storyboard");
        assert_eq!(milestone.progress, 100);
        assert!(milestone.completed);
    }

    #[test]
    fn test_milestone_patch_wire_shape() {
        let patch = MilestonePatch::default().name("Cut").progress(20);
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({ "name": "Cut", "progress": 20 }));

        let decoded: MilestonePatch =
            serde_json::from_value(json!({ "progress": -3, "due_date": 1_700_000_000_000_i64 })).unwrap();
        assert_eq!(decoded.progress, Some(0));
        assert_eq!(decoded.due_date, DateTime::from_timestamp_millis(1_700_000_000_000));
    }

    #[test]
    fn test_patch_into_new_milestone() {
        let milestone = MilestonePatch::default().name("Launch").into_milestone("m-9");
        assert_eq!(milestone.id, "m-9");
        assert_eq!(milestone.name, "Launch");
        assert_eq!(milestone.progress, 0);
        assert!(!milestone.completed);
    }

    #[test]
    fn test_project_patch_body() {
        assert_eq!(
            serde_json::to_value(ProjectPatch::status(ProjectStatus::OnHold)).unwrap(),
            json!({ "status": "on_hold" })
        );
        assert_eq!(serde_json::to_value(ProjectPatch::progress(120)).unwrap(), json!({ "progress": 100 }));
    }

    #[test]
    fn test_online_members() {
        let mut project = ProjectState::new("p", "P");
        let mut online = ProjectMember::new("a", "A", MemberRole::Owner);
        online.is_online = true;
        project.members.push(online);
        project.members.push(ProjectMember::new("b", "B", MemberRole::Viewer));

        let ids: Vec<String> = project.online_members().into_iter().map(|m| m.user_id).collect();
        assert_eq!(ids, ["a"]);
    }
}
