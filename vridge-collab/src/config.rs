//! Endpoint and timing configuration shared by both services.

use std::time::Duration;

/// Environment variable overriding [`SyncConfig::ws_base_url`].
pub const ENV_WS_URL: &str = "VRIDGE_WS_URL";
/// Environment variable overriding [`SyncConfig::api_base_url`].
pub const ENV_API_URL: &str = "VRIDGE_API_URL";

/// Sync configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Base URL of the realtime channel endpoint (no trailing path).
    pub ws_base_url: String,
    /// Base URL of the fallback request/response API.
    pub api_base_url: String,
    /// Minimum spacing between outbound pointer-move events.
    pub cursor_throttle: Duration,
    /// Silence after key-up before `typing.stop` is sent.
    pub typing_timeout: Duration,
    /// Silence before the local user is reported idle.
    pub idle_timeout: Duration,
    /// Period of the full project resync request.
    pub resync_interval: Duration,
    /// Per-request timeout for the fallback API.
    pub http_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_base_url: "ws://localhost:8000".to_string(),
            api_base_url: "http://localhost:8000".to_string(),
            cursor_throttle: Duration::from_millis(50),
            typing_timeout: Duration::from_millis(1000),
            idle_timeout: Duration::from_millis(30_000),
            resync_interval: Duration::from_millis(30_000),
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl SyncConfig {
    /// Defaults, with endpoint URLs taken from the environment when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = non_empty_var(ENV_WS_URL) {
            config.ws_base_url = url;
        }
        if let Some(url) = non_empty_var(ENV_API_URL) {
            config.api_base_url = url;
        }
        config
    }

    /// Channel URL for a presence session.
    pub fn collaboration_url(&self, session_id: &str) -> String {
        format!("{}/ws/collaboration/{session_id}/", self.ws_base_url.trim_end_matches('/'))
    }

    /// Channel URL for a project sync session.
    pub fn project_url(&self, project_id: &str) -> String {
        format!("{}/ws/project/{project_id}/", self.ws_base_url.trim_end_matches('/'))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// The identity this process acts as on every channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub user_id: String,
    pub display_name: String,
    pub avatar_ref: Option<String>,
}

impl LocalUser {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar_ref: None,
        }
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }
}
