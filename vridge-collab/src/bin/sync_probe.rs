//! Joins a presence session and a project session and logs every local
//! event until interrupted.
//!
//! ```text
//! VRIDGE_WS_URL=wss://rt.example.com VRIDGE_API_URL=https://api.example.com \
//! RUST_LOG=info sync-probe <user-id> <session-id> <project-id>
//! ```

use log::{error, info};
use vridge_collab::{
    HttpProjectApi, LocalUser, PresenceService, ProjectSyncService, SyncConfig, WsConnector,
};

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [user_id, session_id, project_id] = args.as_slice() else {
        eprintln!("usage: sync-probe <user-id> <session-id> <project-id>");
        std::process::exit(2);
    };

    let config = SyncConfig::from_env();
    info!("Probing {} (api {})", config.ws_base_url, config.api_base_url);

    let api = match HttpProjectApi::from_config(&config) {
        Ok(api) => api,
        Err(e) => {
            error!("Cannot build API client: {e}");
            std::process::exit(1);
        }
    };
    let local = LocalUser::new(user_id.as_str(), format!("probe-{user_id}"));

    let mut presence = PresenceService::new(WsConnector, config.clone(), local.clone());
    presence.on_all(|event| info!("[presence] {event:?}"));

    let mut project = ProjectSyncService::new(WsConnector, api, config, local);
    project.on_all(|event| info!("[project] {event:?}"));

    if let Err(e) = presence.start_session(session_id, None).await {
        error!("Presence session failed: {e}");
    }
    if let Err(e) = project.start_session(project_id).await {
        error!("Project session failed: {e}");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for ctrl-c: {e}");
    }

    info!("Shutting down");
    presence.stop_session().await;
    project.stop_session().await;
}
