//! Project sync service: one project's shared record over a channel.
//!
//! Local writes are optimistic. Each one is applied and announced at once,
//! then confirmed through the fallback API; a failed confirmation rolls the
//! field back and raises [`ProjectEvent::Error`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::api::ProjectApi;
use super::event::{ProjectEvent, ProjectEventKind};
use super::message::ProjectMessage;
use super::model::{clamp_progress, MilestonePatch, ProjectMember, ProjectPatch, ProjectState, ProjectStatus};
use super::state::SyncState;
use crate::bus::{EventBus, ListenerId};
use crate::channel::{Channel, ChannelEvent, Connector};
use crate::config::{LocalUser, SyncConfig};
use crate::lifecycle::{SessionError, SessionState};

#[derive(Default)]
struct Shared {
    state: SessionState,
    sync: Option<SyncState>,
}

struct ActiveSession<Ch> {
    project_id: String,
    channel: Arc<Ch>,
    driver: JoinHandle<()>,
}

/// Project sync service for the local user.
pub struct ProjectSyncService<C: Connector, A: ProjectApi> {
    connector: C,
    api: A,
    config: SyncConfig,
    local: LocalUser,
    bus: Arc<EventBus<ProjectEvent>>,
    shared: Arc<Mutex<Shared>>,
    active: Option<ActiveSession<C::Channel>>,
}

impl<C: Connector, A: ProjectApi> ProjectSyncService<C, A> {
    pub fn new(connector: C, api: A, config: SyncConfig, local: LocalUser) -> Self {
        Self {
            connector,
            api,
            config,
            local,
            bus: Arc::new(EventBus::new()),
            shared: Arc::new(Mutex::new(Shared::default())),
            active: None,
        }
    }

    /// Open the project channel, load the record and start the periodic
    /// resync. A failed load is reported as [`ProjectEvent::Error`]; the
    /// session stays open and picks the record up from the next
    /// `sync.response`.
    pub async fn start_session(&mut self, project_id: &str) -> Result<(), SessionError> {
        if let Some(active) = &self.active {
            return Err(SessionError::AlreadyActive(active.project_id.clone()));
        }

        let url = self.config.project_url(project_id);
        let channel = Arc::new(self.connector.open(&url));

        {
            let mut shared = self.shared.lock().await;
            shared.sync = Some(SyncState::new(project_id, self.local.user_id.clone()));
            shared.state = SessionState::Connecting;
        }

        let events = channel.connect();
        let driver = Driver {
            user_id: self.local.user_id.clone(),
            channel: channel.clone(),
            shared: self.shared.clone(),
            bus: self.bus.clone(),
        };
        let handle = tokio::spawn(driver.run(events, self.config.resync_interval));

        log::info!("Project session {project_id} started for {} via {url}", self.local.user_id);
        self.active = Some(ActiveSession {
            project_id: project_id.to_string(),
            channel,
            driver: handle,
        });

        self.load_project(project_id).await;
        Ok(())
    }

    async fn load_project(&self, project_id: &str) {
        let event = match self.api.get_project(project_id).await {
            Ok(project) => {
                let mut shared = self.shared.lock().await;
                match shared.sync.as_mut() {
                    Some(sync) => sync.load(project),
                    None => return,
                }
            }
            Err(e) => {
                log::warn!("Failed to load project {project_id}: {e}");
                ProjectEvent::Error(e)
            }
        };
        self.bus.emit(&event);
    }

    /// Cancel the resync timer, destroy the channel and drop the record.
    /// Idempotent.
    pub async fn stop_session(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.driver.abort();
        // Wait out a poll already running on another worker.
        let _ = active.driver.await;

        {
            let mut shared = self.shared.lock().await;
            shared.sync = None;
            shared.state = SessionState::Destroyed;
        }

        active.channel.destroy();
        log::info!("Project session {} stopped", active.project_id);
    }

    // ── Optimistic writes ────────────────────────────────────────

    pub async fn update_status(&self, status: ProjectStatus) {
        let Some(active) = &self.active else { return };
        let Some(write) = self.with_sync(|sync| sync.begin_status(status)).await else {
            return;
        };
        self.bus.emit(&write.event);
        send_message(active.channel.as_ref(), &self.local.user_id, write.message);

        let result = self
            .api
            .patch_project(&active.project_id, &ProjectPatch::status(status))
            .await;
        let raised = self.with_sync(|sync| sync.settle_status(write.ticket, result)).await;
        if let Some(event) = raised {
            self.bus.emit(&event);
        }
    }

    /// Values outside `0..=100` are clamped.
    pub async fn update_progress(&self, progress: i64) {
        let Some(active) = &self.active else { return };
        let progress = clamp_progress(progress);
        let Some(write) = self.with_sync(|sync| sync.begin_progress(i64::from(progress))).await else {
            return;
        };
        let patch = ProjectPatch::progress(progress);
        self.bus.emit(&write.event);
        send_message(active.channel.as_ref(), &self.local.user_id, write.message);

        let result = self.api.patch_project(&active.project_id, &patch).await;
        let raised = self.with_sync(|sync| sync.settle_progress(write.ticket, result)).await;
        if let Some(event) = raised {
            self.bus.emit(&event);
        }
    }

    /// Shallow-merge `patch` into an existing milestone. Unknown ids and
    /// empty patches are ignored.
    pub async fn update_milestone(&self, milestone_id: &str, patch: MilestonePatch) {
        let Some(active) = &self.active else { return };
        let patch = patch.clamped();
        let Some(write) = self.with_sync(|sync| sync.begin_milestone(milestone_id, &patch)).await else {
            return;
        };
        self.bus.emit(&write.event);
        send_message(active.channel.as_ref(), &self.local.user_id, write.message);

        let result = self.api.patch_milestone(milestone_id, &patch).await;
        let raised = self
            .with_sync(|sync| sync.settle_milestone(milestone_id, write.ticket, result))
            .await;
        if let Some(event) = raised {
            self.bus.emit(&event);
        }
    }

    async fn with_sync<T>(&self, f: impl FnOnce(&mut SyncState) -> Option<T>) -> Option<T> {
        self.shared.lock().await.sync.as_mut().and_then(f)
    }

    /// Ask peers for a full copy now instead of at the next resync tick.
    pub async fn request_sync(&self) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        let request = self.shared.lock().await.sync.as_ref().map(SyncState::sync_request);
        match request {
            Some(request) => send_message(active.channel.as_ref(), &self.local.user_id, request),
            None => false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────

    pub async fn state(&self) -> SessionState {
        self.shared.lock().await.state
    }

    pub async fn get_project(&self) -> Option<ProjectState> {
        self.shared
            .lock()
            .await
            .sync
            .as_ref()
            .and_then(|sync| sync.project().cloned())
    }

    pub async fn online_members(&self) -> Vec<ProjectMember> {
        self.shared
            .lock()
            .await
            .sync
            .as_ref()
            .map(SyncState::online_members)
            .unwrap_or_default()
    }

    pub fn local_user(&self) -> &LocalUser {
        &self.local
    }

    pub fn project_id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.project_id.as_str())
    }

    // ── Local subscription ───────────────────────────────────────

    pub fn on<F>(&self, kind: ProjectEventKind, handler: F) -> ListenerId
    where
        F: Fn(&ProjectEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, handler)
    }

    pub fn off(&self, kind: ProjectEventKind, id: ListenerId) -> bool {
        self.bus.off(kind, id)
    }

    pub fn on_all<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&ProjectEvent) + Send + Sync + 'static,
    {
        self.bus.on_all(handler)
    }

    pub fn off_all(&self, id: ListenerId) -> bool {
        self.bus.off_all(id)
    }

    pub fn subscribe(&self, kind: ProjectEventKind) -> (ListenerId, mpsc::UnboundedReceiver<ProjectEvent>) {
        self.bus.subscribe(kind)
    }

    pub fn subscribe_all(&self) -> (ListenerId, mpsc::UnboundedReceiver<ProjectEvent>) {
        self.bus.subscribe_all()
    }
}

impl<C: Connector, A: ProjectApi> Drop for ProjectSyncService<C, A> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.driver.abort();
            active.channel.destroy();
        }
    }
}

fn send_message<Ch: Channel>(channel: &Ch, user_id: &str, message: ProjectMessage) -> bool {
    let kind = message.kind();
    let result = message
        .into_envelope(user_id)
        .map_err(Into::into)
        .and_then(|envelope| channel.send(envelope));
    match result {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Failed to send {kind}: {e}");
            false
        }
    }
}

/// Driver task state. Runs until aborted by `stop_session`.
struct Driver<Ch> {
    user_id: String,
    channel: Arc<Ch>,
    shared: Arc<Mutex<Shared>>,
    bus: Arc<EventBus<ProjectEvent>>,
}

impl<Ch: Channel> Driver<Ch> {
    async fn run(self, mut events: mpsc::UnboundedReceiver<ChannelEvent>, resync_every: Duration) {
        let mut events_open = true;
        let mut resync = interval_at(Instant::now() + resync_every, resync_every);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => self.on_channel_event(event).await,
                    None => {
                        log::debug!("Project channel event stream ended");
                        events_open = false;
                    }
                },
                _ = resync.tick() => self.on_resync().await,
            }
        }
    }

    async fn on_channel_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                {
                    let mut shared = self.shared.lock().await;
                    shared.state = shared.state.on_connected();
                }
                log::info!("Project channel connected");
                send_message(self.channel.as_ref(), &self.user_id, ProjectMessage::online(&self.user_id));
                self.bus.emit(&ProjectEvent::Connected);
            }
            ChannelEvent::Disconnected => {
                {
                    let mut shared = self.shared.lock().await;
                    shared.state = shared.state.on_disconnected();
                }
                log::info!("Project channel disconnected");
                send_message(self.channel.as_ref(), &self.user_id, ProjectMessage::offline(&self.user_id));
                self.bus.emit(&ProjectEvent::Disconnected);
            }
            ChannelEvent::Message(envelope) => {
                let raised = match self.shared.lock().await.sync.as_mut() {
                    Some(sync) => sync.handle_envelope(&envelope),
                    None => return,
                };
                for event in &raised {
                    self.bus.emit(event);
                }
            }
        }
    }

    async fn on_resync(&self) {
        let request = {
            let shared = self.shared.lock().await;
            if shared.state != SessionState::Connected {
                log::debug!("Skipping resync while {:?}", shared.state);
                return;
            }
            match shared.sync.as_ref() {
                Some(sync) => sync.sync_request(),
                None => return,
            }
        };
        send_message(self.channel.as_ref(), &self.user_id, request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{HubChannel, LocalHub};
    use crate::envelope::Envelope;
    use crate::project::api::ApiError;
    use crate::project::model::Milestone;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::advance;

    const PROJECT: &str = "p-1";

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    /// In-memory fallback API. Writes succeed until `failing` is set.
    #[derive(Default)]
    struct FakeApi {
        failing: AtomicBool,
        missing: AtomicBool,
        patches: std::sync::Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn outcome(&self, url: String) -> Result<(), ApiError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(ApiError::Status { status: 500, url })
            } else {
                self.patches.lock().unwrap().push(url);
                Ok(())
            }
        }
    }

    impl ProjectApi for FakeApi {
        async fn get_project(&self, project_id: &str) -> Result<ProjectState, ApiError> {
            if self.missing.load(Ordering::SeqCst) {
                return Err(ApiError::Status {
                    status: 404,
                    url: format!("/api/projects/{project_id}/"),
                });
            }
            let mut project = ProjectState::new(project_id, "Teaser");
            project.members.push(ProjectMember::new("bob", "Bob", Default::default()));
            project.milestones.push(Milestone::new("m-1", "Script"));
            Ok(project)
        }

        async fn patch_project(&self, project_id: &str, patch: &ProjectPatch) -> Result<(), ApiError> {
            self.outcome(format!("/api/projects/{project_id}/ {}", serde_json::to_string(patch).unwrap()))
        }

        async fn patch_milestone(&self, milestone_id: &str, patch: &MilestonePatch) -> Result<(), ApiError> {
            self.outcome(format!("/api/milestones/{milestone_id}/ {}", serde_json::to_string(patch).unwrap()))
        }
    }

    struct Fixture {
        hub: Arc<LocalHub>,
        api: Arc<FakeApi>,
        service: ProjectSyncService<Arc<LocalHub>, Arc<FakeApi>>,
        observer: HubChannel,
        seen: mpsc::UnboundedReceiver<ChannelEvent>,
    }

    async fn fixture_with(api: FakeApi) -> Fixture {
        let hub = Arc::new(LocalHub::default());
        let config = SyncConfig::default();
        let observer = hub.channel(&config.project_url(PROJECT));
        let seen = observer.connect();
        let api = Arc::new(api);
        let mut service = ProjectSyncService::new(hub.clone(), api.clone(), config, LocalUser::new("alice", "Alice"));
        service.start_session(PROJECT).await.unwrap();
        settle().await;
        Fixture {
            hub,
            api,
            service,
            observer,
            seen,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(FakeApi::default()).await
    }

    fn sent_by_alice(seen: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> Vec<Envelope> {
        let mut sent = Vec::new();
        while let Ok(event) = seen.try_recv() {
            if let ChannelEvent::Message(env) = event {
                if env.sender_id == "alice" {
                    sent.push(env);
                }
            }
        }
        sent
    }

    fn kinds(sent: &[Envelope]) -> Vec<&str> {
        sent.iter().map(|env| env.kind.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_loads_and_announces() {
        let mut f = fixture().await;
        assert_eq!(f.service.state().await, SessionState::Connected);
        assert_eq!(f.service.get_project().await.unwrap().name, "Teaser");
        assert_eq!(f.service.project_id(), Some(PROJECT));

        let sent = sent_by_alice(&mut f.seen);
        assert_eq!(kinds(&sent), ["project.member.online"]);
        assert_eq!(sent[0].payload, json!({ "userId": "alice" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_blocks_writes() {
        let api = FakeApi::default();
        api.missing.store(true, Ordering::SeqCst);
        let f = fixture_with(api).await;
        assert!(f.service.get_project().await.is_none());

        // Writes before a record is loaded are no-ops.
        f.service.update_status(ProjectStatus::Review).await;
        assert!(f.service.get_project().await.is_none());
        assert!(f.api.patches.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let mut f = fixture().await;
        let err = f.service.start_session("p-2").await.unwrap_err();
        assert_eq!(err, SessionError::AlreadyActive(PROJECT.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_update_confirmed() {
        let mut f = fixture().await;
        let (_, mut changes) = f.service.subscribe(ProjectEventKind::StatusChange);
        f.service.update_status(ProjectStatus::Review).await;

        assert!(matches!(changes.try_recv(), Ok(ProjectEvent::StatusChange(p)) if p.status == ProjectStatus::Review));
        assert_eq!(f.service.get_project().await.unwrap().status, ProjectStatus::Review);
        assert_eq!(
            f.api.patches.lock().unwrap().as_slice(),
            [r#"/api/projects/p-1/ {"status":"review"}"#]
        );

        settle().await;
        let sent = sent_by_alice(&mut f.seen);
        assert_eq!(sent.last().unwrap().kind, "project.status.change");
        assert_eq!(sent.last().unwrap().payload, json!({ "status": "review" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_rolls_back_on_failure() {
        let f = fixture().await;
        f.api.failing.store(true, Ordering::SeqCst);
        let (_, mut errors) = f.service.subscribe(ProjectEventKind::Error);

        f.service.update_status(ProjectStatus::Completed).await;

        assert_eq!(f.service.get_project().await.unwrap().status, ProjectStatus::Planning);
        assert!(matches!(errors.try_recv(), Ok(ProjectEvent::Error(ApiError::Status { status: 500, .. }))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_clamped() {
        let f = fixture().await;
        f.service.update_progress(150).await;
        assert_eq!(f.service.get_project().await.unwrap().progress, 100);
        f.service.update_progress(-5).await;
        assert_eq!(f.service.get_project().await.unwrap().progress, 0);

        let patches = f.api.patches.lock().unwrap().clone();
        assert_eq!(
            patches,
            [
                r#"/api/projects/p-1/ {"progress":100}"#,
                r#"/api/projects/p-1/ {"progress":0}"#
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_rolls_back_on_failure() {
        let f = fixture().await;
        f.service.update_progress(30).await;
        f.api.failing.store(true, Ordering::SeqCst);
        f.service.update_progress(80).await;
        assert_eq!(f.service.get_project().await.unwrap().progress, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_milestone_update_and_rollback() {
        let mut f = fixture().await;
        f.service
            .update_milestone("m-1", MilestonePatch::default().progress(40))
            .await;
        let project = f.service.get_project().await.unwrap();
        assert_eq!(project.milestone("m-1").unwrap().progress, 40);

        f.api.failing.store(true, Ordering::SeqCst);
        f.service
            .update_milestone("m-1", MilestonePatch::default().completed(true))
            .await;
        let milestone = f.service.get_project().await.unwrap().milestone("m-1").cloned().unwrap();
        assert_eq!(milestone.progress, 40);
        assert!(!milestone.completed);

        settle().await;
        let sent = sent_by_alice(&mut f.seen);
        assert_eq!(
            sent.iter().filter(|e| e.kind == "project.milestone.update").count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_milestone_is_ignored() {
        let mut f = fixture().await;
        let (_, mut events) = f.service.subscribe_all();
        f.service
            .update_milestone("m-404", MilestonePatch::default().completed(true))
            .await;

        assert!(events.try_recv().is_err());
        settle().await;
        assert_eq!(kinds(&sent_by_alice(&mut f.seen)), ["project.member.online"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_messages_apply() {
        let f = fixture().await;
        let (_, mut joins) = f.service.subscribe(ProjectEventKind::MemberJoin);
        let (_, mut fresh) = f.service.subscribe(ProjectEventKind::MilestoneNew);

        f.observer
            .send(Envelope::new("project.member.join", "carol", json!({ "userId": "carol", "userName": "Carol" })))
            .unwrap();
        f.observer
            .send(Envelope::new("project.milestone.update", "carol", json!({ "id": "m-9", "name": "Launch" })))
            .unwrap();
        settle().await;

        assert!(matches!(joins.try_recv(), Ok(ProjectEvent::MemberJoin(m)) if m.user_id == "carol"));
        assert!(matches!(fresh.try_recv(), Ok(ProjectEvent::MilestoneNew(m)) if m.id == "m-9"));
        let online: Vec<String> = f.service.online_members().await.into_iter().map(|m| m.user_id).collect();
        assert_eq!(online, ["carol"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_resync() {
        let mut f = fixture().await;
        advance(Duration::from_millis(30_001)).await;
        settle().await;
        advance(Duration::from_secs(30)).await;
        settle().await;

        let sent = sent_by_alice(&mut f.seen);
        let requests: Vec<&Envelope> = sent.iter().filter(|e| e.kind == "sync.request").collect();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].payload["projectId"], "p-1");
        assert!(requests[0].payload["timestamp"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_sync_sends_now() {
        let mut f = fixture().await;
        assert!(f.service.request_sync().await);
        settle().await;
        assert_eq!(kinds(&sent_by_alice(&mut f.seen)).last(), Some(&"sync.request"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_silences_resync() {
        let mut f = fixture().await;
        f.service.stop_session().await;
        f.service.stop_session().await;

        assert_eq!(f.service.state().await, SessionState::Destroyed);
        assert!(f.service.get_project().await.is_none());
        assert!(!f.service.request_sync().await);

        advance(Duration::from_secs(120)).await;
        settle().await;
        let sent = sent_by_alice(&mut f.seen);
        assert!(!kinds(&sent).contains(&"sync.request"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_announces_offline() {
        let f = fixture().await;
        let (_, mut events) = f.service.subscribe(ProjectEventKind::Disconnected);
        f.observer.group().disconnect_all();
        // The disconnect frame ends every existing receiver; listen on a fresh one.
        let listener = f.hub.channel(&SyncConfig::default().project_url(PROJECT));
        let mut heard = listener.connect();
        settle().await;

        assert_eq!(events.try_recv().unwrap(), ProjectEvent::Disconnected);
        assert_eq!(f.service.state().await, SessionState::Disconnected);

        let sent = sent_by_alice(&mut heard);
        let last = sent.last().unwrap();
        assert_eq!(last.kind, "project.member.offline");
        assert_eq!(last.payload, json!({ "userId": "alice" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_milestone_patch_sends_nothing() {
        let mut f = fixture().await;
        f.service.update_milestone("m-1", MilestonePatch::default()).await;
        settle().await;

        assert!(f.api.patches.lock().unwrap().is_empty());
        assert_eq!(kinds(&sent_by_alice(&mut f.seen)), ["project.member.online"]);
    }
}
