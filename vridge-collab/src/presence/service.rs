//! Presence service: one collaboration session over a channel.
//!
//! Provides:
//! - Session lifecycle (`start_session` / `stop_session`)
//! - Local input intake through a cloneable [`InputHandle`]
//! - A driver task that owns every timer and applies channel traffic in
//!   delivery order
//! - Local event subscription through the service's [`EventBus`]

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::event::{PresenceEvent, PresenceEventKind};
use super::model::PeerPresence;
use super::session::{CollaborationSession, LocalInput};
use super::message::PresenceMessage;
use crate::bus::{EventBus, ListenerId};
use crate::channel::{Channel, ChannelEvent, Connector};
use crate::config::{LocalUser, SyncConfig};
use crate::lifecycle::{SessionError, SessionState};

/// Sends local input to a running session.
///
/// Sends fail once the session is stopped.
#[derive(Debug, Clone)]
pub struct InputHandle {
    tx: mpsc::UnboundedSender<LocalInput>,
}

impl InputHandle {
    /// Deliver one input event. Returns `false` if the session has ended.
    pub fn send(&self, input: LocalInput) -> bool {
        self.tx.send(input).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Default)]
struct Shared {
    state: SessionState,
    session: Option<CollaborationSession>,
}

struct ActiveSession<Ch> {
    session_id: String,
    channel: Arc<Ch>,
    driver: JoinHandle<()>,
    inputs: InputHandle,
}

/// Presence service for the local user.
pub struct PresenceService<C: Connector> {
    connector: C,
    config: SyncConfig,
    local: LocalUser,
    bus: Arc<EventBus<PresenceEvent>>,
    shared: Arc<Mutex<Shared>>,
    active: Option<ActiveSession<C::Channel>>,
}

impl<C: Connector> PresenceService<C> {
    pub fn new(connector: C, config: SyncConfig, local: LocalUser) -> Self {
        Self {
            connector,
            config,
            local,
            bus: Arc::new(EventBus::new()),
            shared: Arc::new(Mutex::new(Shared::default())),
            active: None,
        }
    }

    /// Open a session. The channel URL defaults to the collaboration
    /// endpoint for `session_id`.
    pub async fn start_session(
        &mut self,
        session_id: &str,
        channel_url: Option<&str>,
    ) -> Result<(), SessionError> {
        if let Some(active) = &self.active {
            return Err(SessionError::AlreadyActive(active.session_id.clone()));
        }

        let url = channel_url
            .map(str::to_string)
            .unwrap_or_else(|| self.config.collaboration_url(session_id));
        let channel = Arc::new(self.connector.open(&url));
        let session = CollaborationSession::new(session_id, self.local.clone(), &self.config, Instant::now());

        {
            let mut shared = self.shared.lock().await;
            shared.session = Some(session);
            shared.state = SessionState::Connecting;
        }

        let events = channel.connect();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            user_id: self.local.user_id.clone(),
            channel: channel.clone(),
            shared: self.shared.clone(),
            bus: self.bus.clone(),
        };
        let handle = tokio::spawn(driver.run(events, input_rx));

        log::info!("Presence session {session_id} started for {} via {url}", self.local.user_id);
        self.active = Some(ActiveSession {
            session_id: session_id.to_string(),
            channel,
            driver: handle,
            inputs: InputHandle { tx: input_tx },
        });
        Ok(())
    }

    /// Leave the session and release everything it holds. Idempotent.
    pub async fn stop_session(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        // Cancels every pending timer along with the driver. Awaiting the
        // handle waits out a poll already running on another worker, so
        // nothing the driver sends can follow `user.leave`.
        active.driver.abort();
        let _ = active.driver.await;

        let mut shared = self.shared.lock().await;
        if let Some(mut session) = shared.session.take() {
            send_message(active.channel.as_ref(), &self.local.user_id, session.leave_message());
            session.clear();
        }
        shared.state = SessionState::Destroyed;
        drop(shared);

        active.channel.destroy();
        log::info!("Presence session {} stopped", active.session_id);
    }

    /// Handle for delivering local input, while a session is open.
    pub fn inputs(&self) -> Option<InputHandle> {
        self.active.as_ref().map(|active| active.inputs.clone())
    }

    pub async fn state(&self) -> SessionState {
        self.shared.lock().await.state
    }

    /// Known peers, ordered by user id.
    pub async fn users(&self) -> Vec<PeerPresence> {
        self.shared
            .lock()
            .await
            .session
            .as_ref()
            .map(CollaborationSession::users)
            .unwrap_or_default()
    }

    pub async fn user(&self, user_id: &str) -> Option<PeerPresence> {
        self.shared
            .lock()
            .await
            .session
            .as_ref()
            .and_then(|session| session.user(user_id).cloned())
    }

    pub fn local_user(&self) -> &LocalUser {
        &self.local
    }

    pub fn session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.session_id.as_str())
    }

    // ── Local subscription ───────────────────────────────────────

    pub fn on<F>(&self, kind: PresenceEventKind, handler: F) -> ListenerId
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, handler)
    }

    pub fn off(&self, kind: PresenceEventKind, id: ListenerId) -> bool {
        self.bus.off(kind, id)
    }

    pub fn on_all<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        self.bus.on_all(handler)
    }

    pub fn off_all(&self, id: ListenerId) -> bool {
        self.bus.off_all(id)
    }

    pub fn subscribe(&self, kind: PresenceEventKind) -> (ListenerId, mpsc::UnboundedReceiver<PresenceEvent>) {
        self.bus.subscribe(kind)
    }

    pub fn subscribe_all(&self) -> (ListenerId, mpsc::UnboundedReceiver<PresenceEvent>) {
        self.bus.subscribe_all()
    }
}

impl<C: Connector> Drop for PresenceService<C> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.driver.abort();
            active.channel.destroy();
        }
    }
}

fn send_message<Ch: Channel>(channel: &Ch, user_id: &str, message: PresenceMessage) {
    let kind = message.kind();
    let result = message
        .into_envelope(user_id)
        .map_err(Into::into)
        .and_then(|envelope| channel.send(envelope));
    if let Err(e) = result {
        log::warn!("Failed to send {kind}: {e}");
    }
}

/// Driver task state. Runs until aborted by `stop_session`.
struct Driver<Ch> {
    user_id: String,
    channel: Arc<Ch>,
    shared: Arc<Mutex<Shared>>,
    bus: Arc<EventBus<PresenceEvent>>,
}

impl<Ch: Channel> Driver<Ch> {
    async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<ChannelEvent>,
        mut inputs: mpsc::UnboundedReceiver<LocalInput>,
    ) {
        let mut events_open = true;
        let mut inputs_open = true;

        loop {
            let deadline = self
                .shared
                .lock()
                .await
                .session
                .as_ref()
                .and_then(CollaborationSession::next_deadline);

            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => self.on_channel_event(event).await,
                    None => {
                        log::debug!("Presence channel event stream ended");
                        events_open = false;
                    }
                },
                input = inputs.recv(), if inputs_open => match input {
                    Some(input) => self.on_input(input).await,
                    None => inputs_open = false,
                },
                _ = sleep_until_deadline(deadline) => self.on_timers().await,
            }
        }
    }

    async fn on_channel_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                let join = {
                    let mut shared = self.shared.lock().await;
                    shared.state = shared.state.on_connected();
                    shared.session.as_ref().map(CollaborationSession::join_message)
                };
                let Some(join) = join else { return };
                log::info!("Presence channel connected");
                send_message(self.channel.as_ref(), &self.user_id, join);
                self.bus.emit(&PresenceEvent::Connected);
            }
            ChannelEvent::Disconnected => {
                let live = {
                    let mut shared = self.shared.lock().await;
                    shared.state = shared.state.on_disconnected();
                    shared.session.is_some()
                };
                if live {
                    log::info!("Presence channel disconnected");
                    self.bus.emit(&PresenceEvent::Disconnected);
                }
            }
            ChannelEvent::Message(envelope) => {
                let raised = match self.shared.lock().await.session.as_mut() {
                    Some(session) => session.handle_envelope(&envelope),
                    None => return,
                };
                for event in &raised {
                    self.bus.emit(event);
                }
            }
        }
    }

    async fn on_input(&self, input: LocalInput) {
        let outgoing = match self.shared.lock().await.session.as_mut() {
            Some(session) => session.on_input(input, Instant::now()),
            None => return,
        };
        for message in outgoing {
            send_message(self.channel.as_ref(), &self.user_id, message);
        }
    }

    async fn on_timers(&self) {
        let outgoing = match self.shared.lock().await.session.as_mut() {
            Some(session) => session.poll_timers(Instant::now()),
            None => return,
        };
        for message in outgoing {
            send_message(self.channel.as_ref(), &self.user_id, message);
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{HubChannel, LocalHub};
    use crate::envelope::Envelope;
    use crate::presence::model::CursorPosition;
    use serde_json::json;
    use tokio::time::{advance, Duration};

    const SESSION: &str = "s-1";

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    struct Fixture {
        hub: Arc<LocalHub>,
        service: PresenceService<Arc<LocalHub>>,
        observer: HubChannel,
        seen: mpsc::UnboundedReceiver<ChannelEvent>,
    }

    async fn fixture() -> Fixture {
        let hub = Arc::new(LocalHub::default());
        let config = SyncConfig::default();
        let observer = hub.channel(&config.collaboration_url(SESSION));
        let seen = observer.connect();
        let mut service = PresenceService::new(hub.clone(), config, LocalUser::new("alice", "Alice"));
        service.start_session(SESSION, None).await.unwrap();
        settle().await;
        Fixture {
            hub,
            service,
            observer,
            seen,
        }
    }

    /// Types sent by alice and observed so far.
    fn sent_by_alice(seen: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> Vec<String> {
        let mut kinds = Vec::new();
        while let Ok(event) = seen.try_recv() {
            if let ChannelEvent::Message(env) = event {
                if env.sender_id == "alice" {
                    kinds.push(env.kind);
                }
            }
        }
        kinds
    }

    fn count(kinds: &[String], kind: &str) -> usize {
        kinds.iter().filter(|k| *k == kind).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_sent_on_connect() {
        let mut f = fixture().await;
        assert_eq!(f.service.state().await, SessionState::Connected);
        assert_eq!(sent_by_alice(&mut f.seen), ["user.join"]);
        assert_eq!(f.hub.room_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let mut f = fixture().await;
        let err = f.service.start_session("other", None).await.unwrap_err();
        assert_eq!(err, SessionError::AlreadyActive(SESSION.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_stop_sent_once() {
        let mut f = fixture().await;
        let input = f.service.inputs().unwrap();
        input.send(LocalInput::KeyDown);
        input.send(LocalInput::KeyUp);
        settle().await;

        advance(Duration::from_millis(1001)).await;
        settle().await;
        advance(Duration::from_secs(5)).await;
        settle().await;

        let kinds = sent_by_alice(&mut f.seen);
        assert_eq!(count(&kinds, "typing.start"), 1);
        assert_eq!(count(&kinds, "typing.stop"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sent_once() {
        let mut f = fixture().await;
        advance(Duration::from_millis(30_001)).await;
        settle().await;
        advance(Duration::from_secs(120)).await;
        settle().await;

        let kinds = sent_by_alice(&mut f.seen);
        assert_eq!(count(&kinds, "user.idle"), 1);
        assert_eq!(count(&kinds, "user.active"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pointer_moves_are_throttled() {
        let mut f = fixture().await;
        let input = f.service.inputs().unwrap();
        for i in 0..5 {
            input.send(LocalInput::PointerMove(CursorPosition::new(f64::from(i), 0.0, 0)));
        }
        settle().await;
        advance(Duration::from_millis(60)).await;
        input.send(LocalInput::PointerMove(CursorPosition::new(9.0, 9.0, 0)));
        settle().await;

        assert_eq!(count(&sent_by_alice(&mut f.seen), "cursor.move"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_events_reach_bus() {
        let f = fixture().await;
        let (_, mut joins) = f.service.subscribe(PresenceEventKind::UserJoin);
        let (_, mut clicks) = f.service.subscribe(PresenceEventKind::UserClick);

        f.observer
            .send(Envelope::new("user.join", "bob", json!({ "displayName": "Bob" })))
            .unwrap();
        f.observer
            .send(Envelope::new("cursor.click", "bob", json!({ "position": { "x": 5, "y": 6 } })))
            .unwrap();
        settle().await;

        assert!(matches!(joins.try_recv(), Ok(PresenceEvent::UserJoin(p)) if p.display_name == "Bob"));
        assert!(matches!(clicks.try_recv(), Ok(PresenceEvent::UserClick { user_id, .. }) if user_id == "bob"));
        let bob = f.service.user("bob").await.unwrap();
        assert_eq!((bob.position.x, bob.position.y), (5.0, 6.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_and_silences_timers() {
        let mut f = fixture().await;
        f.observer
            .send(Envelope::new("user.join", "bob", json!({ "displayName": "Bob" })))
            .unwrap();
        settle().await;
        assert_eq!(f.service.users().await.len(), 1);

        let input = f.service.inputs().unwrap();
        input.send(LocalInput::KeyDown);
        input.send(LocalInput::KeyUp);
        settle().await;

        f.service.stop_session().await;
        f.service.stop_session().await;
        assert!(f.service.users().await.is_empty());
        assert_eq!(f.service.state().await, SessionState::Destroyed);
        assert!(f.service.inputs().is_none());

        assert!(!input.send(LocalInput::KeyDown));
        advance(Duration::from_secs(120)).await;
        settle().await;

        let kinds = sent_by_alice(&mut f.seen);
        assert_eq!(kinds.last().map(String::as_str), Some("user.leave"));
        assert_eq!(count(&kinds, "typing.stop"), 0);
        assert_eq!(count(&kinds, "user.idle"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_leave_is_last_frame_under_load() {
        let mut f = fixture().await;
        let input = f.service.inputs().unwrap();
        let pump = tokio::spawn(async move {
            let mut i = 0.0;
            while input.send(LocalInput::Click(CursorPosition::new(i, i, 0))) {
                i += 1.0;
                tokio::task::yield_now().await;
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        f.service.stop_session().await;
        pump.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let kinds = sent_by_alice(&mut f.seen);
        assert!(count(&kinds, "cursor.click") > 0);
        assert_eq!(kinds.last().map(String::as_str), Some("user.leave"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let mut f = fixture().await;
        f.service.stop_session().await;
        f.service.start_session(SESSION, None).await.unwrap();
        settle().await;
        assert_eq!(f.service.state().await, SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_raises_event() {
        let f = fixture().await;
        let (_, mut events) = f.service.subscribe(PresenceEventKind::Disconnected);
        f.observer.group().disconnect_all();
        settle().await;

        assert_eq!(events.try_recv().unwrap(), PresenceEvent::Disconnected);
        assert_eq!(f.service.state().await, SessionState::Disconnected);
    }
}
