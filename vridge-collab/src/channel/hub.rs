//! In-process fan-out hub with room routing.
//!
//! Uses tokio broadcast channels for O(1) send to all subscribers.
//! Each channel gets an independent receiver that buffers up to `capacity`
//! frames; a receiver that falls further behind loses the oldest frames and
//! the loss is counted in [`BroadcastStats::messages_dropped`].
//!
//! Every envelope is delivered to every channel in the room, the sender
//! included. Self-echo filtering is the consumer's job.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{closed_events, Channel, ChannelError, ChannelEvent, Connector};
use crate::envelope::Envelope;

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_peers: usize,
}

/// Frames travelling through a room.
#[derive(Debug, Clone)]
enum HubFrame {
    Envelope(Arc<Envelope>),
    /// Simulated transport drop for every member.
    Disconnect,
}

/// A broadcast group for a single room.
pub struct BroadcastGroup {
    sender: broadcast::Sender<HubFrame>,
    peers: RwLock<HashSet<Uuid>>,
    capacity: usize,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl BroadcastGroup {
    /// Create a new broadcast group with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            peers: RwLock::new(HashSet::new()),
            capacity,
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    fn join(&self, peer_id: Uuid) -> broadcast::Receiver<HubFrame> {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer_id);
        self.sender.subscribe()
    }

    fn leave(&self, peer_id: &Uuid) -> bool {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(peer_id)
    }

    /// Broadcast an envelope to every member. Returns the receiver count.
    pub fn broadcast(&self, envelope: Envelope) -> usize {
        let count = self
            .sender
            .send(HubFrame::Envelope(Arc::new(envelope)))
            .unwrap_or(0);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Report a transport drop to every current member.
    pub fn disconnect_all(&self) -> usize {
        self.sender.send(HubFrame::Disconnect).unwrap_or(0)
    }

    /// Get the current peer count.
    pub fn peer_count(&self) -> usize {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if a peer is connected.
    pub fn has_peer(&self, peer_id: &Uuid) -> bool {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(peer_id)
    }

    /// Lock-free counters plus the current membership.
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            active_peers: self.peer_count(),
        }
    }

    /// Get the channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Room registry: maps channel URLs to broadcast groups.
pub struct LocalHub {
    rooms: RwLock<HashMap<String, Arc<BroadcastGroup>>>,
    default_capacity: usize,
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl LocalHub {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    /// Get or create the room for a channel URL.
    pub fn get_or_create(&self, room: &str) -> Arc<BroadcastGroup> {
        // Fast path: read lock
        if let Some(group) = self
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room)
        {
            return group.clone();
        }

        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        rooms
            .entry(room.to_string())
            .or_insert_with(|| Arc::new(BroadcastGroup::new(self.default_capacity)))
            .clone()
    }

    /// Look up an existing room.
    pub fn room(&self, room: &str) -> Option<Arc<BroadcastGroup>> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room)
            .cloned()
    }

    /// Remove a room with no members.
    pub fn remove_if_empty(&self, room: &str) -> bool {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        if rooms.get(room).is_some_and(|group| group.peer_count() == 0) {
            rooms.remove(room);
            return true;
        }
        false
    }

    /// Get the number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Open a channel into `room`.
    pub fn channel(&self, room: &str) -> HubChannel {
        HubChannel {
            peer_id: Uuid::new_v4(),
            group: self.get_or_create(room),
            task: Mutex::new(None),
            connected: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }
}

impl Connector for LocalHub {
    type Channel = HubChannel;

    fn open(&self, url: &str) -> HubChannel {
        self.channel(url)
    }
}

/// One member's connection to a hub room.
pub struct HubChannel {
    peer_id: Uuid,
    group: Arc<BroadcastGroup>,
    task: Mutex<Option<JoinHandle<()>>>,
    connected: AtomicBool,
    destroyed: AtomicBool,
}

impl HubChannel {
    /// Connection identity inside the room.
    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    /// The room this channel belongs to.
    pub fn group(&self) -> &Arc<BroadcastGroup> {
        &self.group
    }
}

impl Channel for HubChannel {
    fn connect(&self) -> mpsc::UnboundedReceiver<ChannelEvent> {
        if self.destroyed.load(Ordering::Acquire) || self.connected.swap(true, Ordering::AcqRel) {
            return closed_events();
        }

        // Subscribe before returning so nothing sent afterwards is missed.
        let mut frames = self.group.join(self.peer_id);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let group = self.group.clone();

        let handle = tokio::spawn(async move {
            if event_tx.send(ChannelEvent::Connected).is_err() {
                return;
            }
            loop {
                let event = match frames.recv().await {
                    Ok(HubFrame::Envelope(envelope)) => ChannelEvent::Message((*envelope).clone()),
                    Ok(HubFrame::Disconnect) | Err(broadcast::error::RecvError::Closed) => {
                        let _ = event_tx.send(ChannelEvent::Disconnected);
                        return;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Hub receiver lagged, {skipped} frames dropped");
                        group.messages_dropped.fetch_add(skipped, Ordering::Relaxed);
                        continue;
                    }
                };
                if event_tx.send(event).is_err() {
                    return;
                }
            }
        });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        event_rx
    }

    fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        self.group.broadcast(envelope);
        Ok(())
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        self.group.leave(&self.peer_id);
    }
}

impl Drop for HubChannel {
    fn drop(&mut self) {
        self.destroy();
    }
}
