//! Local event bus: in-process publish/subscribe between a service and UI code.
//!
//! Handlers are keyed by event kind. Emission snapshots the handler list
//! before invoking it, so a handler may register or remove listeners
//! (including itself) while running.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::mpsc;

/// An event that can travel over an [`EventBus`].
pub trait BusEvent: Clone + Send + Sync + 'static {
    /// Discriminant used for subscription.
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Shared handler callback.
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Token returned by [`EventBus::on`], used to detach the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Channel-backed handler registered by `subscribe`. `kind` is `None` for
/// wildcard subscriptions.
struct Forwarder<E: BusEvent> {
    kind: Option<E::Kind>,
    id: ListenerId,
    tx: mpsc::UnboundedSender<E>,
}

/// Per-kind handler registry.
pub struct EventBus<E: BusEvent> {
    listeners: RwLock<HashMap<E::Kind, Vec<(ListenerId, Handler<E>)>>>,
    wildcard: RwLock<Vec<(ListenerId, Handler<E>)>>,
    forwarders: Mutex<Vec<Forwarder<E>>>,
    next_id: AtomicU64,
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            wildcard: RwLock::new(Vec::new()),
            forwarders: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a handler for one event kind.
    pub fn on<F>(&self, kind: E::Kind, handler: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Register a handler for every event kind.
    pub fn on_all<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.wildcard
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn off(&self, kind: E::Kind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(handlers) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            listeners.remove(&kind);
        }
        drop(listeners);
        self.forget_forwarder(id);
        removed
    }

    /// Remove a wildcard handler.
    pub fn off_all(&self, id: ListenerId) -> bool {
        let mut wildcard = self.wildcard.write().unwrap_or_else(PoisonError::into_inner);
        let before = wildcard.len();
        wildcard.retain(|(existing, _)| *existing != id);
        let removed = wildcard.len() != before;
        drop(wildcard);
        self.forget_forwarder(id);
        removed
    }

    fn forget_forwarder(&self, id: ListenerId) {
        self.forwarders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|forwarder| forwarder.id != id);
    }

    /// Detach forwarders whose receiver has been dropped.
    fn prune_closed(&self) {
        let mut closed = Vec::new();
        self.forwarders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|forwarder| {
                if forwarder.tx.is_closed() {
                    closed.push((forwarder.kind, forwarder.id));
                    false
                } else {
                    true
                }
            });
        for (kind, id) in closed {
            match kind {
                Some(kind) => self.off(kind, id),
                None => self.off_all(id),
            };
        }
    }

    /// Forward one event kind into an unbounded channel.
    ///
    /// The forwarding handler is detached on the first emit after the
    /// receiver is dropped, or earlier through [`off`](Self::off).
    pub fn subscribe(&self, kind: E::Kind) -> (ListenerId, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = tx.clone();
        let id = self.on(kind, move |event: &E| {
            let _ = sender.send(event.clone());
        });
        self.track_forwarder(Some(kind), id, tx);
        (id, rx)
    }

    /// Forward every event into an unbounded channel.
    pub fn subscribe_all(&self) -> (ListenerId, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = tx.clone();
        let id = self.on_all(move |event: &E| {
            let _ = sender.send(event.clone());
        });
        self.track_forwarder(None, id, tx);
        (id, rx)
    }

    fn track_forwarder(&self, kind: Option<E::Kind>, id: ListenerId, tx: mpsc::UnboundedSender<E>) {
        self.forwarders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Forwarder { kind, id, tx });
    }

    /// Deliver an event to its kind's handlers, then to wildcard handlers.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, event: &E) -> usize {
        self.prune_closed();
        let mut handlers: Vec<Handler<E>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        handlers.extend(
            self.wildcard
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(_, h)| h.clone()),
        );

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Number of handlers registered for `kind` (wildcards excluded).
    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Drop every handler.
    pub fn clear(&self) {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.wildcard.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.forwarders.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
