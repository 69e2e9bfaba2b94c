//! Message channel abstraction consumed by both services.
//!
//! A channel is a bidirectional envelope transport. Reconnect and heartbeat
//! policy belong to the channel implementation; services only react to the
//! `Connected` / `Disconnected` events it reports.
//!
//! - [`ws`] — WebSocket transport (JSON text frames)
//! - [`hub`] — in-process room fan-out, for tests and embedding

pub mod hub;
pub mod ws;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::envelope::{Envelope, EnvelopeError};

pub use hub::{BroadcastGroup, BroadcastStats, HubChannel, LocalHub};
pub use ws::{WsChannel, WsConnector};

/// Events reported by a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Transport is up.
    Connected,
    /// Transport went down.
    Disconnected,
    /// An envelope arrived.
    Message(Envelope),
}

/// Channel errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// A bidirectional envelope transport.
///
/// `connect` must be called from within a tokio runtime; implementations
/// spawn their I/O tasks there. Events arrive on the returned receiver in
/// delivery order.
pub trait Channel: Send + Sync + 'static {
    /// Start the transport. Only the first call yields a live receiver.
    fn connect(&self) -> mpsc::UnboundedReceiver<ChannelEvent>;

    /// Queue an envelope for delivery.
    fn send(&self, envelope: Envelope) -> Result<(), ChannelError>;

    /// Tear the transport down. Idempotent.
    fn destroy(&self);
}

/// Opens channels scoped to a URL (one per session).
pub trait Connector: Send + Sync + 'static {
    type Channel: Channel;

    fn open(&self, url: &str) -> Self::Channel;
}

impl<C: Connector> Connector for Arc<C> {
    type Channel = C::Channel;

    fn open(&self, url: &str) -> Self::Channel {
        (**self).open(url)
    }
}

/// A receiver whose sender is already gone, for repeated `connect` calls.
pub(crate) fn closed_events() -> mpsc::UnboundedReceiver<ChannelEvent> {
    let (_, rx) = mpsc::unbounded_channel();
    rx
}
