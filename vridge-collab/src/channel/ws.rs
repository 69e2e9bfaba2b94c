//! WebSocket channel for connecting to the realtime server.
//!
//! Provides:
//! - Connection lifecycle (connect, graceful close on destroy)
//! - JSON envelope send/receive over text frames
//! - Outbound queueing: envelopes sent before the socket opens are flushed
//!   in order once it does
//!
//! Reconnect is left to the caller; a dropped socket reports
//! `Disconnected` and the channel stays down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::{closed_events, Channel, ChannelError, ChannelEvent, Connector};
use crate::envelope::Envelope;

/// Frames queued for the writer.
#[derive(Debug)]
enum Outgoing {
    Frame(String),
    Close,
}

/// WebSocket transport for one session URL.
pub struct WsChannel {
    url: String,
    outgoing_tx: mpsc::UnboundedSender<Outgoing>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<Outgoing>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl WsChannel {
    pub fn new(url: impl Into<String>) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            outgoing_tx,
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            task: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Get the server URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Channel for WsChannel {
    fn connect(&self) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let outgoing_rx = self
            .outgoing_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(outgoing_rx) = outgoing_rx else {
            log::warn!("WebSocket channel {} already connected", self.url);
            return closed_events();
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_socket(self.url.clone(), outgoing_rx, event_tx));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        event_rx
    }

    fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        let text = envelope.encode()?;
        self.outgoing_tx
            .send(Outgoing::Frame(text))
            .map_err(|_| ChannelError::Closed)
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Queued frames (e.g. a final leave) are flushed before the close.
        if self.outgoing_tx.send(Outgoing::Close).is_err() {
            if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
                handle.abort();
            }
        }
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            if !self.destroyed.load(Ordering::Acquire) {
                handle.abort();
            }
        }
    }
}

/// Socket task: connect, then pump frames both ways until either side closes.
async fn run_socket(
    url: String,
    mut outgoing_rx: mpsc::UnboundedReceiver<Outgoing>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            log::warn!("WebSocket connect to {url} failed: {e}");
            let _ = event_tx.send(ChannelEvent::Disconnected);
            return;
        }
    };
    log::info!("WebSocket connected: {url}");
    let (mut writer, mut reader) = ws_stream.split();
    let _ = event_tx.send(ChannelEvent::Connected);

    loop {
        tokio::select! {
            outgoing = outgoing_rx.recv() => match outgoing {
                Some(Outgoing::Frame(text)) => {
                    if let Err(e) = writer.send(Message::Text(text.into())).await {
                        log::warn!("WebSocket send to {url} failed: {e}");
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = writer.send(Message::Close(None)).await;
                    log::info!("WebSocket closed: {url}");
                    return;
                }
            },
            incoming = reader.next() => match incoming {
                Some(Ok(Message::Text(text))) => forward(&event_tx, Envelope::decode(text.as_str())),
                Some(Ok(Message::Binary(data))) => forward(&event_tx, Envelope::decode_bytes(&data)),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    log::info!("WebSocket disconnected: {url}");
    let _ = event_tx.send(ChannelEvent::Disconnected);
}

fn forward(
    event_tx: &mpsc::UnboundedSender<ChannelEvent>,
    decoded: Result<Envelope, crate::envelope::EnvelopeError>,
) {
    match decoded {
        Ok(envelope) => {
            let _ = event_tx.send(ChannelEvent::Message(envelope));
        }
        Err(e) => log::debug!("Dropping undecodable frame: {e}"),
    }
}

/// Opens a [`WsChannel`] per session URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Channel = WsChannel;

    fn open(&self, url: &str) -> WsChannel {
        WsChannel::new(url)
    }
}
