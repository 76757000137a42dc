//! Progress-stream broker: fans out per-node events to live subscribers.
//!
//! The broker is one explicit, constructed-once component handed to request
//! handlers, never a process-wide static map. It owns the subscriber
//! registry, keyed by an opaque stream id supplied by the caller; it does not
//! own the transports themselves (those belong to the inbound connections).
//!
//! Each subscriber is a bounded channel handle. Publishing try-writes to every
//! handle registered under the stream id; a closed or backed-up handle is
//! implicitly unsubscribed and delivery continues with the rest. A per-
//! subscriber heartbeat task writes keep-alive frames on a fixed interval and
//! is cancelled exactly once, at unsubscribe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Keep-alive cadence matching typical proxy idle timeouts.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Bounded per-subscriber buffer; a consumer that falls this far behind is
/// treated as a write failure and dropped.
const SUBSCRIBER_BUFFER: usize = 64;

/// A progress event for one node's message emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub node: String,
    pub messages: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn now(node: impl Into<String>, messages: Vec<String>) -> Self {
        Self {
            node: node.into(),
            messages,
            timestamp: Utc::now(),
        }
    }
}

/// What a subscriber reads off its transport handle.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Initial acknowledgment written once at registration.
    Connected,
    /// A published progress event.
    Event(ProgressEvent),
    /// Periodic keep-alive.
    Heartbeat,
}

struct Subscriber {
    token: u64,
    tx: mpsc::Sender<Frame>,
    heartbeat: tokio::task::JoinHandle<()>,
}

/// Registry of live progress subscribers. Cheap to clone; all clones share the
/// same registry.
#[derive(Clone)]
pub struct ProgressBroker {
    streams: Arc<Mutex<HashMap<String, Vec<Subscriber>>>>,
    next_token: Arc<AtomicU64>,
    heartbeat_interval: Duration,
}

impl ProgressBroker {
    pub fn new() -> Self {
        Self::with_heartbeat_interval(DEFAULT_HEARTBEAT_INTERVAL)
    }

    pub fn with_heartbeat_interval(heartbeat_interval: Duration) -> Self {
        Self {
            streams: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
            heartbeat_interval,
        }
    }

    /// Register a new subscriber under `stream_id` and hand back its transport
    /// handle. The handle receives a [`Frame::Connected`] acknowledgment
    /// immediately, then published events and heartbeats until it is dropped,
    /// explicitly unsubscribed, or fails a write.
    ///
    /// Must be called from within a tokio runtime (spawns the heartbeat task).
    pub fn subscribe(&self, stream_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        // The buffer is empty at this point, so the ack cannot fail.
        let _ = tx.try_send(Frame::Connected);

        let heartbeat = tokio::spawn({
            let tx = tx.clone();
            let interval = self.heartbeat_interval;
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await; // first tick completes immediately
                loop {
                    ticker.tick().await;
                    if tx.send(Frame::Heartbeat).await.is_err() {
                        break;
                    }
                }
            }
        });

        let mut streams = self.streams.lock().unwrap();
        streams
            .entry(stream_id.to_string())
            .or_default()
            .push(Subscriber {
                token,
                tx,
                heartbeat,
            });
        tracing::debug!(stream = %stream_id, token, "progress subscriber registered");

        Subscription {
            stream_id: stream_id.to_string(),
            token,
            rx,
            broker: self.clone(),
        }
    }

    /// Remove one subscriber. Idempotent; the stream entry is dropped once its
    /// last subscriber is gone.
    pub fn unsubscribe(&self, stream_id: &str, token: u64) {
        let mut streams = self.streams.lock().unwrap();
        if let Some(subs) = streams.get_mut(stream_id) {
            if let Some(pos) = subs.iter().position(|s| s.token == token) {
                let sub = subs.remove(pos);
                sub.heartbeat.abort();
                tracing::debug!(stream = %stream_id, token, "progress subscriber unregistered");
            }
            if subs.is_empty() {
                streams.remove(stream_id);
            }
        }
    }

    /// Fan `event` out to every subscriber registered under `stream_id`.
    ///
    /// A stream id with no subscribers is a silent no-op. A handle whose write
    /// fails (closed, or buffer full from a stalled consumer) is implicitly
    /// unsubscribed; delivery continues with the remaining handles.
    pub fn publish(&self, stream_id: &str, event: ProgressEvent) {
        let mut streams = self.streams.lock().unwrap();
        let Some(subs) = streams.get_mut(stream_id) else {
            return;
        };
        subs.retain(|sub| match sub.tx.try_send(Frame::Event(event.clone())) {
            Ok(()) => true,
            Err(_) => {
                sub.heartbeat.abort();
                tracing::debug!(
                    stream = %stream_id,
                    token = sub.token,
                    "dropping dead progress subscriber"
                );
                false
            }
        });
        if subs.is_empty() {
            streams.remove(stream_id);
        }
    }

    /// Number of live subscribers under `stream_id`.
    pub fn subscriber_count(&self, stream_id: &str) -> usize {
        self.streams
            .lock()
            .unwrap()
            .get(stream_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}

impl Default for ProgressBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription: the transport handle given to one reader.
///
/// Dropping the subscription unregisters it (transport close).
pub struct Subscription {
    stream_id: String,
    token: u64,
    rx: mpsc::Receiver<Frame>,
    broker: ProgressBroker,
}

impl Subscription {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Receive the next frame, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for draining.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Poll for the next frame; lets transports wrap the subscription in a
    /// `Stream` without the broker depending on a streams crate.
    pub fn poll_frame(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Frame>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broker.unsubscribe(&self.stream_id, self.token);
    }
}
