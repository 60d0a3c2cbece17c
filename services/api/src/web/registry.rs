//! services/api/src/web/registry.rs
//!
//! The session-keyed listener registry that fans events out to every live
//! push-stream and socket attached to a generation session.
//!
//! Delivery is best effort. A listener whose send fails is dropped from the
//! registry; the producer and the other listeners carry on.

use crate::web::protocol::Event;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

//=========================================================================================
// Listener Sinks
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("listener has gone away")]
    Closed,
    #[error("send failed: {0}")]
    Send(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown session: {0}")]
    UnknownSession(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Anything that can receive a session's events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: &Event) -> Result<(), TransportError>;
}

/// A sink backed by an unbounded channel. The receiving half is drained by the
/// SSE response stream or the WebSocket writer; dropping it closes the sink.
///
/// Sends never wait; `attach` relies on this while it holds the session lock.
pub struct ChannelSink(mpsc::UnboundedSender<Event>);

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<Event>) -> Self {
        Self(sender)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&self, event: &Event) -> Result<(), TransportError> {
        self.0
            .send(event.clone())
            .map_err(|_| TransportError::Closed)
    }
}

//=========================================================================================
// The Registry
//=========================================================================================

pub type ListenerId = u64;

struct Listener {
    id: ListenerId,
    sink: Arc<dyn EventSink>,
}

#[derive(Default)]
struct SessionChannel {
    listeners: Vec<Listener>,
    // Everything broadcast so far; replayed to late listeners.
    history: Vec<Event>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<String, Arc<Mutex<SessionChannel>>>>,
    next_listener: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session. Opening an already-open session is a no-op.
    pub async fn open(&self, session_id: &str) {
        self.sessions
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default();
        debug!("Session {} opened.", session_id);
    }

    /// Tears a session down, dropping all of its listeners.
    pub async fn close(&self, session_id: &str) {
        if self.sessions.lock().await.remove(session_id).is_some() {
            info!("Session {} closed.", session_id);
        }
    }

    pub async fn is_open(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains_key(session_id)
    }

    async fn channel(&self, session_id: &str) -> Option<Arc<Mutex<SessionChannel>>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Adds a listener to an open session.
    ///
    /// Events already broadcast on the session are replayed to the new listener
    /// first, so every listener sees the run from sequence 1 without gaps.
    pub async fn attach(
        &self,
        session_id: &str,
        sink: Arc<dyn EventSink>,
    ) -> Result<ListenerId, RegistryError> {
        let channel = self
            .channel(session_id)
            .await
            .ok_or_else(|| RegistryError::UnknownSession(session_id.to_string()))?;

        let mut channel = channel.lock().await;
        for event in &channel.history {
            sink.send(event).await?;
        }

        let id = self.next_listener.fetch_add(1, Ordering::Relaxed) + 1;
        channel.listeners.push(Listener { id, sink });
        info!(
            "Listener {} attached to session {} ({} total).",
            id,
            session_id,
            channel.listeners.len()
        );
        Ok(id)
    }

    pub async fn detach(&self, session_id: &str, listener: ListenerId) {
        if let Some(channel) = self.channel(session_id).await {
            channel.lock().await.listeners.retain(|l| l.id != listener);
            debug!("Listener {} detached from session {}.", listener, session_id);
        }
    }

    pub async fn listener_count(&self, session_id: &str) -> usize {
        match self.channel(session_id).await {
            Some(channel) => channel.lock().await.listeners.len(),
            None => 0,
        }
    }

    /// Sends `event` to every listener of the session and returns how many received it.
    ///
    /// Iterates over a snapshot of the listener set; failed listeners are removed
    /// afterwards by id.
    pub async fn broadcast(&self, session_id: &str, event: &Event) -> usize {
        let Some(channel) = self.channel(session_id).await else {
            warn!(
                "Dropping '{}' event for unknown session {}.",
                event.kind.as_str(),
                session_id
            );
            return 0;
        };

        let snapshot: Vec<(ListenerId, Arc<dyn EventSink>)> = {
            let mut channel = channel.lock().await;
            channel.history.push(event.clone());
            channel
                .listeners
                .iter()
                .map(|l| (l.id, l.sink.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sink) in snapshot {
            match sink.send(event).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        "Removing listener {} from session {}: {}",
                        id, session_id, e
                    );
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            channel
                .lock()
                .await
                .listeners
                .retain(|l| !dead.contains(&l.id));
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CollectingSink;
    use crate::web::protocol::EventType;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct BrokenSink;

    #[async_trait]
    impl EventSink for BrokenSink {
        async fn send(&self, _: &Event) -> Result<(), TransportError> {
            Err(TransportError::Send("connection reset".into()))
        }
    }

    /// Detaches itself from the registry while a broadcast is in flight.
    struct SelfRemovingSink {
        registry: Arc<ConnectionRegistry>,
        session: String,
        id: StdMutex<Option<ListenerId>>,
        received: StdMutex<usize>,
    }

    #[async_trait]
    impl EventSink for SelfRemovingSink {
        async fn send(&self, _: &Event) -> Result<(), TransportError> {
            *self.received.lock().unwrap() += 1;
            let id = *self.id.lock().unwrap();
            if let Some(id) = id {
                self.registry.detach(&self.session, id).await;
            }
            Ok(())
        }
    }

    fn event(sequence: u64) -> Event {
        Event::new(EventType::Text, json!({ "n": sequence }), sequence)
    }

    #[tokio::test]
    async fn dead_listeners_are_dropped_without_affecting_others() {
        let registry = ConnectionRegistry::new();
        registry.open("s").await;
        let healthy = Arc::new(CollectingSink::default());
        registry.attach("s", healthy.clone()).await.unwrap();
        registry.attach("s", Arc::new(BrokenSink)).await.unwrap();
        assert_eq!(registry.listener_count("s").await, 2);

        assert_eq!(registry.broadcast("s", &event(1)).await, 1);
        assert_eq!(registry.listener_count("s").await, 1);

        assert_eq!(registry.broadcast("s", &event(2)).await, 1);
        assert_eq!(healthy.sequences(), vec![1, 2]);
    }

    #[tokio::test]
    async fn broadcast_iterates_a_snapshot() {
        let registry = Arc::new(ConnectionRegistry::new());
        registry.open("s").await;

        let leaver = Arc::new(SelfRemovingSink {
            registry: registry.clone(),
            session: "s".into(),
            id: StdMutex::new(None),
            received: StdMutex::new(0),
        });
        let id = registry.attach("s", leaver.clone()).await.unwrap();
        *leaver.id.lock().unwrap() = Some(id);
        let stayer = Arc::new(CollectingSink::default());
        registry.attach("s", stayer.clone()).await.unwrap();

        assert_eq!(registry.broadcast("s", &event(1)).await, 2);
        assert_eq!(registry.broadcast("s", &event(2)).await, 1);

        assert_eq!(*leaver.received.lock().unwrap(), 1);
        assert_eq!(stayer.sequences(), vec![1, 2]);
    }

    #[tokio::test]
    async fn late_listeners_get_the_history_replayed() {
        let registry = ConnectionRegistry::new();
        registry.open("s").await;
        registry.broadcast("s", &event(1)).await;
        registry.broadcast("s", &event(2)).await;

        let late = Arc::new(CollectingSink::default());
        registry.attach("s", late.clone()).await.unwrap();
        registry.broadcast("s", &event(3)).await;

        assert_eq!(late.sequences(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn attach_requires_an_open_session() {
        let registry = ConnectionRegistry::new();
        let result = registry
            .attach("missing", Arc::new(CollectingSink::default()))
            .await;
        assert!(matches!(result, Err(RegistryError::UnknownSession(_))));

        registry.open("s").await;
        registry.close("s").await;
        assert!(!registry.is_open("s").await);
        assert_eq!(registry.broadcast("s", &event(1)).await, 0);
    }

    #[tokio::test]
    async fn channel_sink_closes_with_its_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        assert!(sink.send(&event(1)).await.is_ok());
        drop(rx);
        assert!(matches!(
            sink.send(&event(2)).await,
            Err(TransportError::Closed)
        ));
    }
}
