//! Session registry: tracks the live duplex connection of every peer.
//!
//! A peer has at most one registered connection. Opening a new one replaces
//! (and terminates) the previous connection; closing only removes the entry
//! if it still belongs to the connection being closed, so a late close from
//! a replaced connection cannot evict its successor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;
use futures::{Sink, SinkExt};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};

/// Peers are identified by the user id they connect with.
pub type PeerId = String;

/// One transport message waiting in a connection's outbox, plus the channel
/// on which the writer reports whether it reached the transport.
#[derive(Debug)]
pub struct OutboundMessage {
    pub payload: Bytes,
    pub ack: oneshot::Sender<Result<(), TransportError>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("write failed: {0}")]
    Write(String),
}

/// Cloneable handle on one registered connection.
#[derive(Clone)]
pub struct SessionHandle {
    peer_id: PeerId,
    connection_id: u64,
    outbox: mpsc::Sender<OutboundMessage>,
    /// Held for the duration of a multi-chunk send so frames never interleave.
    send_lock: Arc<Mutex<()>>,
    terminate: Arc<Notify>,
    established_at: Instant,
}

impl SessionHandle {
    pub fn new(peer_id: impl Into<PeerId>, connection_id: u64, outbox: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            peer_id: peer_id.into(),
            connection_id,
            outbox,
            send_lock: Arc::new(Mutex::new(())),
            terminate: Arc::new(Notify::new()),
            established_at: Instant::now(),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }

    pub(crate) fn send_lock(&self) -> &Mutex<()> {
        &self.send_lock
    }

    /// Queue one transport message and wait until the writer has handed it
    /// to the transport.
    pub async fn write(&self, payload: Bytes) -> Result<(), TransportError> {
        let (ack, done) = oneshot::channel();
        self.outbox
            .send(OutboundMessage { payload, ack })
            .await
            .map_err(|_| TransportError::Closed)?;
        done.await.map_err(|_| TransportError::Closed)?
    }

    /// Ask the connection owning this handle to shut down.
    pub fn terminate(&self) {
        self.terminate.notify_one();
    }

    /// Resolves once [`terminate`](Self::terminate) has been called.
    pub async fn terminated(&self) {
        self.terminate.notified().await;
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("peer_id", &self.peer_id)
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

/// Status view of one session.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub peer: PeerId,
    pub connection_id: u64,
    pub connected_secs: u64,
}

/// The session table, shared across all connection tasks.
pub struct SessionRegistry {
    sessions: DashMap<PeerId, SessionHandle>,
    next_connection: AtomicU64,
    outbox_capacity: usize,
}

impl SessionRegistry {
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_connection: AtomicU64::new(1),
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    /// Register a new connection for `peer_id`.
    ///
    /// Returns the handle and the outbox receiver that the connection's
    /// writer task must drain with [`drive_outbox`].
    pub fn open(&self, peer_id: &str) -> (SessionHandle, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let handle = SessionHandle::new(peer_id, connection_id, tx);

        if let Some(previous) = self.sessions.insert(peer_id.to_owned(), handle.clone()) {
            tracing::info!(
                peer = peer_id,
                replaced = previous.connection_id,
                connection = connection_id,
                "session replaced by new connection"
            );
            previous.terminate();
        } else {
            tracing::info!(peer = peer_id, connection = connection_id, "session opened");
        }
        (handle, rx)
    }

    /// Current handle for `peer_id`, if it has a live connection.
    pub fn get(&self, peer_id: &str) -> Option<SessionHandle> {
        self.sessions.get(peer_id).map(|entry| entry.value().clone())
    }

    /// Unregister `handle`. Returns `false` if the peer has since been taken
    /// over by another connection.
    pub fn close(&self, handle: &SessionHandle) -> bool {
        let removed = self
            .sessions
            .remove_if(&handle.peer_id, |_, current| {
                current.connection_id == handle.connection_id
            })
            .is_some();
        if removed {
            tracing::info!(peer = %handle.peer_id, connection = handle.connection_id, "session closed");
        }
        removed
    }

    /// Forcibly drop the session of `peer_id` and terminate its connection.
    pub fn remove(&self, peer_id: &str) -> Option<SessionHandle> {
        let (_, handle) = self.sessions.remove(peer_id)?;
        handle.terminate();
        tracing::info!(peer = peer_id, connection = handle.connection_id, "session removed");
        Some(handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions sorted by peer id.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| SessionInfo {
                peer: entry.key().clone(),
                connection_id: entry.connection_id,
                connected_secs: entry.established_at.elapsed().as_secs(),
            })
            .collect();
        sessions.sort_by(|a, b| a.peer.cmp(&b.peer));
        sessions
    }
}

/// Drain a connection's outbox into its transport sink, acknowledging every
/// message. Stops at the first write error; anything still queued is failed
/// with [`TransportError::Closed`].
pub async fn drive_outbox<S, E>(mut outbox: mpsc::Receiver<OutboundMessage>, mut sink: S)
where
    S: Sink<Bytes, Error = E> + Unpin,
    E: fmt::Display,
{
    while let Some(message) = outbox.recv().await {
        match sink.send(message.payload).await {
            Ok(()) => {
                let _ = message.ack.send(Ok(()));
            }
            Err(e) => {
                tracing::debug!(error = %e, "transport write failed");
                let _ = message.ack.send(Err(TransportError::Write(e.to_string())));
                break;
            }
        }
    }

    outbox.close();
    while let Ok(message) = outbox.try_recv() {
        let _ = message.ack.send(Err(TransportError::Closed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use futures::StreamExt;

    #[test]
    fn new_registry_is_empty() {
        let registry = SessionRegistry::new(8);
        assert!(registry.is_empty());
        assert!(registry.get("alice").is_none());
    }

    #[test]
    fn open_registers_and_close_removes() {
        let registry = SessionRegistry::new(8);
        let (handle, _rx) = registry.open("alice");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("alice").unwrap().connection_id(), handle.connection_id());

        assert!(registry.close(&handle));
        assert!(registry.is_empty());
        assert!(!registry.close(&handle));
    }

    #[tokio::test]
    async fn reopen_replaces_and_terminates_previous() {
        let registry = SessionRegistry::new(8);
        let (first, _rx1) = registry.open("alice");
        let (second, _rx2) = registry.open("alice");
        assert_ne!(first.connection_id(), second.connection_id());
        assert_eq!(registry.len(), 1);

        // The replaced connection is told to stop.
        tokio::time::timeout(std::time::Duration::from_secs(1), first.terminated())
            .await
            .expect("previous connection terminated");

        // Its late close must not evict the successor.
        assert!(!registry.close(&first));
        assert_eq!(registry.get("alice").unwrap().connection_id(), second.connection_id());
    }

    #[test]
    fn snapshot_is_sorted_by_peer() {
        let registry = SessionRegistry::new(8);
        let _b = registry.open("bob");
        let _a = registry.open("alice");
        let peers: Vec<_> = registry.snapshot().into_iter().map(|s| s.peer).collect();
        assert_eq!(peers, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn write_is_acknowledged_after_reaching_sink() {
        let registry = SessionRegistry::new(8);
        let (handle, rx) = registry.open("alice");
        let (sink, mut written) = fmpsc::unbounded::<Bytes>();
        tokio::spawn(drive_outbox(rx, sink));

        handle.write(Bytes::from_static(b"one")).await.unwrap();
        handle.write(Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(written.next().await.unwrap(), Bytes::from_static(b"one"));
        assert_eq!(written.next().await.unwrap(), Bytes::from_static(b"two"));
    }

    #[tokio::test]
    async fn write_fails_once_sink_is_gone() {
        let registry = SessionRegistry::new(8);
        let (handle, rx) = registry.open("alice");
        let (sink, written) = fmpsc::unbounded::<Bytes>();
        drop(written);
        let writer = tokio::spawn(drive_outbox(rx, sink));

        let err = handle.write(Bytes::from_static(b"lost")).await.unwrap_err();
        assert!(matches!(err, TransportError::Write(_)));

        writer.await.unwrap();
        assert!(handle.is_closed());
        assert_eq!(
            handle.write(Bytes::from_static(b"after")).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn remove_terminates_connection() {
        let registry = SessionRegistry::new(8);
        let (handle, _rx) = registry.open("alice");
        assert!(registry.remove("alice").is_some());
        assert!(registry.remove("alice").is_none());
        tokio::time::timeout(std::time::Duration::from_secs(1), handle.terminated())
            .await
            .expect("terminated");
    }
}
