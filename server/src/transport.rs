//! Connection abstraction consumed by the session registry
//!
//! The registry never touches sockets. It hands encoded frames to a
//! [`Transport`] keyed by [`ConnectionId`], and the transport is free to
//! queue, buffer, or drop them. The WebSocket implementation lives in
//! [`crate::network`]; tests use [`RecordingTransport`].

use std::collections::{HashMap, HashSet};
use std::fmt;

/// Process-unique identifier assigned to a connection when it is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection {0} is not open")]
    UnknownConnection(ConnectionId),
    #[error("outbound queue for {0} is closed")]
    QueueClosed(ConnectionId),
}

/// Outbound half of the connection layer
///
/// Sends are fire-and-forget: an implementation must not block the caller
/// on network I/O.
pub trait Transport {
    /// Queues one text frame for a single connection.
    fn send(&mut self, conn: ConnectionId, payload: &str) -> Result<(), TransportError>;

    /// Drops a connection after any frames already queued for it.
    fn disconnect(&mut self, conn: ConnectionId);
}

/// In-memory transport that records everything the registry emits
#[derive(Debug, Default)]
pub struct RecordingTransport {
    open: HashSet<ConnectionId>,
    sent: HashMap<ConnectionId, Vec<String>>,
    disconnected: Vec<ConnectionId>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a connection as open so that sends to it succeed.
    pub fn open(&mut self, conn: ConnectionId) {
        self.open.insert(conn);
    }

    /// Returns and clears the frames sent to `conn`, including any sent
    /// before it was disconnected.
    pub fn take_sent(&mut self, conn: ConnectionId) -> Vec<String> {
        self.sent.remove(&conn).unwrap_or_default()
    }

    pub fn was_disconnected(&self, conn: ConnectionId) -> bool {
        self.disconnected.contains(&conn)
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, conn: ConnectionId, payload: &str) -> Result<(), TransportError> {
        if !self.open.contains(&conn) {
            return Err(TransportError::UnknownConnection(conn));
        }
        self.sent.entry(conn).or_default().push(payload.to_string());
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        if self.open.remove(&conn) {
            self.disconnected.push(conn);
        }
    }
}
