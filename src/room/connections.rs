//! Live connection table and outbound socket sinks.
//!
//! Each WebSocket is pumped by a task outside the actor; the actor only
//! holds a bounded sender per socket. Sends never block a handler: a full
//! queue counts as a send failure and the pump eventually closes the socket.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use tokio::sync::mpsc;

use crate::protocol::{ConnectionId, Role, SocketAttachment, UserId};

/// Close code for spectators evicted by room abandonment.
pub const CLOSE_GAME_ABANDONED: u16 = 1000;
/// Close code for authentication failures at accept time.
pub const CLOSE_AUTH_FAILED: u16 = 1008;
/// Close code when the room cannot admit the socket.
pub const CLOSE_ROOM_FULL: u16 = 1013;

/// Typical room size used for stack-allocated recipient sets.
pub const TYPICAL_ROOM_SIZE: usize = 8;

/// What the actor pushes to a socket pump.
#[derive(Debug, Clone)]
pub enum SocketOutput {
    /// A pre-serialized frame shared across all recipients of a broadcast
    Frame(Bytes),
    Close { code: u16, reason: String },
}

/// Handle to one socket's outbound queue.
#[derive(Debug, Clone)]
pub struct OutboundSink {
    tx: mpsc::Sender<SocketOutput>,
}

impl OutboundSink {
    pub fn new(tx: mpsc::Sender<SocketOutput>) -> Self {
        Self { tx }
    }

    /// Queue a frame; a full or closed queue is a failure, not a block.
    pub fn try_send_frame(&self, frame: Bytes) -> Result<(), SendFailure> {
        self.tx.try_send(SocketOutput::Frame(frame)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendFailure::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendFailure::Closed,
        })
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.tx.try_send(SocketOutput::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    QueueFull,
    Closed,
}

impl std::fmt::Display for SendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendFailure::QueueFull => f.write_str("outbound queue full"),
            SendFailure::Closed => f.write_str("socket closed"),
        }
    }
}

/// One accepted socket as the actor sees it.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub sink: OutboundSink,
    pub attachment: SocketAttachment,
    /// Runtime tag used by broadcast targeting: `player:<code>` or
    /// `spectator:<code>`
    pub tag: String,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Volatile socket index. Not persisted: after a wake the pump re-presents
/// each socket's attachment and the table refills.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    entries: std::collections::HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, connection_id: ConnectionId, entry: ConnectionEntry) {
        self.entries.insert(connection_id, entry);
    }

    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<ConnectionEntry> {
        self.entries.remove(&connection_id)
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&ConnectionEntry> {
        self.entries.get(&connection_id)
    }

    pub fn get_mut(&mut self, connection_id: ConnectionId) -> Option<&mut ConnectionEntry> {
        self.entries.get_mut(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConnectionId, &ConnectionEntry)> {
        self.entries.iter()
    }

    /// Live player-role sockets; the pause controller's census.
    pub fn connected_player_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.attachment.role == Role::Player)
            .count()
    }

    pub fn spectator_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.attachment.role == Role::Spectator)
            .count()
    }

    /// Whether a user has any live player socket.
    pub fn user_has_player_socket(&self, user_id: UserId) -> bool {
        self.entries
            .values()
            .any(|e| e.attachment.user_id == user_id && e.attachment.role == Role::Player)
    }

    /// Connection ids whose tag matches, sorted for deterministic fanout.
    pub fn ids_with_tag(&self, tag: &str) -> SmallVec<[ConnectionId; TYPICAL_ROOM_SIZE]> {
        let mut ids: SmallVec<[ConnectionId; TYPICAL_ROOM_SIZE]> = self
            .entries
            .iter()
            .filter(|(_, e)| e.tag == tag)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn all_ids(&self) -> SmallVec<[ConnectionId; TYPICAL_ROOM_SIZE]> {
        let mut ids: SmallVec<[ConnectionId; TYPICAL_ROOM_SIZE]> =
            self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn ids_for_user(&self, user_id: UserId) -> SmallVec<[ConnectionId; TYPICAL_ROOM_SIZE]> {
        let mut ids: SmallVec<[ConnectionId; TYPICAL_ROOM_SIZE]> = self
            .entries
            .iter()
            .filter(|(_, e)| e.attachment.user_id == user_id)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn entry(user_id: UserId, role: Role, tag: &str) -> (ConnectionEntry, mpsc::Receiver<SocketOutput>) {
        let (tx, rx) = mpsc::channel(4);
        let now = Utc::now();
        (
            ConnectionEntry {
                sink: OutboundSink::new(tx),
                attachment: SocketAttachment {
                    user_id,
                    display_name: "p".to_string(),
                    role,
                },
                tag: tag.to_string(),
                connected_at: now,
                last_seen: now,
            },
            rx,
        )
    }

    #[test]
    fn player_census_counts_only_players() {
        let mut table = ConnectionTable::new();
        let (player, _rx1) = entry(Uuid::new_v4(), Role::Player, "player:AB23CD");
        let (spectator, _rx2) = entry(Uuid::new_v4(), Role::Spectator, "spectator:AB23CD");
        table.insert(Uuid::new_v4(), player);
        table.insert(Uuid::new_v4(), spectator);

        assert_eq!(table.connected_player_count(), 1);
        assert_eq!(table.spectator_count(), 1);
        assert_eq!(table.ids_with_tag("player:AB23CD").len(), 1);
        assert_eq!(table.all_ids().len(), 2);
    }

    #[test]
    fn sink_reports_queue_pressure() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = OutboundSink::new(tx);
        sink.try_send_frame(Bytes::from_static(b"one")).unwrap();
        assert_eq!(
            sink.try_send_frame(Bytes::from_static(b"two")),
            Err(SendFailure::QueueFull)
        );
        rx.close();
        assert_eq!(
            sink.try_send_frame(Bytes::from_static(b"three")),
            Err(SendFailure::Closed)
        );
    }

    #[test]
    fn user_socket_lookup() {
        let mut table = ConnectionTable::new();
        let user = Uuid::new_v4();
        let (player, _rx) = entry(user, Role::Player, "player:AB23CD");
        let id = Uuid::new_v4();
        table.insert(id, player);

        assert!(table.user_has_player_socket(user));
        assert!(!table.user_has_player_socket(Uuid::new_v4()));
        assert_eq!(table.ids_for_user(user), SmallVec::<[ConnectionId; 8]>::from_slice(&[id]));
    }
}
