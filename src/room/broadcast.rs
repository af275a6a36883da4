//! Server-event fanout.
//!
//! Every event is serialized exactly once into a shared `Bytes` buffer and
//! cloned (refcount only) per recipient. The recipient set is resolved from
//! the connection tags; per-socket send failures are counted, reported, and
//! never abort the fanout. The in-flight request's correlation id rides on
//! the frame so a client can trace every event back to the command that
//! caused it.

use bytes::Bytes;
use smallvec::SmallVec;

use super::connections::TYPICAL_ROOM_SIZE;
use super::RoomActor;
use crate::instrumentation::TelemetryEvent;
use crate::metrics::ServerMetrics;
use crate::protocol::{ConnectionId, ServerEvent, ServerFrame, UserId};

/// Resolves a server event to a concrete set of sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Targeting {
    AllInRoom,
    PlayersOnly,
    SpectatorsOnly,
    SingleUser(UserId),
    SingleConnection(ConnectionId),
}

impl RoomActor {
    /// Fan an event out to the targeted sockets. Returns (delivered, failed).
    pub(crate) fn broadcast(&self, event: ServerEvent, targeting: Targeting) -> (usize, usize) {
        let event_type = event.type_name();
        let recipients = self.resolve_targets(targeting);

        self.telemetry().emit(&TelemetryEvent::BroadcastPrepare {
            event_type: event_type.to_string(),
            recipients: recipients.len(),
        });
        if recipients.is_empty() {
            self.telemetry().emit(&TelemetryEvent::BroadcastSent {
                event_type: event_type.to_string(),
                delivered: 0,
                failed: 0,
            });
            return (0, 0);
        }

        let frame = ServerFrame::new(event, self.telemetry().current_correlation());
        let bytes = match serde_json::to_vec(&frame) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                self.telemetry().emit(&TelemetryEvent::ErrorBroadcastFailed {
                    event_type: event_type.to_string(),
                    detail: format!("serialize: {e}"),
                });
                return (0, recipients.len());
            }
        };

        let mut delivered = 0usize;
        let mut failed = 0usize;
        for connection_id in &recipients {
            let Some(entry) = self.connection_table().get(*connection_id) else {
                continue;
            };
            // The socket may close between targeting and send; a failure
            // here only affects this recipient
            match entry.sink.try_send_frame(bytes.clone()) {
                Ok(()) => delivered += 1,
                Err(failure) => {
                    failed += 1;
                    ServerMetrics::increment(&self.metrics().broadcast_send_failures);
                    self.telemetry().emit(&TelemetryEvent::ErrorBroadcastFailed {
                        event_type: event_type.to_string(),
                        detail: format!("{connection_id}: {failure}"),
                    });
                }
            }
        }

        ServerMetrics::increment(&self.metrics().broadcasts_sent);
        self.telemetry().emit(&TelemetryEvent::BroadcastSent {
            event_type: event_type.to_string(),
            delivered,
            failed,
        });
        (delivered, failed)
    }

    /// Convenience for ERROR frames back to the originating socket.
    pub(crate) fn send_error(
        &self,
        connection_id: ConnectionId,
        code: crate::protocol::ErrorCode,
        message: impl Into<String>,
    ) {
        self.broadcast(
            ServerEvent::Error {
                code,
                message: message.into(),
            },
            Targeting::SingleConnection(connection_id),
        );
    }

    fn resolve_targets(&self, targeting: Targeting) -> SmallVec<[ConnectionId; TYPICAL_ROOM_SIZE]> {
        let table = self.connection_table();
        match targeting {
            Targeting::AllInRoom => table.all_ids(),
            Targeting::PlayersOnly => table.ids_with_tag(&format!("player:{}", self.room_code())),
            Targeting::SpectatorsOnly => {
                table.ids_with_tag(&format!("spectator:{}", self.room_code()))
            }
            Targeting::SingleUser(user_id) => table.ids_for_user(user_id),
            Targeting::SingleConnection(connection_id) => {
                if table.get(connection_id).is_some() {
                    SmallVec::from_slice(&[connection_id])
                } else {
                    SmallVec::new()
                }
            }
        }
    }
}
