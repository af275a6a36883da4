//! Outbound notifications to the global lobby.
//!
//! The lobby is an external collaborator: the room pushes denormalized room
//! and user-membership summaries and receives nothing back on this path.
//! Failures are retried with bounded exponential backoff and ultimately
//! dropped; a dropped notification is an `error.lobby.notify.failed`
//! telemetry event, never a room-state rollback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::instrumentation::{Telemetry, TelemetryEvent};
use crate::metrics::ServerMetrics;
use crate::protocol::{RoomStatus, UserId};
use crate::retry::{retry_with_backoff, RetryConfig};

/// Per-attempt deadline; exceeding it is a retry trigger.
const ATTEMPT_DEADLINE: Duration = Duration::from_secs(2);

/// Denormalized room summary pushed after any change to its fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatusSummary {
    pub status: RoomStatus,
    pub player_count: usize,
    pub host_id: UserId,
}

/// Membership transitions pushed to the lobby. "Disconnected" while the seat
/// is reserved; "left" only when the seat is actually released.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRoomEvent {
    Joined,
    Disconnected,
    Left,
}

#[derive(Debug, Clone, Error)]
pub enum LobbyNotifyError {
    #[error("lobby unavailable: {0}")]
    Unavailable(String),
    #[error("lobby call exceeded its deadline")]
    Timeout,
}

/// Transport to the lobby actor.
#[async_trait]
pub trait LobbyNotifier: Send + Sync {
    async fn notify_room_status(
        &self,
        room_code: &str,
        summary: RoomStatusSummary,
    ) -> Result<(), LobbyNotifyError>;

    async fn notify_user_room_status(
        &self,
        user_id: UserId,
        room_code: &str,
        event: UserRoomEvent,
    ) -> Result<(), LobbyNotifyError>;
}

/// Notifier that drops everything; used when no lobby is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLobbyNotifier;

#[async_trait]
impl LobbyNotifier for NoopLobbyNotifier {
    async fn notify_room_status(
        &self,
        _room_code: &str,
        _summary: RoomStatusSummary,
    ) -> Result<(), LobbyNotifyError> {
        Ok(())
    }

    async fn notify_user_room_status(
        &self,
        _user_id: UserId,
        _room_code: &str,
        _event: UserRoomEvent,
    ) -> Result<(), LobbyNotifyError> {
        Ok(())
    }
}

/// One notification as seen by a channel-backed lobby.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LobbyNotification {
    #[serde(rename_all = "camelCase")]
    RoomStatus {
        room_code: String,
        summary: RoomStatusSummary,
    },
    #[serde(rename_all = "camelCase")]
    UserRoomStatus {
        user_id: UserId,
        room_code: String,
        event: UserRoomEvent,
    },
}

/// Notifier that forwards over an mpsc channel to an in-process lobby actor
/// (also the test double: the receiver observes exactly what was sent).
#[derive(Debug, Clone)]
pub struct ChannelLobbyNotifier {
    tx: mpsc::Sender<LobbyNotification>,
}

impl ChannelLobbyNotifier {
    pub fn new(tx: mpsc::Sender<LobbyNotification>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl LobbyNotifier for ChannelLobbyNotifier {
    async fn notify_room_status(
        &self,
        room_code: &str,
        summary: RoomStatusSummary,
    ) -> Result<(), LobbyNotifyError> {
        self.tx
            .send(LobbyNotification::RoomStatus {
                room_code: room_code.to_string(),
                summary,
            })
            .await
            .map_err(|e| LobbyNotifyError::Unavailable(e.to_string()))
    }

    async fn notify_user_room_status(
        &self,
        user_id: UserId,
        room_code: &str,
        event: UserRoomEvent,
    ) -> Result<(), LobbyNotifyError> {
        self.tx
            .send(LobbyNotification::UserRoomStatus {
                user_id,
                room_code: room_code.to_string(),
                event,
            })
            .await
            .map_err(|e| LobbyNotifyError::Unavailable(e.to_string()))
    }
}

/// Fire-and-forget dispatcher wrapping a notifier with retry and telemetry.
///
/// Calls return immediately; delivery happens on a spawned task so a slow
/// lobby never blocks the room actor. Ordering with respect to state is
/// preserved because dispatch tasks are created after the state write and
/// the broadcasts.
#[derive(Clone)]
pub struct LobbyDispatcher {
    notifier: Arc<dyn LobbyNotifier>,
    retry: RetryConfig,
    telemetry: Arc<Telemetry>,
    metrics: Arc<ServerMetrics>,
}

impl LobbyDispatcher {
    pub fn new(
        notifier: Arc<dyn LobbyNotifier>,
        retry: RetryConfig,
        telemetry: Arc<Telemetry>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            notifier,
            retry,
            telemetry,
            metrics,
        }
    }

    pub fn room_status(&self, room_code: &str, summary: RoomStatusSummary) {
        let notifier = Arc::clone(&self.notifier);
        let room_code = room_code.to_string();
        self.dispatch("notify_room_status", move || {
            let notifier = Arc::clone(&notifier);
            let room_code = room_code.clone();
            let summary = summary.clone();
            async move { notifier.notify_room_status(&room_code, summary).await }
        });
    }

    pub fn user_room_status(&self, user_id: UserId, room_code: &str, event: UserRoomEvent) {
        let notifier = Arc::clone(&self.notifier);
        let room_code = room_code.to_string();
        self.dispatch("notify_user_room_status", move || {
            let notifier = Arc::clone(&notifier);
            let room_code = room_code.clone();
            async move { notifier.notify_user_room_status(user_id, &room_code, event).await }
        });
    }

    fn dispatch<F, Fut>(&self, operation: &'static str, call: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), LobbyNotifyError>> + Send,
    {
        ServerMetrics::increment(&self.metrics.lobby_notifications);
        let retry = self.retry.clone();
        let telemetry = Arc::clone(&self.telemetry);
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            let attempt = || async {
                match tokio::time::timeout(ATTEMPT_DEADLINE, call()).await {
                    Ok(result) => result,
                    Err(_) => Err(LobbyNotifyError::Timeout),
                }
            };
            if let Err((error, attempts)) = retry_with_backoff(&retry, operation, attempt).await {
                ServerMetrics::increment(&metrics.lobby_notify_failures);
                ServerMetrics::increment(&metrics.lobby_notify_dropped);
                telemetry.emit(&TelemetryEvent::ErrorLobbyNotifyFailed {
                    detail: format!("{operation}: {error}"),
                    attempts,
                });
            }
        });
    }
}
