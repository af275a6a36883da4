//! Pause/abandon controller.
//!
//! Runs after every player disconnect. A mid-game room with zero connected
//! players is not paused immediately: a short debounce alarm absorbs
//! simultaneous refreshes of every tab. Only if the recount at debounce
//! time still finds nobody does the room pause; a pause that nobody
//! returns from becomes an abandonment.

use super::{RoomActor, Targeting};
use crate::alarm::AlarmKind;
use crate::instrumentation::TelemetryEvent;
use crate::lobby::UserRoomEvent;
use crate::metrics::ServerMetrics;
use crate::protocol::{RoomStatus, SeatReleaseCause, ServerEvent};
use crate::room::connections::CLOSE_GAME_ABANDONED;
use crate::storage::StorageKey;

impl RoomActor {
    /// Step 1 of the procedure: called after every disconnect.
    pub(crate) async fn after_player_disconnect(&mut self) {
        if self.connection_table().connected_player_count() > 0 {
            return;
        }
        if self.status() != RoomStatus::Playing {
            // A waiting room with no seats left simply dissolves
            if self.status() == RoomStatus::Waiting && self.seat_holders_all_gone() {
                self.abandon_room("everyone left the waiting room").await;
            }
            return;
        }
        // Do not pause yet; give refreshing tabs a moment to come back
        if self.alarm_queue().count_kind(AlarmKind::PauseDebounce) == 0 {
            let due = self.now_plus_ms(self.config().room.pause_debounce_ms);
            if let Err(e) = self
                .alarms_mut()
                .schedule(AlarmKind::PauseDebounce, due, serde_json::json!({}))
                .await
            {
                self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                    key: StorageKey::AlarmQueue,
                    detail: e.to_string(),
                });
            }
        }
    }

    /// Debounce fired: recount and pause only if the room is still empty.
    pub(crate) async fn on_pause_debounce(&mut self) {
        if self.status() != RoomStatus::Playing {
            return;
        }
        if self.connection_table().connected_player_count() > 0 {
            return;
        }

        match self.transition_status(RoomStatus::Paused).await {
            Ok(true) => {}
            _ => return,
        }
        let paused_at = self
            .room_record()
            .and_then(|r| r.paused_at)
            .unwrap_or_else(|| self.deps_clock_now());
        let abandon_deadline = self.now_plus_ms(self.config().room.pause_timeout_ms);
        if let Err(e) = self
            .alarms_mut()
            .schedule(AlarmKind::PauseTimeout, abandon_deadline, serde_json::json!({}))
            .await
        {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::AlarmQueue,
                detail: e.to_string(),
            });
        }

        self.broadcast(
            ServerEvent::GamePaused {
                paused_at,
                abandon_deadline,
            },
            Targeting::AllInRoom,
        );
        self.notify_room_status();
    }

    /// A player reconnected; a paused room comes back to life.
    pub(crate) async fn resume_if_paused(&mut self) {
        if self.status() != RoomStatus::Paused {
            return;
        }
        match self.transition_status(RoomStatus::Playing).await {
            Ok(true) => {}
            _ => return,
        }
        if let Err(e) = self
            .alarms_mut()
            .cancel_where(|e| e.kind == AlarmKind::PauseTimeout)
            .await
        {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::AlarmQueue,
                detail: e.to_string(),
            });
        }
        self.broadcast(ServerEvent::GameResumed, Targeting::AllInRoom);
        // The paused turn gets a fresh timeout window
        self.reschedule_turn_timeout().await;
        self.notify_room_status();
    }

    /// Pause timeout elapsed with nobody back: the room is gone.
    pub(crate) async fn on_pause_timeout(&mut self) {
        if self.status() != RoomStatus::Paused {
            return;
        }
        self.abandon_room("pause timeout elapsed").await;
    }

    /// Terminal teardown: release every seat, evict spectators, clear
    /// storage, and retire the actor.
    pub(crate) async fn abandon_room(&mut self, reason: &str) {
        tracing::info!(room_code = %self.room_code(), reason, "Abandoning room");
        let _ = self.transition_status(RoomStatus::Abandoned).await;

        let seated: Vec<_> = self.seat_registry().iter().cloned().collect();
        for seat in seated {
            self.release_seat_silently(seat.user_id).await;
            if !seat.is_ai {
                self.lobby_dispatch()
                    .user_room_status(seat.user_id, &self.room_code().to_string(), UserRoomEvent::Left);
            }
        }

        // Anyone still attached is evicted with the canonical close frame
        for (_, entry) in self.connection_table().iter() {
            entry.sink.close(CLOSE_GAME_ABANDONED, "game abandoned");
        }

        if let Err(e) = self.alarms_mut().cancel_where(|_| true).await {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::AlarmQueue,
                detail: e.to_string(),
            });
        }

        self.notify_room_status();
        self.clear_storage().await;
        ServerMetrics::increment(&self.metrics().rooms_abandoned);
        self.mark_retired();
    }

    /// Release a seat without the PLAYER_LEFT broadcast (teardown path).
    async fn release_seat_silently(&mut self, user_id: crate::protocol::UserId) {
        if self.seats_mut().release(user_id).is_some() {
            self.telemetry().emit(&TelemetryEvent::SeatRelease {
                seat_user_id: user_id,
                cause: format!("{:?}", SeatReleaseCause::Timeout).to_lowercase(),
            });
        }
    }

    fn seat_holders_all_gone(&self) -> bool {
        self.seat_registry().iter().all(|s| s.is_ai || !s.is_connected)
            && self.seat_registry().human_count() == 0
    }

    async fn clear_storage(&self) {
        for key in StorageKey::ALL {
            if let Err(e) = self.storage_handle().delete(key).await {
                self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                    key,
                    detail: e.to_string(),
                });
            }
        }
    }
}
