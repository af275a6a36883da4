//! Typed alarm dispatch.
//!
//! When the runtime slot fires, the actor drains every due entry in
//! due-time order and dispatches each to its handler. A handler that fails
//! to decode its payload is reported and skipped; the rest of the batch
//! still runs.

use chrono::{DateTime, Utc};

use super::{RoomActor, Targeting};
use crate::alarm::{AlarmEntry, AlarmKind};
use crate::instrumentation::TelemetryEvent;
use crate::lobby::UserRoomEvent;
use crate::metrics::ServerMetrics;
use crate::protocol::{InviteId, InviteStatus, RoomStatus, SeatReleaseCause, ServerEvent, UserId};
use crate::storage::StorageKey;

impl RoomActor {
    /// Entry point for the runtime alarm. Drains and dispatches every due
    /// entry, then the queue has already re-armed the slot for the rest.
    pub async fn handle_alarm_fired(&mut self) {
        self.telemetry().begin_request(None, None);
        let now = self.deps_clock_now();
        let due = match self.alarms_mut().drain_due(now).await {
            Ok(due) => due,
            Err(e) => {
                self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                    key: StorageKey::AlarmQueue,
                    detail: e.to_string(),
                });
                return;
            }
        };

        for entry in due {
            if self.is_retired() {
                break;
            }
            self.dispatch_alarm(entry).await;
        }
    }

    async fn dispatch_alarm(&mut self, entry: AlarmEntry) {
        match entry.kind {
            AlarmKind::SeatExpiration => match decode_user(&entry) {
                Some(user_id) => self.on_seat_expiration(user_id).await,
                None => self.report_bad_payload(&entry),
            },
            AlarmKind::PauseDebounce => self.on_pause_debounce().await,
            AlarmKind::PauseTimeout => self.on_pause_timeout().await,
            AlarmKind::TurnTimeout => match decode_user(&entry) {
                Some(user_id) => self.on_turn_timeout(user_id).await,
                None => self.report_bad_payload(&entry),
            },
            AlarmKind::InviteExpiration => match decode_invite(&entry) {
                Some(invite_id) => self.on_invite_expiration(invite_id).await,
                None => self.report_bad_payload(&entry),
            },
            AlarmKind::TypingExpiry => match decode_user(&entry) {
                Some(user_id) => self.on_typing_expiry(user_id).await,
                None => self.report_bad_payload(&entry),
            },
        }
    }

    fn report_bad_payload(&self, entry: &AlarmEntry) {
        self.telemetry().emit(&TelemetryEvent::ErrorAlarmDispatchFailed {
            kind: entry.kind.as_str().to_string(),
            detail: format!("undecodable payload: {}", entry.payload),
        });
    }

    // ---------------------------------------------------------------------
    // Scheduling helpers
    // ---------------------------------------------------------------------

    pub(crate) async fn schedule_seat_expiration(
        &mut self,
        user_id: UserId,
        deadline: DateTime<Utc>,
    ) -> Result<(), crate::storage::StorageError> {
        // One expiration per seat: replace any stale entry for this user
        self.alarms_mut()
            .cancel_where(|e| {
                e.kind == AlarmKind::SeatExpiration && e.payload["userId"] == serde_json::json!(user_id)
            })
            .await?;
        self.alarms_mut()
            .schedule(
                AlarmKind::SeatExpiration,
                deadline,
                serde_json::json!({ "userId": user_id }),
            )
            .await?;
        Ok(())
    }

    /// Replace the running turn timer with one for the current player.
    pub(crate) async fn reschedule_turn_timeout(&mut self) {
        let current = self.game_state().and_then(|g| g.current_player());
        if let Err(e) = self
            .alarms_mut()
            .cancel_where(|e| e.kind == AlarmKind::TurnTimeout)
            .await
        {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::AlarmQueue,
                detail: e.to_string(),
            });
            return;
        }
        let Some(user_id) = current else {
            return;
        };
        if self.status() != RoomStatus::Playing {
            return;
        }
        let due = self.now_plus_ms(self.settings().turn_timeout_ms);
        if let Err(e) = self
            .alarms_mut()
            .schedule(AlarmKind::TurnTimeout, due, serde_json::json!({ "userId": user_id }))
            .await
        {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::AlarmQueue,
                detail: e.to_string(),
            });
        }
    }

    pub(crate) async fn cancel_typing_alarm(&mut self, user_id: UserId) {
        if let Err(e) = self
            .alarms_mut()
            .cancel_where(|e| {
                e.kind == AlarmKind::TypingExpiry && e.payload["userId"] == serde_json::json!(user_id)
            })
            .await
        {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::AlarmQueue,
                detail: e.to_string(),
            });
        }
    }

    // ---------------------------------------------------------------------
    // Typed handlers
    // ---------------------------------------------------------------------

    /// A reserved seat's reclaim window closed without a reconnect.
    async fn on_seat_expiration(&mut self, user_id: UserId) {
        let now = self.deps_clock_now();
        let still_expired = self
            .seat_registry()
            .get(user_id)
            .is_some_and(|s| !s.is_connected && s.reconnect_deadline.is_some_and(|d| d <= now));
        if !still_expired {
            return;
        }
        ServerMetrics::increment(&self.metrics().seats_expired);
        self.release_seat(user_id, SeatReleaseCause::Timeout).await;
    }

    /// Shared seat-release path for timeout, voluntary leave, and kicks.
    pub(crate) async fn release_seat(&mut self, user_id: UserId, cause: SeatReleaseCause) {
        let Some(seat) = self.seats_mut().release(user_id) else {
            return;
        };
        self.telemetry().emit(&TelemetryEvent::SeatRelease {
            seat_user_id: user_id,
            cause: format!("{cause:?}").to_lowercase(),
        });
        if let Err(e) = self.persist_seats().await {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::Seats,
                detail: e.to_string(),
            });
        }

        self.broadcast(ServerEvent::PlayerLeft { user_id, cause }, Targeting::AllInRoom);
        // The seat is actually gone now: this is "left", not "disconnected"
        if !seat.is_ai {
            let code = self.room_code().to_string();
            self.lobby_dispatch()
                .user_room_status(user_id, &code, UserRoomEvent::Left);
        }

        self.transfer_host_if_needed(user_id).await;

        // The game engine decides whether the survivors play on
        if matches!(self.status(), RoomStatus::Playing | RoomStatus::Paused) {
            let now = self.deps_clock_now();
            let next = self.game_mut().map(|game| game.remove_player(user_id, now));
            if next.is_some() {
                if let Err(e) = self.persist_game().await {
                    self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                        key: StorageKey::Game,
                        detail: e.to_string(),
                    });
                }
            }
            match next {
                Some(None) => {
                    // Nobody left in the game at all
                    self.abandon_room("no players remain in the game").await;
                    return;
                }
                Some(Some(next_player)) => {
                    if self.game_state().is_some_and(crate::game::GameState::is_complete) {
                        self.finish_game().await;
                    } else {
                        self.begin_turn(next_player).await;
                        self.drive_ai_turns().await;
                    }
                }
                None => {}
            }
        }

        if self.status() == RoomStatus::Waiting && self.seat_registry().human_count() == 0 {
            self.abandon_room("no human seats remain").await;
            return;
        }

        self.notify_room_status();
    }

    /// The current player's turn clock ran out; an external policy decides
    /// what happens to the turn.
    async fn on_turn_timeout(&mut self, user_id: UserId) {
        if self.status() != RoomStatus::Playing {
            return;
        }
        let is_current = self
            .game_state()
            .and_then(crate::game::GameState::current_player)
            == Some(user_id);
        if !is_current {
            // Stale timer from a turn that already ended
            return;
        }
        self.run_timeout_policy(user_id).await;
    }

    /// A pending invite aged out.
    async fn on_invite_expiration(&mut self, invite_id: InviteId) {
        let Some(invite) = self.invites_mut().resolve(invite_id, InviteStatus::Expired) else {
            return;
        };
        if let Err(e) = self.persist_invites().await {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::Invites,
                detail: e.to_string(),
            });
        }
        self.telemetry().emit(&TelemetryEvent::InviteResolve {
            invite_id: invite.invite_id.to_string(),
            status: "expired".to_string(),
        });
        self.broadcast(ServerEvent::InviteExpired { invite_id }, Targeting::AllInRoom);
    }

    /// Typing debounce: a client that never sent TYPING_STOP goes quiet.
    async fn on_typing_expiry(&mut self, user_id: UserId) {
        if self.typing_mut().stop(user_id) {
            self.broadcast_typing();
        }
    }
}

fn decode_user(entry: &AlarmEntry) -> Option<UserId> {
    serde_json::from_value(entry.payload.get("userId")?.clone()).ok()
}

fn decode_invite(entry: &AlarmEntry) -> Option<InviteId> {
    serde_json::from_value(entry.payload.get("inviteId")?.clone()).ok()
}
