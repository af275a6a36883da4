//! The per-room session actor.
//!
//! One actor per room code, driven by an mpsc mailbox. The mailbox is the
//! serialization point: every handler runs to completion before the next is
//! dispatched, so there is no shared-memory concurrency inside a room. All
//! durable state is flushed through the storage facade before a handler
//! returns; the actor may be retired (hibernated) between events and
//! rehydrated from storage on the next one.

mod alarms;
mod broadcast;
mod chat;
mod commands;
mod connections;
mod invites;
mod pause;
mod rate_limit;
mod seats;

pub use broadcast::Targeting;
pub use commands::CommandError;
pub use connections::{
    ConnectionEntry, ConnectionTable, OutboundSink, SocketOutput, CLOSE_AUTH_FAILED,
    CLOSE_GAME_ABANDONED, CLOSE_ROOM_FULL,
};
pub use seats::{SeatError, SeatRegistry};

use chat::{ChatLog, TypingState};
use invites::InviteBook;
use rate_limit::CommandRateLimiter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::alarm::{AlarmDriver, AlarmQueue};
use crate::clock::Clock;
use crate::config::Config;
use crate::game::{AiPolicy, DiceRoller, GameState, TurnTimeoutPolicy};
use crate::instrumentation::{Telemetry, TelemetryEvent};
use crate::lobby::{LobbyDispatcher, LobbyNotifier, RoomStatusSummary, UserRoomEvent};
use crate::metrics::ServerMetrics;
use crate::protocol::messages::GameSnapshot;
use crate::protocol::{
    ConnectedPayload, ConnectionId, ErrorCode, InviteId, PendingInvite, ReclaimOutcome,
    ReclaimRejectReason, Role, RoomRecord, RoomSettings, RoomStatus, Seat, ServerEvent,
    SocketAttachment, UserId,
};
use crate::retry::RetryConfig;
use crate::storage::{RoomStorage, StorageBackend, StorageError, StorageKey};

/// Events delivered to a room actor's mailbox.
#[derive(Debug)]
pub enum RoomEvent {
    /// A validated socket asks to enter the room; the reply carries the
    /// resolved role or the rejection the transport should close with.
    SocketOpened {
        connection_id: ConnectionId,
        user_id: UserId,
        display_name: String,
        sink: OutboundSink,
        reply: oneshot::Sender<Result<Role, ErrorCode>>,
    },
    /// Raw text frame from a socket, with the pump's attachment.
    ClientFrame {
        connection_id: ConnectionId,
        attachment: SocketAttachment,
        text: String,
    },
    /// The socket closed (any code; unclean closes look the same).
    SocketClosed {
        connection_id: ConnectionId,
        code: u16,
    },
    /// The runtime alarm slot fired.
    AlarmFired,
    /// Invite answer relayed from the lobby.
    InviteAnswer {
        invite_id: InviteId,
        user_id: UserId,
        display_name: String,
        accept: bool,
    },
}

/// Shared dependencies injected into every room actor.
#[derive(Clone)]
pub struct RoomDeps {
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<ServerMetrics>,
    pub lobby: Arc<dyn LobbyNotifier>,
    pub lobby_retry: RetryConfig,
    pub roller: Arc<dyn DiceRoller>,
    pub ai_policy: Arc<dyn AiPolicy>,
    pub timeout_policy: Arc<dyn TurnTimeoutPolicy>,
}

/// Persisted chat shape under the `chat` key.
#[derive(serde::Serialize, serde::Deserialize, Default)]
struct PersistedChat {
    messages: Vec<crate::protocol::ChatMessageRecord>,
}

/// The room actor. Owns the authoritative state for one room code.
pub struct RoomActor {
    code: String,
    deps: RoomDeps,
    storage: RoomStorage,
    alarms: AlarmQueue,
    telemetry: Arc<Telemetry>,
    lobby: LobbyDispatcher,

    // Authoritative state, mirrored in storage
    room: Option<RoomRecord>,
    seats: SeatRegistry,
    game: Option<GameState>,
    chat: ChatLog,
    typing: TypingState,
    invites: InviteBook,

    // Volatile; rebuilt as sockets re-present their attachments
    connections: ConnectionTable,
    rate: CommandRateLimiter,

    /// Set once the room is abandoned; the run loop exits and the hub
    /// forgets the actor.
    retired: bool,
}

impl RoomActor {
    /// Rebuild the actor from storage. Called on first contact and after
    /// every hibernation; never assumes in-memory context from a prior
    /// incarnation.
    pub async fn hydrate(
        code: String,
        deps: RoomDeps,
        backend: Arc<dyn StorageBackend>,
        driver: Arc<dyn AlarmDriver>,
    ) -> Result<Self, StorageError> {
        let telemetry = Arc::new(Telemetry::for_room(code.clone()));
        telemetry.begin_request(None, None);
        let storage = RoomStorage::new(backend, Arc::clone(&telemetry), Arc::clone(&deps.metrics));

        let room: Option<RoomRecord> = storage.get_opt(StorageKey::Room).await?;
        let seats: Vec<Seat> = storage.get_opt(StorageKey::Seats).await?.unwrap_or_default();
        let game: Option<GameState> = storage.get_opt(StorageKey::Game).await?;
        let chat: PersistedChat = match storage.get_opt(StorageKey::Chat).await {
            Ok(chat) => chat.unwrap_or_default(),
            // Chat is a non-critical key; a corrupt backlog resets
            Err(e) => {
                telemetry.emit(&TelemetryEvent::ErrorStateCorruption {
                    key: StorageKey::Chat,
                    detail: e.to_string(),
                });
                PersistedChat::default()
            }
        };
        let invites: HashMap<InviteId, PendingInvite> =
            storage.get_opt(StorageKey::Invites).await?.unwrap_or_default();

        let alarms = AlarmQueue::load(
            storage.clone(),
            driver,
            Arc::clone(&telemetry),
            Arc::clone(&deps.metrics),
        )
        .await?;

        let hydrated_keys = usize::from(room.is_some())
            + usize::from(!seats.is_empty())
            + usize::from(game.is_some())
            + usize::from(!chat.messages.is_empty())
            + usize::from(!invites.is_empty())
            + usize::from(!alarms.is_empty());
        telemetry.emit(&TelemetryEvent::LifecycleWake { hydrated_keys });
        ServerMetrics::increment(&deps.metrics.rooms_hydrated);

        let lobby = LobbyDispatcher::new(
            Arc::clone(&deps.lobby),
            deps.lobby_retry.clone(),
            Arc::clone(&telemetry),
            Arc::clone(&deps.metrics),
        );

        let max_chat = deps.config.room.max_chat_messages;
        let rate = CommandRateLimiter::new(deps.config.rate_limit.clone());

        Ok(Self {
            code,
            storage,
            alarms,
            telemetry,
            lobby,
            room,
            seats: SeatRegistry::from_seats(seats),
            game,
            chat: ChatLog::from_messages(chat.messages, max_chat),
            typing: TypingState::new(),
            invites: InviteBook::from_map(invites),
            connections: ConnectionTable::new(),
            rate,
            retired: false,
            deps,
        })
    }

    /// Drive the actor until cancellation, mailbox closure, abandonment, or
    /// an idle period with zero sockets (hibernation).
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<RoomEvent>,
        cancel: CancellationToken,
        on_exit: impl FnOnce(),
    ) {
        let idle = Duration::from_secs(self.deps.config.hub.actor_idle_retire_secs.max(1));
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                received = tokio::time::timeout(idle, rx.recv()) => match received {
                    Ok(Some(event)) => {
                        self.dispatch(event).await;
                        if self.retired {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(_elapsed) => {
                        if self.connections.is_empty() {
                            // Hibernate: storage holds everything we need
                            break;
                        }
                    }
                },
            }
        }
        ServerMetrics::increment(&self.deps.metrics.rooms_retired);
        on_exit();
    }

    async fn dispatch(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::SocketOpened {
                connection_id,
                user_id,
                display_name,
                sink,
                reply,
            } => {
                let result = self
                    .handle_socket_opened(connection_id, user_id, display_name, sink)
                    .await;
                let _ = reply.send(result);
            }
            RoomEvent::ClientFrame {
                connection_id,
                attachment,
                text,
            } => {
                self.handle_client_frame(connection_id, &attachment, &text).await;
            }
            RoomEvent::SocketClosed { connection_id, code } => {
                self.handle_socket_closed(connection_id, code).await;
            }
            RoomEvent::AlarmFired => {
                self.handle_alarm_fired().await;
            }
            RoomEvent::InviteAnswer {
                invite_id,
                user_id,
                display_name,
                accept,
            } => {
                self.handle_invite_answer(invite_id, user_id, &display_name, accept).await;
            }
        }
    }

    // ---------------------------------------------------------------------
    // Socket lifecycle
    // ---------------------------------------------------------------------

    /// Admit a validated socket: create the room on first contact, resolve
    /// the role (reclaim, fresh seat, spectator, or reject), and send the
    /// CONNECTED snapshot.
    pub async fn handle_socket_opened(
        &mut self,
        connection_id: ConnectionId,
        user_id: UserId,
        display_name: String,
        sink: OutboundSink,
    ) -> Result<Role, ErrorCode> {
        self.telemetry.begin_request(None, Some(user_id));
        let now = self.deps.clock.now();

        if self.room.is_none() {
            let settings = RoomSettings {
                max_players: self.deps.config.room.max_players,
                turn_timeout_ms: self.deps.config.room.turn_timeout_ms,
                ..RoomSettings::default()
            };
            let record = RoomRecord::new(self.code.clone(), user_id, settings, now);
            self.room = Some(record);
            self.persist_room().await.map_err(|_| ErrorCode::Internal)?;
            ServerMetrics::increment(&self.deps.metrics.rooms_created);
            tracing::info!(room_code = %self.code, host = %user_id, "Room created");
        }

        let status = self.status();
        if status == RoomStatus::Abandoned {
            return Err(ErrorCode::InvalidState);
        }

        // Resolve the role
        let (role, reconnected) = if self.seats.get(user_id).is_some() {
            self.try_reclaim(user_id, now).await?
        } else if status == RoomStatus::Waiting && !self.seat_capacity_reached() {
            self.take_fresh_seat(user_id, display_name.clone(), now).await?;
            (Role::Player, false)
        } else if self.spectators_admissible() {
            (Role::Spectator, false)
        } else {
            return Err(ErrorCode::RoomFull);
        };

        let tag = match role {
            Role::Player => format!("player:{}", self.code),
            _ => format!("spectator:{}", self.code),
        };
        self.connections.insert(
            connection_id,
            ConnectionEntry {
                sink,
                attachment: SocketAttachment {
                    user_id,
                    display_name: display_name.clone(),
                    role,
                },
                tag,
                connected_at: now,
                last_seen: now,
            },
        );
        ServerMetrics::increment(&self.deps.metrics.total_connections);
        ServerMetrics::increment(&self.deps.metrics.active_connections);

        if reconnected {
            self.telemetry.emit(&TelemetryEvent::LifecycleReconnect {
                connection_id: connection_id.to_string(),
            });
        } else {
            self.telemetry.emit(&TelemetryEvent::LifecycleConnect {
                connection_id: connection_id.to_string(),
                role: format!("{role:?}").to_lowercase(),
            });
        }

        // Snapshot goes to the new socket only
        let snapshot = self.connected_payload(user_id, role);
        self.broadcast(
            ServerEvent::Connected(Box::new(snapshot)),
            Targeting::SingleConnection(connection_id),
        );

        if reconnected {
            self.broadcast(
                ServerEvent::PlayerReconnected { user_id },
                Targeting::AllInRoom,
            );
            ServerMetrics::increment(&self.deps.metrics.seats_reclaimed);
            self.lobby
                .user_room_status(user_id, &self.code, UserRoomEvent::Joined);
            // A player returning to a paused room resumes it
            self.resume_if_paused().await;
        }

        Ok(role)
    }

    /// Reclaim path for a user who already holds a seat.
    async fn try_reclaim(
        &mut self,
        user_id: UserId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(Role, bool), ErrorCode> {
        self.telemetry
            .emit(&TelemetryEvent::SeatReclaimAttempt { seat_user_id: user_id });

        // A seat can read "connected" with no live socket after a crash or
        // wake; reattach without a deadline check in that case.
        let stale_connected = self
            .seats
            .get(user_id)
            .is_some_and(|s| s.is_connected && !s.is_ai)
            && !self.connections.user_has_player_socket(user_id);

        let outcome = if stale_connected {
            self.seats.force_reconnect(user_id);
            ReclaimOutcome::Reclaimed
        } else {
            self.seats.reclaim(user_id, now)
        };

        match outcome {
            ReclaimOutcome::Reclaimed => {
                self.alarms
                    .cancel_where(|e| {
                        e.kind == crate::alarm::AlarmKind::SeatExpiration
                            && e.payload["userId"] == serde_json::json!(user_id)
                    })
                    .await
                    .map_err(|_| ErrorCode::Internal)?;
                self.persist_seats().await.map_err(|_| ErrorCode::Internal)?;
                self.telemetry.emit(&TelemetryEvent::SeatReclaimResult {
                    seat_user_id: user_id,
                    outcome: "reclaimed".to_string(),
                });
                Ok((Role::Player, true))
            }
            ReclaimOutcome::Spectator(reason) => {
                self.telemetry.emit(&TelemetryEvent::SeatReclaimResult {
                    seat_user_id: user_id,
                    outcome: match reason {
                        ReclaimRejectReason::NoSeat => "no_seat",
                        ReclaimRejectReason::DeadlinePassed => "deadline_passed",
                        ReclaimRejectReason::SeatTaken => "seat_taken",
                    }
                    .to_string(),
                });
                if self.spectators_admissible() {
                    Ok((Role::Spectator, false))
                } else {
                    Err(ErrorCode::RoomFull)
                }
            }
        }
    }

    async fn take_fresh_seat(
        &mut self,
        user_id: UserId,
        display_name: String,
        _now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), ErrorCode> {
        let max_players = self.settings().max_players;
        let turn_order = self
            .seats
            .assign(user_id, display_name, max_players, false, None)
            .map_err(|e| match e {
                SeatError::RoomFull => ErrorCode::RoomFull,
                SeatError::AlreadySeated => ErrorCode::AlreadySeated,
            })?;

        self.persist_seats().await.map_err(|_| ErrorCode::Internal)?;
        ServerMetrics::increment(&self.deps.metrics.seats_assigned);
        self.telemetry.emit(&TelemetryEvent::SeatAssign {
            seat_user_id: user_id,
            turn_order,
        });

        let host_id = self.host_id();
        if let Some(seat) = self.seats.get(user_id) {
            let player = crate::protocol::PlayerSummary::from_seat(seat, host_id);
            self.broadcast(ServerEvent::PlayerJoined { player }, Targeting::AllInRoom);
        }
        self.lobby
            .user_room_status(user_id, &self.code, UserRoomEvent::Joined);
        self.notify_room_status();
        Ok(())
    }

    /// Socket closed, cleanly or not. Refresh and permanent leave are
    /// indistinguishable here: the seat is always reserved and the reclaim
    /// window plus pause controller converge on the truth.
    pub async fn handle_socket_closed(&mut self, connection_id: ConnectionId, code: u16) {
        let Some(entry) = self.connections.remove(connection_id) else {
            return;
        };
        let user_id = entry.attachment.user_id;
        self.telemetry.begin_request(None, Some(user_id));
        self.telemetry.emit(&TelemetryEvent::LifecycleDisconnect {
            connection_id: connection_id.to_string(),
            code,
        });
        ServerMetrics::decrement(&self.deps.metrics.active_connections);
        ServerMetrics::increment(&self.deps.metrics.disconnections);

        // Typing flags never outlive the socket
        if self.typing.stop(user_id) {
            self.cancel_typing_alarm(user_id).await;
            self.broadcast_typing();
        }

        if entry.attachment.role == Role::Player
            && !self.connections.user_has_player_socket(user_id)
        {
            self.rate.forget(user_id);
            if self.seats.get(user_id).is_some() {
                let now = self.deps.clock.now();
                let deadline = now
                    + chrono::Duration::milliseconds(
                        self.deps.config.room.reclaim_window_ms as i64,
                    );
                self.seats.mark_disconnected(user_id, deadline);
                let scheduled = self.schedule_seat_expiration(user_id, deadline).await;
                let persisted = self.persist_seats().await;
                if let Err(e) = scheduled.and(persisted) {
                    self.telemetry.emit(&TelemetryEvent::ErrorStorageFailed {
                        key: StorageKey::Seats,
                        detail: e.to_string(),
                    });
                }
                self.telemetry.emit(&TelemetryEvent::SeatReserve {
                    seat_user_id: user_id,
                    deadline,
                });
                self.broadcast(
                    ServerEvent::PlayerDisconnected {
                        user_id,
                        reconnect_deadline: deadline,
                    },
                    Targeting::AllInRoom,
                );
                // Seat still reserved: the lobby sees "disconnected", not "left"
                self.lobby
                    .user_room_status(user_id, &self.code, UserRoomEvent::Disconnected);
            }
            self.after_player_disconnect().await;
        }
    }

    // ---------------------------------------------------------------------
    // Shared helpers
    // ---------------------------------------------------------------------

    pub(crate) fn status(&self) -> RoomStatus {
        self.room.as_ref().map_or(RoomStatus::Waiting, |r| r.status)
    }

    pub(crate) fn host_id(&self) -> UserId {
        self.room.as_ref().map_or_else(uuid::Uuid::nil, |r| r.host_id)
    }

    pub(crate) fn settings(&self) -> RoomSettings {
        self.room
            .as_ref()
            .map_or_else(RoomSettings::default, |r| r.settings.clone())
    }

    fn seat_capacity_reached(&self) -> bool {
        self.seats.len() >= usize::from(self.settings().max_players)
    }

    fn spectators_admissible(&self) -> bool {
        self.settings().spectators_allowed
            && self.connections.spectator_count() < self.deps.config.room.max_spectators
    }

    /// Legal-transition gate with telemetry. Returns false (and emits a
    /// rejection event) when the edge is not in the lifecycle diagram.
    pub(crate) async fn transition_status(&mut self, to: RoomStatus) -> Result<bool, StorageError> {
        let Some(room) = self.room.as_mut() else {
            return Ok(false);
        };
        let from = room.status;
        if !from.can_transition_to(to) {
            self.telemetry.emit(&TelemetryEvent::StateTransitionRejected {
                from: from.to_string(),
                attempted: to.to_string(),
            });
            return Ok(false);
        }

        room.status = to;
        let now = self.deps.clock.now();
        match to {
            RoomStatus::Paused => room.paused_at = Some(now),
            RoomStatus::Playing => {
                room.paused_at = None;
                if room.started_at.is_none() {
                    room.started_at = Some(now);
                }
            }
            RoomStatus::Waiting => {
                room.paused_at = None;
                room.started_at = None;
            }
            _ => room.paused_at = None,
        }

        self.persist_room().await?;
        self.telemetry.emit(&TelemetryEvent::StateTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(true)
    }

    pub(crate) async fn persist_room(&self) -> Result<(), StorageError> {
        match &self.room {
            Some(room) => self.storage.put(StorageKey::Room, room).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn persist_seats(&self) -> Result<(), StorageError> {
        self.storage.put(StorageKey::Seats, &self.seats.to_vec()).await
    }

    pub(crate) async fn persist_game(&self) -> Result<(), StorageError> {
        match &self.game {
            Some(game) => self.storage.put(StorageKey::Game, game).await,
            None => {
                self.storage.delete(StorageKey::Game).await?;
                Ok(())
            }
        }
    }

    /// Chat is a non-critical path: failures are logged and swallowed.
    pub(crate) async fn persist_chat(&self) {
        let persisted = PersistedChat {
            messages: self.chat.backlog(),
        };
        if let Err(e) = self.storage.put(StorageKey::Chat, &persisted).await {
            self.telemetry.emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::Chat,
                detail: e.to_string(),
            });
        }
    }

    pub(crate) async fn persist_invites(&self) -> Result<(), StorageError> {
        self.storage.put(StorageKey::Invites, &self.invites.to_map()).await
    }

    pub(crate) fn notify_room_status(&self) {
        if let Some(room) = &self.room {
            self.lobby.room_status(
                &self.code,
                RoomStatusSummary {
                    status: room.status,
                    player_count: self.seats.len(),
                    host_id: room.host_id,
                },
            );
        }
    }

    /// Initial snapshot for a newly-accepted socket.
    fn connected_payload(&self, user_id: UserId, role: Role) -> ConnectedPayload {
        let host_id = self.host_id();
        let players = self.seats.summaries(host_id);
        let ai_players = players.iter().filter(|p| p.is_ai).cloned().collect();
        ConnectedPayload {
            room_code: self.code.clone(),
            status: self.status(),
            host_id,
            players,
            ai_players,
            your_user_id: user_id,
            your_role: role,
            game: self.game.as_ref().map(game_snapshot),
            chat: self.chat.backlog(),
        }
    }

    /// Hand the host role to the earliest remaining human when the host's
    /// seat is released. Abandons the room when no one is left to hold it.
    pub(crate) async fn transfer_host_if_needed(&mut self, departed: UserId) {
        let Some(room) = self.room.as_ref() else {
            return;
        };
        if room.host_id != departed {
            return;
        }
        if let Some(next_host) = self.seats.next_host_candidate(departed) {
            if let Some(room) = self.room.as_mut() {
                room.host_id = next_host;
            }
            if let Err(e) = self.persist_room().await {
                self.telemetry.emit(&TelemetryEvent::ErrorStorageFailed {
                    key: StorageKey::Room,
                    detail: e.to_string(),
                });
            }
            tracing::info!(room_code = %self.code, new_host = %next_host, "Host role transferred");
            self.notify_room_status();
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub(crate) fn metrics(&self) -> &ServerMetrics {
        &self.deps.metrics
    }

    pub(crate) fn config(&self) -> &Config {
        &self.deps.config
    }

    pub(crate) fn deps_clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        self.deps.clock.now()
    }

    pub(crate) fn now_plus_ms(&self, millis: u64) -> chrono::DateTime<chrono::Utc> {
        self.deps.clock.now() + chrono::Duration::milliseconds(millis as i64)
    }

    pub(crate) fn alarms_mut(&mut self) -> &mut AlarmQueue {
        &mut self.alarms
    }

    pub(crate) fn seats_mut(&mut self) -> &mut SeatRegistry {
        &mut self.seats
    }

    pub(crate) fn game_mut(&mut self) -> Option<&mut GameState> {
        self.game.as_mut()
    }

    pub(crate) fn set_game(&mut self, game: Option<GameState>) {
        self.game = game;
    }

    pub(crate) fn chat_mut(&mut self) -> &mut ChatLog {
        &mut self.chat
    }

    pub(crate) fn typing_mut(&mut self) -> &mut TypingState {
        &mut self.typing
    }

    pub(crate) fn typing_state(&self) -> &TypingState {
        &self.typing
    }

    pub(crate) fn invites_mut(&mut self) -> &mut InviteBook {
        &mut self.invites
    }

    pub(crate) fn invites_book(&self) -> &InviteBook {
        &self.invites
    }

    pub(crate) fn lobby_dispatch(&self) -> &LobbyDispatcher {
        &self.lobby
    }

    pub(crate) fn storage_handle(&self) -> &RoomStorage {
        &self.storage
    }

    pub(crate) fn roller(&self) -> Arc<dyn DiceRoller> {
        Arc::clone(&self.deps.roller)
    }

    pub(crate) fn ai_policy(&self) -> Arc<dyn AiPolicy> {
        Arc::clone(&self.deps.ai_policy)
    }

    pub(crate) fn timeout_policy(&self) -> Arc<dyn TurnTimeoutPolicy> {
        Arc::clone(&self.deps.timeout_policy)
    }

    pub(crate) fn mark_retired(&mut self) {
        self.retired = true;
    }

    // ---------------------------------------------------------------------
    // Test and hub visibility
    // ---------------------------------------------------------------------

    pub fn room_code(&self) -> &str {
        &self.code
    }

    pub fn room_record(&self) -> Option<&RoomRecord> {
        self.room.as_ref()
    }

    pub fn seat_registry(&self) -> &SeatRegistry {
        &self.seats
    }

    pub fn game_state(&self) -> Option<&GameState> {
        self.game.as_ref()
    }

    pub fn alarm_queue(&self) -> &AlarmQueue {
        &self.alarms
    }

    pub fn connection_table(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn chat_backlog(&self) -> Vec<crate::protocol::ChatMessageRecord> {
        self.chat.backlog()
    }

    pub fn invite_count(&self) -> usize {
        self.invites.len()
    }

    pub fn pending_invites(&self) -> Vec<PendingInvite> {
        self.invites.to_map().into_values().collect()
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }
}

/// Wire view of the live game.
pub(crate) fn game_snapshot(game: &GameState) -> GameSnapshot {
    GameSnapshot {
        turn_index: game.turn_index,
        current_user_id: game.current_player(),
        roll_number: game.roll_number,
        dice: game.dice,
        kept: game.kept,
        scorecards: game
            .scorecards
            .iter()
            .map(|(&id, card)| (id, card.view()))
            .collect(),
        turn_started_at: game.turn_started_at,
    }
}
