//! Inbound command dispatch.
//!
//! A raw frame is parsed, stamped with a request context (propagating the
//! client's correlation id), budgeted, role-checked, and routed. Rejections
//! answer the originating socket with an ERROR frame and change no state.

use super::rate_limit::CommandClass;
use super::{game_snapshot, RoomActor, Targeting};
use crate::alarm::AlarmKind;
use crate::game::{
    Category, GameError, GameState, ScoreResult, TimeoutAction, TurnView,
};
use crate::instrumentation::TelemetryEvent;
use crate::lobby::UserRoomEvent;
use crate::metrics::ServerMetrics;
use crate::protocol::messages::FinalStanding;
use crate::protocol::{
    validation, ClientCommand, ClientEnvelope, ConnectionId, ErrorCode, InviteId, InviteStatus,
    PlayerSummary, QuickChatKey, ReactionAction, RoomStatus, ServerEvent, ServerFrame,
    SocketAttachment, UserId,
};
use crate::room::seats::SeatError;
use crate::storage::{StorageError, StorageKey};

/// A rejected command: the code goes on the wire, the message explains it.
#[derive(Debug, Clone)]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.description().to_string(),
        }
    }
}

impl From<GameError> for CommandError {
    fn from(error: GameError) -> Self {
        let code = match error {
            GameError::NotYourTurn => ErrorCode::NotYourTurn,
            GameError::RollLimit => ErrorCode::RollLimit,
            GameError::NoRollYet | GameError::GameComplete => ErrorCode::InvalidState,
            GameError::CategoryUnavailable => ErrorCode::CategoryUnavailable,
            GameError::UnknownPlayer => ErrorCode::NotInRoom,
        };
        Self::new(code, error.to_string())
    }
}

impl From<SeatError> for CommandError {
    fn from(error: SeatError) -> Self {
        let code = match error {
            SeatError::RoomFull => ErrorCode::RoomFull,
            SeatError::AlreadySeated => ErrorCode::AlreadySeated,
        };
        Self::new(code, error.to_string())
    }
}

impl From<StorageError> for CommandError {
    fn from(error: StorageError) -> Self {
        Self::new(ErrorCode::Internal, error.to_string())
    }
}

impl RoomActor {
    /// One inbound frame from one socket.
    pub async fn handle_client_frame(
        &mut self,
        connection_id: ConnectionId,
        attachment: &SocketAttachment,
        text: &str,
    ) {
        let envelope: ClientEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.telemetry().begin_request(None, Some(attachment.user_id));
                self.send_error(
                    connection_id,
                    ErrorCode::InvalidPayload,
                    format!("unparseable frame: {e}"),
                );
                return;
            }
        };

        let now = self.deps.clock.now();
        if let Some(entry) = self.connections.get_mut(connection_id) {
            entry.last_seen = now;
        }

        // PING stays out of the event log entirely
        if matches!(envelope.command, ClientCommand::Ping) {
            self.send_direct(connection_id, ServerEvent::Pong, envelope.correlation_id);
            return;
        }

        self.telemetry()
            .begin_request(envelope.correlation_id.clone(), Some(attachment.user_id));
        ServerMetrics::increment(&self.metrics().commands_handled);

        let class = match envelope.command {
            ClientCommand::Chat { .. }
            | ClientCommand::QuickChat { .. }
            | ClientCommand::Reaction { .. }
            | ClientCommand::TypingStart
            | ClientCommand::TypingStop => CommandClass::Chat,
            _ => CommandClass::Command,
        };
        if !self.rate.check(attachment.user_id, class, now) {
            ServerMetrics::increment(&self.metrics().rate_limit_rejections);
            self.send_error(connection_id, ErrorCode::RateLimit, ErrorCode::RateLimit.description());
            return;
        }

        let result = self.dispatch_command(connection_id, attachment, envelope.command).await;
        if let Err(error) = result {
            ServerMetrics::increment(&self.metrics().commands_rejected);
            self.send_error(connection_id, error.code, error.message);
        }
    }

    async fn dispatch_command(
        &mut self,
        connection_id: ConnectionId,
        attachment: &SocketAttachment,
        command: ClientCommand,
    ) -> Result<(), CommandError> {
        let user_id = attachment.user_id;
        match command {
            ClientCommand::StartGame => self.cmd_start_game(user_id).await,
            ClientCommand::DiceRoll { kept } => self.cmd_dice_roll(user_id, kept).await,
            ClientCommand::CategoryScore { category } => {
                self.cmd_category_score(user_id, category).await
            }
            ClientCommand::Rematch => self.cmd_rematch(user_id).await,
            ClientCommand::AddAiPlayer { profile_id } => {
                self.cmd_add_ai_player(user_id, profile_id).await
            }
            ClientCommand::RemoveAiPlayer { player_id } => {
                self.cmd_remove_ai_player(user_id, player_id).await
            }
            ClientCommand::SendInvite { target_user_id } => {
                self.cmd_send_invite(user_id, target_user_id).await
            }
            ClientCommand::CancelInvite { invite_id } => {
                self.cmd_cancel_invite(user_id, invite_id).await
            }
            ClientCommand::Chat { content } => {
                self.cmd_chat(attachment, content).await
            }
            ClientCommand::QuickChat { key } => self.cmd_quick_chat(attachment, key).await,
            ClientCommand::Reaction {
                message_id,
                emoji,
                action,
            } => self.cmd_reaction(connection_id, message_id, emoji, action).await,
            ClientCommand::TypingStart => self.cmd_typing(user_id, true).await,
            ClientCommand::TypingStop => self.cmd_typing(user_id, false).await,
            ClientCommand::Ping => Ok(()),
        }
    }

    // ---------------------------------------------------------------------
    // Game commands
    // ---------------------------------------------------------------------

    async fn cmd_start_game(&mut self, user_id: UserId) -> Result<(), CommandError> {
        self.require_host(user_id)?;
        if self.status() != RoomStatus::Waiting {
            return Err(CommandError::code(ErrorCode::InvalidState));
        }
        if self.seat_registry().len() < 2 {
            return Err(CommandError::new(
                ErrorCode::InvalidState,
                "at least 2 players are needed to start",
            ));
        }

        // Leaving the waiting phase kills outstanding invites
        self.cancel_all_invites().await;

        if !self.transition_status(RoomStatus::Starting).await? {
            return Err(CommandError::code(ErrorCode::InvalidState));
        }
        let countdown_ms = self.config().room.game_start_countdown_ms;
        self.broadcast(ServerEvent::GameStarting { countdown_ms }, Targeting::AllInRoom);

        let turn_order: Vec<UserId> = self
            .seat_registry()
            .in_turn_order()
            .into_iter()
            .map(|s| s.user_id)
            .collect();
        let now = self.deps_clock_now();
        let game = GameState::new(turn_order, now);
        let first_player = game.current_player();
        self.set_game(Some(game));
        self.persist_game().await?;

        if !self.transition_status(RoomStatus::Playing).await? {
            return Err(CommandError::code(ErrorCode::Internal));
        }

        ServerMetrics::increment(&self.metrics().games_started);
        self.telemetry().emit(&TelemetryEvent::GameStart {
            players: self.seat_registry().len(),
        });

        if let Some(game) = self.game_state() {
            self.broadcast(
                ServerEvent::GameStarted {
                    game: Box::new(game_snapshot(game)),
                },
                Targeting::AllInRoom,
            );
        }
        self.notify_room_status();

        if let Some(first) = first_player {
            self.begin_turn(first).await;
        }
        self.drive_ai_turns().await;
        Ok(())
    }

    async fn cmd_dice_roll(&mut self, user_id: UserId, kept: [bool; 5]) -> Result<(), CommandError> {
        self.require_playing()?;
        self.require_seat(user_id)?;
        self.apply_roll(user_id, kept).await?;
        Ok(())
    }

    /// Shared roll path for players, AI seats, and forced timeout rolls.
    pub(crate) async fn apply_roll(
        &mut self,
        user_id: UserId,
        kept: [bool; 5],
    ) -> Result<(), CommandError> {
        let roller = self.roller();
        let game = self.game_mut().ok_or_else(|| CommandError::code(ErrorCode::InvalidState))?;
        let result = game.roll(user_id, kept, roller.as_ref())?;
        // Persist before anyone hears about the roll
        self.persist_game().await?;

        self.telemetry().emit(&TelemetryEvent::GameRoll {
            turn_user_id: user_id,
            roll_number: result.roll_number,
        });
        self.broadcast(
            ServerEvent::DiceRolled {
                user_id,
                dice: result.dice,
                kept: result.kept,
                roll_number: result.roll_number,
            },
            Targeting::AllInRoom,
        );
        Ok(())
    }

    async fn cmd_category_score(
        &mut self,
        user_id: UserId,
        category: Category,
    ) -> Result<(), CommandError> {
        self.require_playing()?;
        self.require_seat(user_id)?;
        self.score_current_turn(user_id, category).await?;
        self.drive_ai_turns().await;
        Ok(())
    }

    /// Score the current dice and advance the game. Used by the command
    /// path, AI turns, and the turn-timeout policy alike.
    pub(crate) async fn score_current_turn(
        &mut self,
        user_id: UserId,
        category: Category,
    ) -> Result<ScoreResult, CommandError> {
        let now = self.deps_clock_now();
        let game = self.game_mut().ok_or_else(|| CommandError::code(ErrorCode::InvalidState))?;
        let result = game.score(user_id, category, now)?;
        let scorecard = game
            .scorecard(user_id)
            .map(crate::game::Scorecard::view)
            .unwrap_or_else(|| crate::game::Scorecard::new().view());
        self.persist_game().await?;

        self.telemetry().emit(&TelemetryEvent::GameScore {
            turn_user_id: user_id,
            category: format!("{category:?}"),
            points: result.points,
        });
        self.broadcast(
            ServerEvent::CategoryScored {
                user_id,
                category,
                points: result.points,
                scorecard,
            },
            Targeting::AllInRoom,
        );

        if result.game_complete {
            self.finish_game().await;
        } else if let Some(next) = result.next_player {
            self.begin_turn(next).await;
        }
        Ok(result)
    }

    /// Announce a turn and arm its timeout. Does not drive AI; callers do.
    pub(crate) async fn begin_turn(&mut self, user_id: UserId) {
        let turn_index = self.game_state().map_or(0, |g| g.turn_index);
        self.telemetry().emit(&TelemetryEvent::GameTurnStart {
            turn_user_id: user_id,
            turn_index,
        });
        self.reschedule_turn_timeout().await;
        let turn_deadline = self
            .alarm_queue()
            .iter()
            .find(|e| e.kind == AlarmKind::TurnTimeout)
            .map(|e| e.due_at);
        self.broadcast(
            ServerEvent::TurnStarted {
                user_id,
                turn_index,
                turn_deadline,
            },
            Targeting::AllInRoom,
        );
    }

    /// Completed game teardown: final standings, status flip, timer cleanup.
    pub(crate) async fn finish_game(&mut self) {
        if let Err(e) = self
            .alarms_mut()
            .cancel_where(|e| e.kind == AlarmKind::TurnTimeout)
            .await
        {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::AlarmQueue,
                detail: e.to_string(),
            });
        }
        let _ = self.transition_status(RoomStatus::Completed).await;

        let names: std::collections::HashMap<UserId, String> = self
            .seat_registry()
            .iter()
            .map(|s| (s.user_id, s.display_name.clone()))
            .collect();
        let standings: Vec<FinalStanding> = self
            .game_state()
            .map(GameState::standings)
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, (user_id, total))| FinalStanding {
                user_id,
                display_name: names.get(&user_id).cloned().unwrap_or_default(),
                total,
                rank: i as u32 + 1,
            })
            .collect();

        ServerMetrics::increment(&self.metrics().games_completed);
        self.telemetry().emit(&TelemetryEvent::GameComplete {
            winner_user_id: standings.first().map(|s| s.user_id),
        });
        self.broadcast(ServerEvent::GameOver { standings }, Targeting::AllInRoom);
        self.notify_room_status();
    }

    async fn cmd_rematch(&mut self, user_id: UserId) -> Result<(), CommandError> {
        self.require_host(user_id)?;
        if self.status() != RoomStatus::Completed {
            return Err(CommandError::code(ErrorCode::InvalidState));
        }
        self.set_game(None);
        self.persist_game().await?;
        if !self.transition_status(RoomStatus::Waiting).await? {
            return Err(CommandError::code(ErrorCode::InvalidState));
        }
        self.broadcast(ServerEvent::RematchStarted, Targeting::AllInRoom);
        self.notify_room_status();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // AI seats
    // ---------------------------------------------------------------------

    async fn cmd_add_ai_player(
        &mut self,
        user_id: UserId,
        profile_id: String,
    ) -> Result<(), CommandError> {
        self.require_host(user_id)?;
        if self.status() != RoomStatus::Waiting {
            return Err(CommandError::code(ErrorCode::InvalidState));
        }
        if profile_id.trim().is_empty() || profile_id.len() > 64 {
            return Err(CommandError::new(ErrorCode::InvalidPayload, "bad AI profile id"));
        }

        let ai_user = uuid::Uuid::new_v4();
        let display_name = format!("{} (bot)", profile_id.trim());
        let max_players = self.settings().max_players;
        let turn_order = self
            .seats_mut()
            .assign(ai_user, display_name, max_players, true, Some(profile_id))?;
        self.persist_seats().await?;
        self.telemetry().emit(&TelemetryEvent::SeatAssign {
            seat_user_id: ai_user,
            turn_order,
        });

        let host_id = self.host_id();
        if let Some(seat) = self.seat_registry().get(ai_user) {
            let player = PlayerSummary::from_seat(seat, host_id);
            self.broadcast(ServerEvent::AiPlayerJoined { player }, Targeting::AllInRoom);
        }
        self.notify_room_status();
        Ok(())
    }

    async fn cmd_remove_ai_player(
        &mut self,
        user_id: UserId,
        player_id: UserId,
    ) -> Result<(), CommandError> {
        self.require_host(user_id)?;
        if self.status() != RoomStatus::Waiting {
            return Err(CommandError::code(ErrorCode::InvalidState));
        }
        let is_ai = self.seat_registry().get(player_id).is_some_and(|s| s.is_ai);
        if !is_ai {
            return Err(CommandError::new(ErrorCode::InvalidPayload, "not an AI seat"));
        }

        self.seats_mut().release(player_id);
        self.persist_seats().await?;
        self.telemetry().emit(&TelemetryEvent::SeatRelease {
            seat_user_id: player_id,
            cause: "kick".to_string(),
        });
        self.broadcast(ServerEvent::AiPlayerRemoved { user_id: player_id }, Targeting::AllInRoom);
        self.notify_room_status();
        Ok(())
    }

    /// Run AI turns until a human is up, the game ends, or the room leaves
    /// the playing state.
    pub(crate) async fn drive_ai_turns(&mut self) {
        // Upper bound: every seat scoring every category once
        let mut guard = 13 * usize::from(self.settings().max_players) + 1;
        while guard > 0 {
            guard -= 1;
            if self.status() != RoomStatus::Playing || self.is_retired() {
                break;
            }
            let Some(current) = self.game_state().and_then(GameState::current_player) else {
                break;
            };
            if !self.seat_registry().get(current).is_some_and(|s| s.is_ai) {
                break;
            }
            if let Err(error) = self.take_ai_turn(current).await {
                self.telemetry().emit(&TelemetryEvent::ErrorHandlerFailed {
                    detail: format!("ai turn for {current}: {}", error.message),
                });
                break;
            }
        }
    }

    /// One full AI turn through the same validated paths as human commands.
    async fn take_ai_turn(&mut self, user_id: UserId) -> Result<(), CommandError> {
        let policy = self.ai_policy();

        loop {
            let Some(game) = self.game_state() else {
                return Err(CommandError::code(ErrorCode::InvalidState));
            };
            let card = game
                .scorecard(user_id)
                .cloned()
                .ok_or_else(|| CommandError::code(ErrorCode::NotInRoom))?;
            let view = TurnView {
                dice: game.dice,
                roll_number: game.roll_number,
                scorecard: &card,
            };
            match policy.plan_keep(view) {
                Some(keep) => self.apply_roll(user_id, keep).await?,
                None => break,
            }
        }

        let Some(game) = self.game_state() else {
            return Err(CommandError::code(ErrorCode::InvalidState));
        };
        let card = game
            .scorecard(user_id)
            .cloned()
            .ok_or_else(|| CommandError::code(ErrorCode::NotInRoom))?;
        let category = policy.choose_category(TurnView {
            dice: game.dice,
            roll_number: game.roll_number,
            scorecard: &card,
        });
        self.score_current_turn(user_id, category).await?;
        Ok(())
    }

    /// Turn-timeout resolution through the external policy hook.
    pub(crate) async fn run_timeout_policy(&mut self, user_id: UserId) {
        // A turn that never rolled still needs dice on the table to score
        let needs_roll = self.game_state().is_some_and(|g| g.roll_number == 0);
        if needs_roll {
            if let Err(error) = self.apply_roll(user_id, [false; 5]).await {
                self.telemetry().emit(&TelemetryEvent::ErrorHandlerFailed {
                    detail: format!("timeout roll for {user_id}: {}", error.message),
                });
                return;
            }
        }

        let policy = self.timeout_policy();
        let Some(game) = self.game_state() else {
            return;
        };
        let Some(card) = game.scorecard(user_id).cloned() else {
            return;
        };
        let TimeoutAction::Score(category) = policy.resolve(TurnView {
            dice: game.dice,
            roll_number: game.roll_number,
            scorecard: &card,
        });

        if let Err(error) = self.score_current_turn(user_id, category).await {
            self.telemetry().emit(&TelemetryEvent::ErrorHandlerFailed {
                detail: format!("timeout score for {user_id}: {}", error.message),
            });
            return;
        }
        self.drive_ai_turns().await;
    }

    // ---------------------------------------------------------------------
    // Invites
    // ---------------------------------------------------------------------

    async fn cmd_send_invite(
        &mut self,
        user_id: UserId,
        target_user_id: UserId,
    ) -> Result<(), CommandError> {
        self.require_host(user_id)?;
        if self.status() != RoomStatus::Waiting {
            return Err(CommandError::code(ErrorCode::InvalidState));
        }
        if self.seat_registry().get(target_user_id).is_some() {
            return Err(CommandError::code(ErrorCode::AlreadySeated));
        }
        if self.invites_book().pending_for(target_user_id).is_some() {
            return Err(CommandError::new(
                ErrorCode::InvalidPayload,
                "an invite to this user is already pending",
            ));
        }

        let expires_at = self.now_plus_ms(self.config().room.invite_ttl_ms);
        let invite = self.invites_mut().create(user_id, target_user_id, expires_at);
        self.persist_invites().await?;
        self.alarms_mut()
            .schedule(
                AlarmKind::InviteExpiration,
                expires_at,
                serde_json::json!({ "inviteId": invite.invite_id }),
            )
            .await?;

        self.telemetry().emit(&TelemetryEvent::InviteCreate {
            invite_id: invite.invite_id.to_string(),
            to_user_id: target_user_id,
        });
        self.broadcast(ServerEvent::InviteSent { invite }, Targeting::AllInRoom);
        Ok(())
    }

    async fn cmd_cancel_invite(
        &mut self,
        user_id: UserId,
        invite_id: InviteId,
    ) -> Result<(), CommandError> {
        self.require_host(user_id)?;
        let invite = self
            .invites_mut()
            .resolve(invite_id, InviteStatus::Cancelled)
            .ok_or_else(|| CommandError::code(ErrorCode::InviteNotFound))?;
        self.persist_invites().await?;
        self.cancel_invite_alarm(invite_id).await;

        self.telemetry().emit(&TelemetryEvent::InviteResolve {
            invite_id: invite.invite_id.to_string(),
            status: "cancelled".to_string(),
        });
        self.broadcast(ServerEvent::InviteCancelled { invite_id }, Targeting::AllInRoom);
        Ok(())
    }

    /// Invite answer relayed from the lobby.
    pub async fn handle_invite_answer(
        &mut self,
        invite_id: InviteId,
        user_id: UserId,
        display_name: &str,
        accept: bool,
    ) {
        self.telemetry().begin_request(None, Some(user_id));
        let Some(pending) = self.invites_book().get(invite_id).cloned() else {
            return;
        };
        if pending.to_user_id != user_id {
            return;
        }

        let now = self.deps_clock_now();
        if !accept || now >= pending.expires_at || self.status() != RoomStatus::Waiting {
            if let Some(invite) = self.invites_mut().resolve(invite_id, InviteStatus::Declined) {
                if let Err(e) = self.persist_invites().await {
                    self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                        key: StorageKey::Invites,
                        detail: e.to_string(),
                    });
                }
                self.cancel_invite_alarm(invite_id).await;
                self.telemetry().emit(&TelemetryEvent::InviteResolve {
                    invite_id: invite.invite_id.to_string(),
                    status: "declined".to_string(),
                });
                self.broadcast(ServerEvent::InviteDeclined { invite_id }, Targeting::AllInRoom);
            }
            return;
        }

        // Accept: the invitee gets a reserved seat placeholder they can
        // claim by connecting within the reclaim window
        let max_players = self.settings().max_players;
        let assigned = self.seats_mut().assign(
            user_id,
            display_name.to_string(),
            max_players,
            false,
            None,
        );
        match assigned {
            Ok(_) => {}
            Err(SeatError::AlreadySeated) => {}
            Err(SeatError::RoomFull) => {
                if let Some(invite) = self.invites_mut().resolve(invite_id, InviteStatus::Declined) {
                    let _ = self.persist_invites().await;
                    self.cancel_invite_alarm(invite_id).await;
                    self.telemetry().emit(&TelemetryEvent::InviteResolve {
                        invite_id: invite.invite_id.to_string(),
                        status: "declined".to_string(),
                    });
                    self.broadcast(ServerEvent::InviteDeclined { invite_id }, Targeting::AllInRoom);
                }
                return;
            }
        }

        let deadline = self.now_plus_ms(self.config().room.reclaim_window_ms);
        self.seats_mut().mark_disconnected(user_id, deadline);
        if let Err(e) = self.schedule_seat_expiration(user_id, deadline).await {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::AlarmQueue,
                detail: e.to_string(),
            });
        }
        if let Err(e) = self.persist_seats().await {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::Seats,
                detail: e.to_string(),
            });
        }

        if let Some(invite) = self.invites_mut().resolve(invite_id, InviteStatus::Accepted) {
            if let Err(e) = self.persist_invites().await {
                self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                    key: StorageKey::Invites,
                    detail: e.to_string(),
                });
            }
            self.cancel_invite_alarm(invite_id).await;
            self.telemetry().emit(&TelemetryEvent::InviteResolve {
                invite_id: invite.invite_id.to_string(),
                status: "accepted".to_string(),
            });
        }

        self.broadcast(ServerEvent::InviteAccepted { invite_id, user_id }, Targeting::AllInRoom);
        let host_id = self.host_id();
        if let Some(seat) = self.seat_registry().get(user_id) {
            let player = PlayerSummary::from_seat(seat, host_id);
            self.broadcast(ServerEvent::PlayerJoined { player }, Targeting::AllInRoom);
        }
        let code = self.room_code().to_string();
        self.lobby_dispatch()
            .user_room_status(user_id, &code, UserRoomEvent::Joined);
        self.notify_room_status();
    }

    /// Invites do not survive the waiting phase.
    pub(crate) async fn cancel_all_invites(&mut self) {
        let cancelled = self.invites_mut().cancel_all();
        if cancelled.is_empty() {
            return;
        }
        if let Err(e) = self.persist_invites().await {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::Invites,
                detail: e.to_string(),
            });
        }
        if let Err(e) = self
            .alarms_mut()
            .cancel_where(|e| e.kind == AlarmKind::InviteExpiration)
            .await
        {
            self.telemetry().emit(&TelemetryEvent::ErrorStorageFailed {
                key: StorageKey::AlarmQueue,
                detail: e.to_string(),
            });
        }
        for invite in cancelled {
            self.telemetry().emit(&TelemetryEvent::InviteResolve {
                invite_id: invite.invite_id.to_string(),
                status: "cancelled".to_string(),
            });
            self.broadcast(
                ServerEvent::InviteCancelled {
                    invite_id: invite.invite_id,
                },
                Targeting::AllInRoom,
            );
        }
    }

    async fn cancel_invite_alarm(&mut self, invite_id: InviteId) {
        if let Err(e) = self
            .alarms_mut()
            .cancel_where(|e| {
                e.kind == AlarmKind::InviteExpiration
                    && e.payload["inviteId"] == serde_json::json!(invite_id)
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
    // Chat
    // ---------------------------------------------------------------------

    async fn cmd_chat(
        &mut self,
        attachment: &SocketAttachment,
        content: String,
    ) -> Result<(), CommandError> {
        validation::validate_chat_content(&content, self.config().room.max_message_len)
            .map_err(|m| CommandError::new(ErrorCode::InvalidPayload, m))?;
        self.append_chat(attachment, content).await;
        Ok(())
    }

    async fn cmd_quick_chat(
        &mut self,
        attachment: &SocketAttachment,
        key: QuickChatKey,
    ) -> Result<(), CommandError> {
        self.append_chat(attachment, key.text().to_string()).await;
        Ok(())
    }

    async fn append_chat(&mut self, attachment: &SocketAttachment, content: String) {
        let now = self.deps_clock_now();
        let message = self.chat_mut().append(
            attachment.user_id,
            attachment.display_name.clone(),
            content,
            now,
        );
        self.persist_chat().await;
        self.broadcast(ServerEvent::ChatMessage { message }, Targeting::AllInRoom);
    }

    async fn cmd_reaction(
        &mut self,
        _connection_id: ConnectionId,
        message_id: crate::protocol::MessageId,
        emoji: String,
        action: ReactionAction,
    ) -> Result<(), CommandError> {
        validation::validate_reaction_emoji(&emoji)
            .map_err(|m| CommandError::new(ErrorCode::InvalidPayload, m))?;
        let count = self
            .chat_mut()
            .react(message_id, &emoji, action)
            .ok_or_else(|| CommandError::new(ErrorCode::InvalidPayload, "unknown message"))?;
        self.persist_chat().await;
        self.broadcast(
            ServerEvent::ReactionUpdate {
                message_id,
                emoji,
                count,
            },
            Targeting::AllInRoom,
        );
        Ok(())
    }

    async fn cmd_typing(&mut self, user_id: UserId, start: bool) -> Result<(), CommandError> {
        let changed = if start {
            let due = self.now_plus_ms(self.config().room.typing_expiry_ms);
            self.cancel_typing_alarm(user_id).await;
            self.alarms_mut()
                .schedule(
                    AlarmKind::TypingExpiry,
                    due,
                    serde_json::json!({ "userId": user_id }),
                )
                .await?;
            self.typing_mut().start(user_id)
        } else {
            self.cancel_typing_alarm(user_id).await;
            self.typing_mut().stop(user_id)
        };
        if changed {
            self.broadcast_typing();
        }
        Ok(())
    }

    pub(crate) fn broadcast_typing(&self) {
        self.broadcast(
            ServerEvent::TypingUpdate {
                typing: self.typing_state().current(),
            },
            Targeting::AllInRoom,
        );
    }

    // ---------------------------------------------------------------------
    // Guards and direct sends
    // ---------------------------------------------------------------------

    fn require_host(&self, user_id: UserId) -> Result<(), CommandError> {
        if self.room_record().is_none() {
            return Err(CommandError::code(ErrorCode::NotInRoom));
        }
        if self.host_id() != user_id {
            return Err(CommandError::code(ErrorCode::NotHost));
        }
        Ok(())
    }

    fn require_seat(&self, user_id: UserId) -> Result<(), CommandError> {
        if self.seat_registry().get(user_id).is_none() {
            return Err(CommandError::code(ErrorCode::NotInRoom));
        }
        Ok(())
    }

    fn require_playing(&self) -> Result<(), CommandError> {
        if self.status() != RoomStatus::Playing {
            return Err(CommandError::code(ErrorCode::InvalidState));
        }
        Ok(())
    }

    /// Send to one socket without the broadcast telemetry (PONG path).
    fn send_direct(
        &self,
        connection_id: ConnectionId,
        event: ServerEvent,
        correlation_id: Option<String>,
    ) {
        let Some(entry) = self.connection_table().get(connection_id) else {
            return;
        };
        let frame = ServerFrame::new(event, correlation_id);
        if let Ok(bytes) = serde_json::to_vec(&frame) {
            let _ = entry.sink.try_send_frame(bytes::Bytes::from(bytes));
        }
    }
}
