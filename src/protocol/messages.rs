use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error_codes::ErrorCode;
use super::types::{
    ChatMessageRecord, InviteId, MessageId, PendingInvite, PlayerSummary, QuickChatKey,
    ReactionAction, Role, RoomStatus, UserId,
};
use crate::game::{Category, ScorecardView};

/// Inbound envelope: `{type, payload?, correlationId?}`.
///
/// The correlation id is an opaque client value propagated through every
/// server event this command causes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEnvelope {
    #[serde(flatten)]
    pub command: ClientCommand,
    #[serde(rename = "correlationId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Commands sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientCommand {
    /// Host starts the game (waiting -> starting -> playing)
    StartGame,
    /// Reroll the non-kept dice of the current turn
    DiceRoll {
        kept: [bool; 5],
    },
    /// Score the current dice into a category and advance the turn
    CategoryScore {
        category: Category,
    },
    /// Host resets a completed room back to waiting for a new game
    Rematch,
    /// Host seats an AI opponent (waiting room only)
    #[serde(rename_all = "camelCase")]
    AddAiPlayer {
        profile_id: String,
    },
    /// Host removes an AI opponent's seat (waiting room only)
    #[serde(rename_all = "camelCase")]
    RemoveAiPlayer {
        player_id: UserId,
    },
    /// Host invites a lobby user into the waiting room
    #[serde(rename_all = "camelCase")]
    SendInvite {
        target_user_id: UserId,
    },
    /// Host cancels a pending invite
    #[serde(rename_all = "camelCase")]
    CancelInvite {
        invite_id: InviteId,
    },
    /// Append a chat message
    Chat {
        content: String,
    },
    /// Append a preset chat message
    QuickChat {
        key: QuickChatKey,
    },
    /// Add or remove an emoji reaction on a message
    #[serde(rename_all = "camelCase")]
    Reaction {
        message_id: MessageId,
        emoji: String,
        action: ReactionAction,
    },
    /// Broadcast a typing indicator
    TypingStart,
    TypingStop,
    /// Liveness probe; answered with PONG and suppressed from the event log
    Ping,
}

impl ClientCommand {
    /// Short command name used in telemetry and rate-limit buckets.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartGame => "START_GAME",
            Self::DiceRoll { .. } => "DICE_ROLL",
            Self::CategoryScore { .. } => "CATEGORY_SCORE",
            Self::Rematch => "REMATCH",
            Self::AddAiPlayer { .. } => "ADD_AI_PLAYER",
            Self::RemoveAiPlayer { .. } => "REMOVE_AI_PLAYER",
            Self::SendInvite { .. } => "SEND_INVITE",
            Self::CancelInvite { .. } => "CANCEL_INVITE",
            Self::Chat { .. } => "CHAT",
            Self::QuickChat { .. } => "QUICK_CHAT",
            Self::Reaction { .. } => "REACTION",
            Self::TypingStart => "TYPING_START",
            Self::TypingStop => "TYPING_STOP",
            Self::Ping => "PING",
        }
    }
}

/// Outbound envelope: `{type, payload, correlationId?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(flatten)]
    pub event: ServerEvent,
    #[serde(rename = "correlationId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ServerFrame {
    pub fn new(event: ServerEvent, correlation_id: Option<String>) -> Self {
        Self {
            event,
            correlation_id,
        }
    }
}

/// Initial room snapshot sent to a newly-accepted socket.
/// Boxed in ServerEvent to reduce enum size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub room_code: String,
    pub status: RoomStatus,
    pub host_id: UserId,
    pub players: Vec<PlayerSummary>,
    pub ai_players: Vec<PlayerSummary>,
    pub your_user_id: UserId,
    pub your_role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<GameSnapshot>,
    pub chat: Vec<ChatMessageRecord>,
}

/// Full mid-game state for snapshots and GAME_STARTED payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub turn_index: usize,
    /// None once the game is complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_id: Option<UserId>,
    pub roll_number: u8,
    pub dice: [u8; 5],
    pub kept: [bool; 5],
    pub scorecards: BTreeMap<UserId, ScorecardView>,
    pub turn_started_at: DateTime<Utc>,
}

/// Final per-player result in GAME_OVER.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalStanding {
    pub user_id: UserId,
    pub display_name: String,
    pub total: u32,
    pub rank: u32,
}

/// Events sent from server to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    /// Initial room snapshot for a newly-accepted socket (boxed to reduce enum size)
    Connected(Box<ConnectedPayload>),
    /// A player took a seat
    PlayerJoined {
        player: PlayerSummary,
    },
    /// A seat was released for good
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        user_id: UserId,
        cause: super::types::SeatReleaseCause,
    },
    /// A player's socket dropped; their seat is reserved until the deadline
    #[serde(rename_all = "camelCase")]
    PlayerDisconnected {
        user_id: UserId,
        reconnect_deadline: DateTime<Utc>,
    },
    /// A disconnected player reclaimed their seat
    #[serde(rename_all = "camelCase")]
    PlayerReconnected {
        user_id: UserId,
    },
    AiPlayerJoined {
        player: PlayerSummary,
    },
    #[serde(rename_all = "camelCase")]
    AiPlayerRemoved {
        user_id: UserId,
    },
    /// Countdown before the first turn
    #[serde(rename_all = "camelCase")]
    GameStarting {
        countdown_ms: u64,
    },
    GameStarted {
        game: Box<GameSnapshot>,
    },
    #[serde(rename_all = "camelCase")]
    TurnStarted {
        user_id: UserId,
        turn_index: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        turn_deadline: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    DiceRolled {
        user_id: UserId,
        dice: [u8; 5],
        kept: [bool; 5],
        roll_number: u8,
    },
    #[serde(rename_all = "camelCase")]
    CategoryScored {
        user_id: UserId,
        category: Category,
        points: u32,
        scorecard: ScorecardView,
    },
    #[serde(rename_all = "camelCase")]
    GamePaused {
        paused_at: DateTime<Utc>,
        abandon_deadline: DateTime<Utc>,
    },
    GameResumed,
    GameOver {
        standings: Vec<FinalStanding>,
    },
    RematchStarted,
    InviteSent {
        invite: PendingInvite,
    },
    #[serde(rename_all = "camelCase")]
    InviteAccepted {
        invite_id: InviteId,
        user_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    InviteDeclined {
        invite_id: InviteId,
    },
    #[serde(rename_all = "camelCase")]
    InviteCancelled {
        invite_id: InviteId,
    },
    #[serde(rename_all = "camelCase")]
    InviteExpired {
        invite_id: InviteId,
    },
    ChatMessage {
        message: ChatMessageRecord,
    },
    #[serde(rename_all = "camelCase")]
    ReactionUpdate {
        message_id: MessageId,
        emoji: String,
        count: u32,
    },
    /// Users currently typing (full set, not a delta)
    TypingUpdate {
        typing: Vec<UserId>,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    Pong,
}

impl ServerEvent {
    /// Event type tag as it appears on the wire, used in broadcast telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "CONNECTED",
            Self::PlayerJoined { .. } => "PLAYER_JOINED",
            Self::PlayerLeft { .. } => "PLAYER_LEFT",
            Self::PlayerDisconnected { .. } => "PLAYER_DISCONNECTED",
            Self::PlayerReconnected { .. } => "PLAYER_RECONNECTED",
            Self::AiPlayerJoined { .. } => "AI_PLAYER_JOINED",
            Self::AiPlayerRemoved { .. } => "AI_PLAYER_REMOVED",
            Self::GameStarting { .. } => "GAME_STARTING",
            Self::GameStarted { .. } => "GAME_STARTED",
            Self::TurnStarted { .. } => "TURN_STARTED",
            Self::DiceRolled { .. } => "DICE_ROLLED",
            Self::CategoryScored { .. } => "CATEGORY_SCORED",
            Self::GamePaused { .. } => "GAME_PAUSED",
            Self::GameResumed => "GAME_RESUMED",
            Self::GameOver { .. } => "GAME_OVER",
            Self::RematchStarted => "REMATCH_STARTED",
            Self::InviteSent { .. } => "INVITE_SENT",
            Self::InviteAccepted { .. } => "INVITE_ACCEPTED",
            Self::InviteDeclined { .. } => "INVITE_DECLINED",
            Self::InviteCancelled { .. } => "INVITE_CANCELLED",
            Self::InviteExpired { .. } => "INVITE_EXPIRED",
            Self::ChatMessage { .. } => "CHAT_MESSAGE",
            Self::ReactionUpdate { .. } => "REACTION_UPDATE",
            Self::TypingUpdate { .. } => "TYPING_UPDATE",
            Self::Error { .. } => "ERROR",
            Self::Pong => "PONG",
        }
    }
}
