use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Room codes are fixed-length, drawn from the clean alphabet in
/// [`super::room_codes`].
pub const ROOM_CODE_LENGTH: usize = 6;

/// Unique identifier for users (issued by the external auth service)
pub type UserId = Uuid;
/// Unique identifier for a live WebSocket connection
pub type ConnectionId = Uuid;
/// Unique identifier for a pending invite
pub type InviteId = Uuid;
/// Unique identifier for a chat message
pub type MessageId = Uuid;

/// Room lifecycle status.
///
/// Transitions follow the fixed diagram; anything else is rejected and
/// reported as a `state.transition.rejected` telemetry event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Starting,
    Playing,
    Paused,
    Completed,
    Abandoned,
}

impl RoomStatus {
    /// Whether the lifecycle diagram permits `self -> to`.
    pub fn can_transition_to(self, to: RoomStatus) -> bool {
        use RoomStatus::{Abandoned, Completed, Paused, Playing, Starting, Waiting};
        matches!(
            (self, to),
            (Waiting, Starting)
                | (Waiting, Abandoned)
                | (Starting, Playing)
                | (Starting, Abandoned)
                | (Playing, Paused)
                | (Playing, Completed)
                | (Playing, Abandoned)
                | (Paused, Playing)
                | (Paused, Abandoned)
                | (Completed, Waiting)
                | (Completed, Abandoned)
        )
    }

    /// True once the room can never accept traffic again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RoomStatus::Abandoned)
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Starting => "starting",
            RoomStatus::Playing => "playing",
            RoomStatus::Paused => "paused",
            RoomStatus::Completed => "completed",
            RoomStatus::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Role a connection holds within a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    Spectator,
    /// Accepted socket that has not yet resolved to player or spectator
    Pending,
}

/// Per-room configuration chosen by the host at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub max_players: u8,
    pub spectators_allowed: bool,
    /// How long a seat may sit idle on its turn before the timeout policy acts
    pub turn_timeout_ms: u64,
    /// Whether the room is listed publicly in the lobby directory
    pub public: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_players: 4,
            spectators_allowed: true,
            turn_timeout_ms: 120_000,
            public: false,
        }
    }
}

/// Authoritative room record, persisted under the `room` storage key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub code: String,
    pub status: RoomStatus,
    pub host_id: UserId,
    pub settings: RoomSettings,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set iff status is `paused`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
}

impl RoomRecord {
    pub fn new(code: String, host_id: UserId, settings: RoomSettings, now: DateTime<Utc>) -> Self {
        Self {
            code,
            status: RoomStatus::Waiting,
            host_id,
            settings,
            created_at: now,
            started_at: None,
            paused_at: None,
        }
    }
}

/// One player slot in the room.
///
/// A seat survives brief disconnects: `is_connected = false` always comes
/// with a `reconnect_deadline`, and a matching seat-expiration alarm entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub user_id: UserId,
    pub display_name: String,
    pub turn_order: u8,
    pub is_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_deadline: Option<DateTime<Utc>>,
    pub is_ai: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_profile_id: Option<String>,
}

/// Why a seat was released.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatReleaseCause {
    Timeout,
    Leave,
    Kick,
}

/// Result of a seat reclaim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimOutcome {
    /// Same seat restored, deadline cleared
    Reclaimed,
    /// No reclaimable seat; caller joins as spectator (or is rejected)
    Spectator(ReclaimRejectReason),
}

/// Why a reclaim attempt fell through to spectator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimRejectReason {
    NoSeat,
    DeadlinePassed,
    SeatTaken,
}

/// Identity blob attached to a socket at accept time.
///
/// The hibernation model restores sockets with this attachment only; handler
/// code reads identity from here, never from an in-memory map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SocketAttachment {
    pub user_id: UserId,
    pub display_name: String,
    pub role: Role,
}

/// Denormalized player view used in snapshots, broadcasts and lobby pushes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub user_id: UserId,
    pub display_name: String,
    pub turn_order: u8,
    pub is_connected: bool,
    pub is_host: bool,
    pub is_ai: bool,
}

impl PlayerSummary {
    pub fn from_seat(seat: &Seat, host_id: UserId) -> Self {
        Self {
            user_id: seat.user_id,
            display_name: seat.display_name.clone(),
            turn_order: seat.turn_order,
            is_connected: seat.is_connected,
            is_host: seat.user_id == host_id,
            is_ai: seat.is_ai,
        }
    }
}

/// Invite lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
    Cancelled,
    Expired,
}

/// A pending invite, alive only during the waiting-room phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInvite {
    pub invite_id: InviteId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub status: InviteStatus,
}

/// One chat message, including its reaction counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageRecord {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub display_name: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    /// emoji -> count; emptied entries are removed
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, u32>,
}

/// Keys accepted for QUICK_CHAT; the server expands them to canned text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuickChatKey {
    NiceRoll,
    GoodGame,
    HurryUp,
    Ouch,
    Wow,
    ThankYou,
}

impl QuickChatKey {
    /// Canned message text for a preset key.
    pub fn text(self) -> &'static str {
        match self {
            QuickChatKey::NiceRoll => "Nice roll!",
            QuickChatKey::GoodGame => "Good game!",
            QuickChatKey::HurryUp => "Hurry up!",
            QuickChatKey::Ouch => "Ouch...",
            QuickChatKey::Wow => "Wow!",
            QuickChatKey::ThankYou => "Thank you!",
        }
    }
}

/// Reaction mutation direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Add,
    Remove,
}
