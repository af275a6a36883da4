use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes returned to clients in ERROR frames.
///
/// Internal failure kinds (storage, broadcast, lobby notify, alarm dispatch,
/// state corruption) never reach clients; they surface only as telemetry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Connection / identity
    AuthFailed,
    RoomFull,
    AlreadySeated,
    NotInRoom,

    // Authorization
    NotHost,
    NotYourTurn,

    // Command validity
    InvalidState,
    InvalidPayload,
    CategoryUnavailable,
    RollLimit,
    RateLimit,

    // Invites
    InviteNotFound,
    InviteExpired,

    // Server
    Internal,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    ///
    /// These are the default messages sent in ERROR frames when a handler has
    /// nothing more specific to say.
    pub fn description(&self) -> &'static str {
        match self {
            Self::AuthFailed => {
                "The session token is missing, malformed, or expired. Obtain a new token and reconnect."
            }
            Self::RoomFull => {
                "The room has reached its maximum number of players and spectator slots."
            }
            Self::AlreadySeated => {
                "You already hold a seat in this room. Reconnect with the same account to resume it."
            }
            Self::NotInRoom => {
                "This command requires a seat in the room, but you do not hold one."
            }
            Self::NotHost => "Only the room host can perform this action.",
            Self::NotYourTurn => "It is not your turn to act.",
            Self::InvalidState => {
                "The command is not legal in the room's current state. Check the room status and try again."
            }
            Self::InvalidPayload => {
                "The command payload is malformed or violates a field constraint."
            }
            Self::CategoryUnavailable => {
                "That scorecard category has already been scored this game."
            }
            Self::RollLimit => "All three rolls for this turn have been used. Score a category.",
            Self::RateLimit => "Too many requests. Slow down and try again shortly.",
            Self::InviteNotFound => "No invite with that identifier exists in this room.",
            Self::InviteExpired => "The invite has expired and can no longer be answered.",
            Self::Internal => "The server hit an internal error handling the command. Try again.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
