// Protocol module: wire message types, validation, and room/seat records

pub mod error_codes;
pub mod messages;
pub mod room_codes;
pub mod types;
pub mod validation;

// Re-export everything for convenience
// This allows handler code to use `use crate::protocol::*`

// From error_codes
pub use error_codes::ErrorCode;

// From types
pub use types::{
    ChatMessageRecord, ConnectionId, InviteId, InviteStatus, MessageId, PendingInvite,
    PlayerSummary, QuickChatKey, ReactionAction, ReclaimOutcome, ReclaimRejectReason, Role,
    RoomRecord, RoomSettings, RoomStatus, Seat, SeatReleaseCause, SocketAttachment, UserId,
};

// From messages
pub use messages::{
    ClientCommand, ClientEnvelope, ConnectedPayload, GameSnapshot, ServerEvent, ServerFrame,
};

pub use room_codes::generate_room_code;
