//! Default value functions for configuration fields.
//!
//! Used by serde's `#[serde(default = ...)]` attributes throughout the
//! configuration system, organized by category.

use super::logging::LogFormat;

// =============================================================================
// Port & Root Config
// =============================================================================

pub const fn default_port() -> u16 {
    3740
}

// =============================================================================
// Room timing
// =============================================================================

/// Window after a disconnect during which the same user can reclaim the seat.
pub const fn default_reclaim_window_ms() -> u64 {
    300_000
}

/// How long a paused room waits for a reconnect before abandoning.
pub const fn default_pause_timeout_ms() -> u64 {
    1_800_000
}

/// Gap between the last player disconnect and the pause decision, so a mass
/// tab refresh does not drive a live game to paused.
pub const fn default_pause_debounce_ms() -> u64 {
    2_000
}

pub const fn default_invite_ttl_ms() -> u64 {
    60_000
}

pub const fn default_turn_timeout_ms() -> u64 {
    120_000
}

pub const fn default_typing_expiry_ms() -> u64 {
    6_000
}

pub const fn default_game_start_countdown_ms() -> u64 {
    3_000
}

// =============================================================================
// Room shape
// =============================================================================

pub const fn default_max_players() -> u8 {
    4
}

pub const fn default_max_players_limit() -> u8 {
    8
}

pub const fn default_max_spectators() -> usize {
    16
}

pub const fn default_max_chat_messages() -> usize {
    200
}

pub const fn default_max_message_len() -> usize {
    500
}

pub const fn default_max_display_name_len() -> usize {
    32
}

// =============================================================================
// Rate limiting
// =============================================================================

pub const fn default_commands_per_window() -> u32 {
    30
}

pub const fn default_chat_per_window() -> u32 {
    10
}

pub const fn default_rate_window_secs() -> u64 {
    10
}

// =============================================================================
// Security
// =============================================================================

pub fn default_token_key() -> String {
    // Development-only key; production deployments must override it
    "insecure-dev-signing-key".to_string()
}

// =============================================================================
// Hub
// =============================================================================

/// Retire a room actor after this much idle time with zero live sockets.
pub const fn default_actor_idle_retire_secs() -> u64 {
    300
}

// =============================================================================
// Logging
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "server.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    false
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Text
}
