//! Root configuration types.

use super::defaults::{
    default_actor_idle_retire_secs, default_chat_per_window, default_commands_per_window,
    default_game_start_countdown_ms, default_invite_ttl_ms, default_max_chat_messages,
    default_max_display_name_len, default_max_message_len, default_max_players,
    default_max_players_limit, default_max_spectators, default_pause_debounce_ms,
    default_pause_timeout_ms, default_port, default_rate_window_secs, default_reclaim_window_ms,
    default_token_key, default_turn_timeout_ms, default_typing_expiry_ms,
};
use super::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Root configuration struct for the session server.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub room: RoomConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            room: RoomConfig::default(),
            rate_limit: RateLimitConfig::default(),
            security: SecurityConfig::default(),
            hub: HubConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Per-room timing and shape parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoomConfig {
    /// RECLAIM_WINDOW_MS: seat reservation window after a disconnect
    #[serde(default = "default_reclaim_window_ms")]
    pub reclaim_window_ms: u64,
    /// PAUSE_TIMEOUT_MS: paused room lifetime before abandonment
    #[serde(default = "default_pause_timeout_ms")]
    pub pause_timeout_ms: u64,
    /// PAUSE_DEBOUNCE_MS: wait after the last disconnect before pausing
    #[serde(default = "default_pause_debounce_ms")]
    pub pause_debounce_ms: u64,
    /// INVITE_TTL_MS: pending invite lifetime
    #[serde(default = "default_invite_ttl_ms")]
    pub invite_ttl_ms: u64,
    /// Default per-turn timeout; hosts can override per room
    #[serde(default = "default_turn_timeout_ms")]
    pub turn_timeout_ms: u64,
    /// Typing indicator expiry when no stop arrives
    #[serde(default = "default_typing_expiry_ms")]
    pub typing_expiry_ms: u64,
    /// GAME_STARTING countdown before the first turn
    #[serde(default = "default_game_start_countdown_ms")]
    pub game_start_countdown_ms: u64,
    /// MAX_PLAYERS: default room size
    #[serde(default = "default_max_players")]
    pub max_players: u8,
    /// Hard cap a host can request
    #[serde(default = "default_max_players_limit")]
    pub max_players_limit: u8,
    #[serde(default = "default_max_spectators")]
    pub max_spectators: usize,
    /// MAX_CHAT_MESSAGES: chat backlog ring size
    #[serde(default = "default_max_chat_messages")]
    pub max_chat_messages: usize,
    /// MAX_MESSAGE_LEN: chat content limit in characters
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    #[serde(default = "default_max_display_name_len")]
    pub max_display_name_len: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            reclaim_window_ms: default_reclaim_window_ms(),
            pause_timeout_ms: default_pause_timeout_ms(),
            pause_debounce_ms: default_pause_debounce_ms(),
            invite_ttl_ms: default_invite_ttl_ms(),
            turn_timeout_ms: default_turn_timeout_ms(),
            typing_expiry_ms: default_typing_expiry_ms(),
            game_start_countdown_ms: default_game_start_countdown_ms(),
            max_players: default_max_players(),
            max_players_limit: default_max_players_limit(),
            max_spectators: default_max_spectators(),
            max_chat_messages: default_max_chat_messages(),
            max_message_len: default_max_message_len(),
            max_display_name_len: default_max_display_name_len(),
        }
    }
}

/// Per-user command budgets over a sliding window.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_commands_per_window")]
    pub commands_per_window: u32,
    #[serde(default = "default_chat_per_window")]
    pub chat_per_window: u32,
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            commands_per_window: default_commands_per_window(),
            chat_per_window: default_chat_per_window(),
            window_secs: default_rate_window_secs(),
        }
    }
}

/// Security settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    /// Shared HMAC key for session-token validation. The development
    /// default is rejected by validation outside debug builds.
    #[serde(default = "default_token_key")]
    pub token_key: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_key: default_token_key(),
        }
    }
}

/// Room directory behavior.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HubConfig {
    /// Retire a room actor after this much idle time with zero sockets
    #[serde(default = "default_actor_idle_retire_secs")]
    pub actor_idle_retire_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            actor_idle_retire_secs: default_actor_idle_retire_secs(),
        }
    }
}
