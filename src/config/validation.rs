//! Configuration validation functions.

use super::defaults::default_token_key;
use super::Config;

/// Whether the process looks like a production deployment.
pub fn is_production_mode() -> bool {
    std::env::var("ROLLHOUSE_ENV")
        .map(|v| v.eq_ignore_ascii_case("production") || v.eq_ignore_ascii_case("prod"))
        .unwrap_or(false)
}

/// Validate the loaded configuration. Returns an error describing every
/// violated constraint; startup fails on error.
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    let mut problems: Vec<String> = Vec::new();

    let room = &config.room;
    if room.max_players < 2 {
        problems.push(format!("room.max_players must be at least 2, got {}", room.max_players));
    }
    if room.max_players > room.max_players_limit {
        problems.push(format!(
            "room.max_players ({}) exceeds room.max_players_limit ({})",
            room.max_players, room.max_players_limit
        ));
    }
    if room.reclaim_window_ms == 0 {
        problems.push("room.reclaim_window_ms must be positive".to_string());
    }
    if room.pause_timeout_ms == 0 {
        problems.push("room.pause_timeout_ms must be positive".to_string());
    }
    if room.pause_debounce_ms >= room.pause_timeout_ms {
        problems.push(format!(
            "room.pause_debounce_ms ({}) must be shorter than room.pause_timeout_ms ({})",
            room.pause_debounce_ms, room.pause_timeout_ms
        ));
    }
    if room.invite_ttl_ms == 0 {
        problems.push("room.invite_ttl_ms must be positive".to_string());
    }
    if room.max_chat_messages == 0 {
        problems.push("room.max_chat_messages must be positive".to_string());
    }
    if room.max_message_len == 0 {
        problems.push("room.max_message_len must be positive".to_string());
    }

    let rate = &config.rate_limit;
    if rate.window_secs == 0 {
        problems.push("rate_limit.window_secs must be positive".to_string());
    }
    if rate.commands_per_window == 0 {
        problems.push("rate_limit.commands_per_window must be positive".to_string());
    }

    if config.security.token_key.len() < 16 {
        problems.push(format!(
            "security.token_key is too short ({} chars); use at least 16",
            config.security.token_key.len()
        ));
    }
    if is_production_mode() && config.security.token_key == default_token_key() {
        problems.push(
            "security.token_key is the built-in development key; set \
             ROLLHOUSE__SECURITY__TOKEN_KEY in production"
                .to_string(),
        );
    }

    if problems.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("configuration invalid:\n  - {}", problems.join("\n  - "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn bad_player_counts_are_rejected() {
        let mut config = Config::default();
        config.room.max_players = 1;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.room.max_players = 10;
        config.room.max_players_limit = 8;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn debounce_must_undershoot_pause_timeout() {
        let mut config = Config::default();
        config.room.pause_debounce_ms = config.room.pause_timeout_ms;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn short_token_key_is_rejected() {
        let mut config = Config::default();
        config.security.token_key = "short".to_string();
        assert!(validate_config(&config).is_err());
    }
}
