use super::types::ROOM_CODE_LENGTH;

pub fn validate_room_code(code: &str) -> Result<(), String> {
    if code.is_empty() {
        return Err("Room code cannot be empty".to_string());
    }
    if code.len() != ROOM_CODE_LENGTH {
        return Err(format!("Room code must be exactly {ROOM_CODE_LENGTH} characters"));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Room code must be alphanumeric".to_string());
    }
    Ok(())
}

pub fn validate_display_name(name: &str, max_len: usize) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Display name cannot be blank".to_string());
    }
    if name.len() > max_len {
        return Err(format!("Display name too long (max {max_len} characters)"));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err("Display name contains control characters".to_string());
    }
    Ok(())
}

pub fn validate_chat_content(content: &str, max_len: usize) -> Result<(), String> {
    if content.is_empty() {
        return Err("Chat message cannot be empty".to_string());
    }
    if content.chars().count() > max_len {
        return Err(format!("Chat message too long (max {max_len} characters)"));
    }
    Ok(())
}

/// Reactions are single emoji graphemes; bound the byte length to keep the
/// per-message reaction map small.
pub fn validate_reaction_emoji(emoji: &str) -> Result<(), String> {
    if emoji.is_empty() {
        return Err("Reaction emoji cannot be empty".to_string());
    }
    if emoji.len() > 16 {
        return Err("Reaction emoji too long".to_string());
    }
    if emoji.chars().any(char::is_whitespace) {
        return Err("Reaction emoji cannot contain whitespace".to_string());
    }
    Ok(())
}

pub fn validate_max_players(max_players: u8, limit: u8) -> Result<(), String> {
    if max_players < 2 {
        return Err("Max players must be at least 2".to_string());
    }
    if max_players > limit {
        return Err(format!("Max players cannot exceed {limit}"));
    }
    Ok(())
}
