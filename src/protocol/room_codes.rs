use super::types::ROOM_CODE_LENGTH;
use rand::RngExt;

/// Alphabet for room codes, avoiding confusable characters (0, O, I, 1)
/// so codes can be read aloud between players.
const CLEAN_CHARS: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Generate a 6-character room code from the clean alphabet.
pub fn generate_room_code() -> String {
    generate_room_code_of_length(ROOM_CODE_LENGTH)
}

/// Generate a clean room code of the requested length.
pub fn generate_room_code_of_length(length: usize) -> String {
    if length == 0 {
        return String::new();
    }
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..CLEAN_CHARS.len());
            // SAFETY: `idx` is produced by `random_range(0..len)`, so it is
            // always within [0, len).
            #[allow(clippy::indexing_slicing)]
            let ch = CLEAN_CHARS[idx] as char;
            ch
        })
        .collect()
}

/// Normalize a client-supplied code for lookup (trim + uppercase).
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
