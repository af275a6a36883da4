//! Configuration loading and environment parsing.

use super::validation::validate_config;
use super::Config;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Load configuration with the following precedence (highest first):
/// 1) File pointed at by `ROLLHOUSE_CONFIG_PATH`
/// 2) `config.json` in the current working directory
/// 3) Defaults compiled into the binary
///
/// Individual fields can be overridden by environment variables with the
/// `ROLLHOUSE` prefix using `__` as a nested separator, e.g.
/// `ROLLHOUSE__PORT=8080` or `ROLLHOUSE__ROOM__RECLAIM_WINDOW_MS=60000`.
/// The spec-level knobs also accept their bare names (`RECLAIM_WINDOW_MS`,
/// `PAUSE_TIMEOUT_MS`, `PAUSE_DEBOUNCE_MS`, `INVITE_TTL_MS`,
/// `MAX_CHAT_MESSAGES`, `MAX_MESSAGE_LEN`, `MAX_PLAYERS`).
///
/// Errors while reading/parsing are printed to stderr and defaults are used;
/// `load()` always returns a `Config`. Callers who need hard failure call
/// [`validate_config`] on the result themselves.
#[must_use]
pub fn load() -> Config {
    use std::env;
    use std::path::PathBuf;

    let defaults = Config::default();
    let mut merged =
        serde_json::to_value(&defaults).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    if let Ok(path) = env::var("ROLLHOUSE_CONFIG_PATH") {
        merge_file_source(&mut merged, &PathBuf::from(path));
    }

    merge_file_source(&mut merged, &PathBuf::from("config.json"));

    apply_env_overrides(&mut merged);
    apply_bare_room_overrides(&mut merged);

    let config = match serde_json::from_value::<Config>(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to deserialize config; using defaults: {e}");
            defaults
        }
    };

    // Warn-only here; main.rs re-runs validation and propagates errors
    if let Err(e) = validate_config(&config) {
        eprintln!("Configuration validation error: {e}");
    }

    config
}

fn merge_file_source(target: &mut Value, path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => merge_values(target, value),
            Err(err) => eprintln!("Failed to parse config from {}: {err}", path.display()),
        },
        Err(err) => {
            eprintln!("Failed to read config from {}: {err}", path.display());
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value;
        }
    }
}

fn apply_env_overrides(root: &mut Value) {
    for (key, raw_value) in std::env::vars() {
        let Some(stripped) = key.strip_prefix("ROLLHOUSE__") else {
            continue;
        };

        let segments: Vec<String> = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();

        if segments.is_empty() {
            continue;
        }

        let value = parse_scalar(raw_value.trim());
        set_nested_value(root, &segments, value);
    }
}

/// The knobs named by the deployment environment keep their bare, flat names.
fn apply_bare_room_overrides(root: &mut Value) {
    const ROOM_KEYS: [(&str, &str); 7] = [
        ("RECLAIM_WINDOW_MS", "reclaim_window_ms"),
        ("PAUSE_TIMEOUT_MS", "pause_timeout_ms"),
        ("PAUSE_DEBOUNCE_MS", "pause_debounce_ms"),
        ("INVITE_TTL_MS", "invite_ttl_ms"),
        ("MAX_CHAT_MESSAGES", "max_chat_messages"),
        ("MAX_MESSAGE_LEN", "max_message_len"),
        ("MAX_PLAYERS", "max_players"),
    ];

    for (env_name, field) in ROOM_KEYS {
        if let Ok(raw) = std::env::var(env_name) {
            let value = parse_scalar(raw.trim());
            set_nested_value(root, &["room".to_string(), field.to_string()], value);
        }
    }
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested_value(target: &mut Value, segments: &[String], value: Value) {
    match segments {
        [] => *target = value,
        [leaf] => {
            ensure_object(target).insert(leaf.clone(), value);
        }
        [head, rest @ ..] => {
            let entry = ensure_object(target)
                .entry(head.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            set_nested_value(entry, rest, value);
        }
    }
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }

    // SAFETY: The branch above guarantees `value` is a `Value::Object`, so
    // `as_object_mut()` will always return `Some`.
    #[allow(clippy::expect_used)]
    value
        .as_object_mut()
        .expect("value should be coerced into an object")
}
