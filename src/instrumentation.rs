//! Structured telemetry emission.
//!
//! Every handler-visible action emits one JSON object per line on the
//! `telemetry` tracing target. Entries share a base envelope
//! `{ts, level, component, event, request_id, correlation_id?, room_code?,
//! user_id?}` plus event-specific fields, and are validated against the
//! event schema table before emission. Validation failures emit
//! `error.instrumentation.failed` and re-raise in development builds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::protocol::UserId;
use crate::storage::StorageKey;

/// Severity of a telemetry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryLevel {
    Info,
    Warn,
    Error,
}

/// Event-specific payloads, one variant per schema entry.
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    LifecycleWake { hydrated_keys: usize },
    LifecycleConnect { connection_id: String, role: String },
    LifecycleDisconnect { connection_id: String, code: u16 },
    LifecycleReconnect { connection_id: String },

    StorageReadStart { key: StorageKey },
    StorageReadEnd { key: StorageKey, duration_ms: u64, success: bool },
    StorageWriteStart { key: StorageKey },
    StorageWriteEnd { key: StorageKey, duration_ms: u64, success: bool },
    StorageDelete { key: StorageKey, existed: bool },

    StateTransition { from: String, to: String },
    StateTransitionRejected { from: String, attempted: String },

    SeatAssign { seat_user_id: UserId, turn_order: u8 },
    SeatReserve { seat_user_id: UserId, deadline: DateTime<Utc> },
    SeatReclaimAttempt { seat_user_id: UserId },
    SeatReclaimResult { seat_user_id: UserId, outcome: String },
    SeatRelease { seat_user_id: UserId, cause: String },

    GameStart { players: usize },
    GameTurnStart { turn_user_id: UserId, turn_index: usize },
    GameRoll { turn_user_id: UserId, roll_number: u8 },
    GameScore { turn_user_id: UserId, category: String, points: u32 },
    GameComplete { winner_user_id: Option<UserId> },

    AlarmSchedule { kind: String, due_at: DateTime<Utc> },
    AlarmCancel { kind: String, count: usize },
    AlarmFire { kind: String },

    BroadcastPrepare { event_type: String, recipients: usize },
    BroadcastSent { event_type: String, delivered: usize, failed: usize },

    InviteCreate { invite_id: String, to_user_id: UserId },
    InviteResolve { invite_id: String, status: String },

    ErrorHandlerFailed { detail: String },
    ErrorStorageFailed { key: StorageKey, detail: String },
    ErrorBroadcastFailed { event_type: String, detail: String },
    ErrorLobbyNotifyFailed { detail: String, attempts: u32 },
    ErrorAlarmDispatchFailed { kind: String, detail: String },
    ErrorStateCorruption { key: StorageKey, detail: String },
    ErrorInstrumentationFailed { detail: String },
}

impl TelemetryEvent {
    /// Dotted event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LifecycleWake { .. } => "lifecycle.wake",
            Self::LifecycleConnect { .. } => "lifecycle.connect",
            Self::LifecycleDisconnect { .. } => "lifecycle.disconnect",
            Self::LifecycleReconnect { .. } => "lifecycle.reconnect",
            Self::StorageReadStart { .. } => "storage.read.start",
            Self::StorageReadEnd { .. } => "storage.read.end",
            Self::StorageWriteStart { .. } => "storage.write.start",
            Self::StorageWriteEnd { .. } => "storage.write.end",
            Self::StorageDelete { .. } => "storage.delete",
            Self::StateTransition { .. } => "state.transition",
            Self::StateTransitionRejected { .. } => "state.transition.rejected",
            Self::SeatAssign { .. } => "seat.assign",
            Self::SeatReserve { .. } => "seat.reserve",
            Self::SeatReclaimAttempt { .. } => "seat.reclaim.attempt",
            Self::SeatReclaimResult { .. } => "seat.reclaim.result",
            Self::SeatRelease { .. } => "seat.release",
            Self::GameStart { .. } => "game.start",
            Self::GameTurnStart { .. } => "game.turn.start",
            Self::GameRoll { .. } => "game.roll",
            Self::GameScore { .. } => "game.score",
            Self::GameComplete { .. } => "game.complete",
            Self::AlarmSchedule { .. } => "alarm.schedule",
            Self::AlarmCancel { .. } => "alarm.cancel",
            Self::AlarmFire { .. } => "alarm.fire",
            Self::BroadcastPrepare { .. } => "broadcast.prepare",
            Self::BroadcastSent { .. } => "broadcast.sent",
            Self::InviteCreate { .. } => "invite.create",
            Self::InviteResolve { .. } => "invite.resolve",
            Self::ErrorHandlerFailed { .. } => "error.handler.failed",
            Self::ErrorStorageFailed { .. } => "error.storage.failed",
            Self::ErrorBroadcastFailed { .. } => "error.broadcast.failed",
            Self::ErrorLobbyNotifyFailed { .. } => "error.lobby.notify.failed",
            Self::ErrorAlarmDispatchFailed { .. } => "error.alarm.dispatch.failed",
            Self::ErrorStateCorruption { .. } => "error.state.corruption",
            Self::ErrorInstrumentationFailed { .. } => "error.instrumentation.failed",
        }
    }

    /// Component owning the event: the first dotted segment.
    pub fn component(&self) -> &'static str {
        let name = self.name();
        name.split('.').next().unwrap_or(name)
    }

    pub fn level(&self) -> TelemetryLevel {
        match self {
            Self::ErrorHandlerFailed { .. }
            | Self::ErrorStorageFailed { .. }
            | Self::ErrorBroadcastFailed { .. }
            | Self::ErrorLobbyNotifyFailed { .. }
            | Self::ErrorAlarmDispatchFailed { .. }
            | Self::ErrorStateCorruption { .. }
            | Self::ErrorInstrumentationFailed { .. } => TelemetryLevel::Error,
            Self::StateTransitionRejected { .. } => TelemetryLevel::Warn,
            _ => TelemetryLevel::Info,
        }
    }

    fn fields(&self) -> Map<String, Value> {
        let value = match self {
            Self::LifecycleWake { hydrated_keys } => json!({ "hydrated_keys": hydrated_keys }),
            Self::LifecycleConnect { connection_id, role } => {
                json!({ "connection_id": connection_id, "role": role })
            }
            Self::LifecycleDisconnect { connection_id, code } => {
                json!({ "connection_id": connection_id, "code": code })
            }
            Self::LifecycleReconnect { connection_id } => {
                json!({ "connection_id": connection_id })
            }
            Self::StorageReadStart { key } | Self::StorageWriteStart { key } => {
                json!({ "key": key.as_str() })
            }
            Self::StorageReadEnd { key, duration_ms, success }
            | Self::StorageWriteEnd { key, duration_ms, success } => {
                json!({ "key": key.as_str(), "duration_ms": duration_ms, "success": success })
            }
            Self::StorageDelete { key, existed } => {
                json!({ "key": key.as_str(), "existed": existed })
            }
            Self::StateTransition { from, to } => json!({ "from": from, "to": to }),
            Self::StateTransitionRejected { from, attempted } => {
                json!({ "from": from, "attempted": attempted })
            }
            Self::SeatAssign { seat_user_id, turn_order } => {
                json!({ "seat_user_id": seat_user_id, "turn_order": turn_order })
            }
            Self::SeatReserve { seat_user_id, deadline } => {
                json!({ "seat_user_id": seat_user_id, "deadline": deadline })
            }
            Self::SeatReclaimAttempt { seat_user_id } => json!({ "seat_user_id": seat_user_id }),
            Self::SeatReclaimResult { seat_user_id, outcome } => {
                json!({ "seat_user_id": seat_user_id, "outcome": outcome })
            }
            Self::SeatRelease { seat_user_id, cause } => {
                json!({ "seat_user_id": seat_user_id, "cause": cause })
            }
            Self::GameStart { players } => json!({ "players": players }),
            Self::GameTurnStart { turn_user_id, turn_index } => {
                json!({ "turn_user_id": turn_user_id, "turn_index": turn_index })
            }
            Self::GameRoll { turn_user_id, roll_number } => {
                json!({ "turn_user_id": turn_user_id, "roll_number": roll_number })
            }
            Self::GameScore { turn_user_id, category, points } => {
                json!({ "turn_user_id": turn_user_id, "category": category, "points": points })
            }
            Self::GameComplete { winner_user_id } => json!({ "winner_user_id": winner_user_id }),
            Self::AlarmSchedule { kind, due_at } => json!({ "kind": kind, "due_at": due_at }),
            Self::AlarmCancel { kind, count } => json!({ "kind": kind, "count": count }),
            Self::AlarmFire { kind } => json!({ "kind": kind }),
            Self::BroadcastPrepare { event_type, recipients } => {
                json!({ "event_type": event_type, "recipients": recipients })
            }
            Self::BroadcastSent { event_type, delivered, failed } => {
                json!({ "event_type": event_type, "delivered": delivered, "failed": failed })
            }
            Self::InviteCreate { invite_id, to_user_id } => {
                json!({ "invite_id": invite_id, "to_user_id": to_user_id })
            }
            Self::InviteResolve { invite_id, status } => {
                json!({ "invite_id": invite_id, "status": status })
            }
            Self::ErrorHandlerFailed { detail } => json!({ "detail": detail }),
            Self::ErrorStorageFailed { key, detail } => {
                json!({ "key": key.as_str(), "detail": detail })
            }
            Self::ErrorBroadcastFailed { event_type, detail } => {
                json!({ "event_type": event_type, "detail": detail })
            }
            Self::ErrorLobbyNotifyFailed { detail, attempts } => {
                json!({ "detail": detail, "attempts": attempts })
            }
            Self::ErrorAlarmDispatchFailed { kind, detail } => {
                json!({ "kind": kind, "detail": detail })
            }
            Self::ErrorStateCorruption { key, detail } => {
                json!({ "key": key.as_str(), "detail": detail })
            }
            Self::ErrorInstrumentationFailed { detail } => json!({ "detail": detail }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Required event-specific fields per event name. Unknown event names fail
/// validation outright.
fn required_fields(event: &str) -> Option<&'static [&'static str]> {
    Some(match event {
        "lifecycle.wake" => &["hydrated_keys"],
        "lifecycle.connect" => &["connection_id", "role"],
        "lifecycle.disconnect" => &["connection_id", "code"],
        "lifecycle.reconnect" => &["connection_id"],
        "storage.read.start" | "storage.write.start" => &["key"],
        "storage.read.end" | "storage.write.end" => &["key", "duration_ms", "success"],
        "storage.delete" => &["key", "existed"],
        "state.transition" => &["from", "to"],
        "state.transition.rejected" => &["from", "attempted"],
        "seat.assign" => &["seat_user_id", "turn_order"],
        "seat.reserve" => &["seat_user_id", "deadline"],
        "seat.reclaim.attempt" => &["seat_user_id"],
        "seat.reclaim.result" => &["seat_user_id", "outcome"],
        "seat.release" => &["seat_user_id", "cause"],
        "game.start" => &["players"],
        "game.turn.start" => &["turn_user_id", "turn_index"],
        "game.roll" => &["turn_user_id", "roll_number"],
        "game.score" => &["turn_user_id", "category", "points"],
        "game.complete" => &["winner_user_id"],
        "alarm.schedule" => &["kind", "due_at"],
        "alarm.cancel" => &["kind", "count"],
        "alarm.fire" => &["kind"],
        "broadcast.prepare" => &["event_type", "recipients"],
        "broadcast.sent" => &["event_type", "delivered", "failed"],
        "invite.create" => &["invite_id", "to_user_id"],
        "invite.resolve" => &["invite_id", "status"],
        "error.handler.failed" => &["detail"],
        "error.storage.failed" => &["key", "detail"],
        "error.broadcast.failed" => &["event_type", "detail"],
        "error.lobby.notify.failed" => &["detail", "attempts"],
        "error.alarm.dispatch.failed" => &["kind", "detail"],
        "error.state.corruption" => &["key", "detail"],
        "error.instrumentation.failed" => &["detail"],
        _ => return None,
    })
}

/// Validate a fully-assembled entry against the schema.
pub fn validate_entry(entry: &Value) -> Result<(), String> {
    let obj = entry.as_object().ok_or("entry is not an object")?;

    for base in ["ts", "level", "component", "event", "request_id"] {
        if !obj.contains_key(base) {
            return Err(format!("missing base field '{base}'"));
        }
    }

    let event = obj
        .get("event")
        .and_then(Value::as_str)
        .ok_or("'event' is not a string")?;
    let component = obj
        .get("component")
        .and_then(Value::as_str)
        .ok_or("'component' is not a string")?;
    if !event.starts_with(component) {
        return Err(format!("event '{event}' does not belong to component '{component}'"));
    }

    let required = required_fields(event).ok_or_else(|| format!("unknown event '{event}'"))?;
    for field in required {
        if !obj.contains_key(*field) {
            return Err(format!("event '{event}' missing required field '{field}'"));
        }
    }
    Ok(())
}

#[derive(Debug, Default, Clone)]
struct CurrentContext {
    request_id: u64,
    correlation_id: Option<String>,
    user_id: Option<UserId>,
}

/// Per-room telemetry emitter.
///
/// The room actor is single-threaded, so the "current request" context set
/// by [`Telemetry::begin_request`] is stable for the duration of a handler
/// and stamped on every entry the handler emits.
#[derive(Debug)]
pub struct Telemetry {
    room_code: Option<String>,
    next_request_id: AtomicU64,
    current: Mutex<CurrentContext>,
}

impl Telemetry {
    pub fn for_room(room_code: impl Into<String>) -> Self {
        Self {
            room_code: Some(room_code.into()),
            next_request_id: AtomicU64::new(1),
            current: Mutex::new(CurrentContext::default()),
        }
    }

    /// Start a handler-scoped request context; returns the request id.
    pub fn begin_request(&self, correlation_id: Option<String>, user_id: Option<UserId>) -> u64 {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let mut current = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *current = CurrentContext {
            request_id,
            correlation_id,
            user_id,
        };
        request_id
    }

    /// Correlation id of the in-flight request, for stamping outbound frames.
    pub fn current_correlation(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .correlation_id
            .clone()
    }

    /// Emit one telemetry entry. Invalid entries are replaced by an
    /// `error.instrumentation.failed` entry (and re-raised in dev builds).
    pub fn emit(&self, event: &TelemetryEvent) {
        let entry = self.assemble(event);
        if let Err(violation) = validate_entry(&entry) {
            debug_assert!(false, "telemetry schema violation: {violation}");
            let fallback = TelemetryEvent::ErrorInstrumentationFailed {
                detail: format!("{}: {violation}", event.name()),
            };
            let fallback_entry = self.assemble(&fallback);
            // The fallback is schema-valid by construction
            Self::write(&fallback, &fallback_entry);
            return;
        }
        Self::write(event, &entry);
    }

    fn assemble(&self, event: &TelemetryEvent) -> Value {
        let current = self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        let mut obj = Map::new();
        obj.insert("ts".into(), json!(Utc::now()));
        obj.insert("level".into(), json!(event.level()));
        obj.insert("component".into(), json!(event.component()));
        obj.insert("event".into(), json!(event.name()));
        obj.insert("request_id".into(), json!(current.request_id));
        if let Some(correlation_id) = current.correlation_id {
            obj.insert("correlation_id".into(), json!(correlation_id));
        }
        if let Some(room_code) = &self.room_code {
            obj.insert("room_code".into(), json!(room_code));
        }
        if let Some(user_id) = current.user_id {
            obj.insert("user_id".into(), json!(user_id));
        }
        for (key, value) in event.fields() {
            obj.insert(key, value);
        }
        Value::Object(obj)
    }

    fn write(event: &TelemetryEvent, entry: &Value) {
        let line = entry.to_string();
        match event.level() {
            TelemetryLevel::Info => tracing::info!(target: "telemetry", entry = %line),
            TelemetryLevel::Warn => tracing::warn!(target: "telemetry", entry = %line),
            TelemetryLevel::Error => tracing::error!(target: "telemetry", entry = %line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_events() -> Vec<TelemetryEvent> {
        let user = Uuid::new_v4();
        vec![
            TelemetryEvent::LifecycleWake { hydrated_keys: 4 },
            TelemetryEvent::LifecycleConnect {
                connection_id: "c1".into(),
                role: "player".into(),
            },
            TelemetryEvent::LifecycleDisconnect {
                connection_id: "c1".into(),
                code: 1001,
            },
            TelemetryEvent::LifecycleReconnect { connection_id: "c2".into() },
            TelemetryEvent::StorageReadStart { key: StorageKey::Room },
            TelemetryEvent::StorageReadEnd {
                key: StorageKey::Room,
                duration_ms: 2,
                success: true,
            },
            TelemetryEvent::StorageWriteStart { key: StorageKey::Seats },
            TelemetryEvent::StorageWriteEnd {
                key: StorageKey::Seats,
                duration_ms: 1,
                success: true,
            },
            TelemetryEvent::StorageDelete { key: StorageKey::Game, existed: true },
            TelemetryEvent::StateTransition { from: "waiting".into(), to: "starting".into() },
            TelemetryEvent::StateTransitionRejected {
                from: "waiting".into(),
                attempted: "paused".into(),
            },
            TelemetryEvent::SeatAssign { seat_user_id: user, turn_order: 0 },
            TelemetryEvent::SeatReserve { seat_user_id: user, deadline: Utc::now() },
            TelemetryEvent::SeatReclaimAttempt { seat_user_id: user },
            TelemetryEvent::SeatReclaimResult {
                seat_user_id: user,
                outcome: "reclaimed".into(),
            },
            TelemetryEvent::SeatRelease { seat_user_id: user, cause: "timeout".into() },
            TelemetryEvent::GameStart { players: 2 },
            TelemetryEvent::GameTurnStart { turn_user_id: user, turn_index: 1 },
            TelemetryEvent::GameRoll { turn_user_id: user, roll_number: 2 },
            TelemetryEvent::GameScore {
                turn_user_id: user,
                category: "chance".into(),
                points: 17,
            },
            TelemetryEvent::GameComplete { winner_user_id: Some(user) },
            TelemetryEvent::AlarmSchedule { kind: "seat_expiration".into(), due_at: Utc::now() },
            TelemetryEvent::AlarmCancel { kind: "seat_expiration".into(), count: 1 },
            TelemetryEvent::AlarmFire { kind: "pause_timeout".into() },
            TelemetryEvent::BroadcastPrepare { event_type: "CHAT_MESSAGE".into(), recipients: 3 },
            TelemetryEvent::BroadcastSent {
                event_type: "CHAT_MESSAGE".into(),
                delivered: 3,
                failed: 0,
            },
            TelemetryEvent::InviteCreate { invite_id: "i1".into(), to_user_id: user },
            TelemetryEvent::InviteResolve { invite_id: "i1".into(), status: "expired".into() },
            TelemetryEvent::ErrorHandlerFailed { detail: "boom".into() },
            TelemetryEvent::ErrorStorageFailed { key: StorageKey::Room, detail: "io".into() },
            TelemetryEvent::ErrorBroadcastFailed {
                event_type: "PONG".into(),
                detail: "closed".into(),
            },
            TelemetryEvent::ErrorLobbyNotifyFailed { detail: "timeout".into(), attempts: 5 },
            TelemetryEvent::ErrorAlarmDispatchFailed {
                kind: "turn_timeout".into(),
                detail: "bad payload".into(),
            },
            TelemetryEvent::ErrorStateCorruption {
                key: StorageKey::AlarmQueue,
                detail: "not an array".into(),
            },
            TelemetryEvent::ErrorInstrumentationFailed { detail: "schema".into() },
        ]
    }

    #[test]
    fn every_variant_assembles_a_valid_entry() {
        let telemetry = Telemetry::for_room("AB23CD");
        telemetry.begin_request(Some("corr-1".into()), Some(Uuid::new_v4()));
        for event in sample_events() {
            let entry = telemetry.assemble(&event);
            validate_entry(&entry).unwrap_or_else(|violation| {
                panic!("{} failed validation: {violation}", event.name());
            });
        }
    }

    #[test]
    fn base_envelope_carries_context() {
        let telemetry = Telemetry::for_room("AB23CD");
        let user = Uuid::new_v4();
        let request_id = telemetry.begin_request(Some("corr-9".into()), Some(user));
        let entry = telemetry.assemble(&TelemetryEvent::GameStart { players: 3 });

        assert_eq!(entry["request_id"], request_id);
        assert_eq!(entry["correlation_id"], "corr-9");
        assert_eq!(entry["room_code"], "AB23CD");
        assert_eq!(entry["user_id"], json!(user));
        assert_eq!(entry["component"], "game");
        assert_eq!(entry["event"], "game.start");
    }

    #[test]
    fn request_ids_are_monotonic() {
        let telemetry = Telemetry::for_room("AB23CD");
        let first = telemetry.begin_request(None, None);
        let second = telemetry.begin_request(None, None);
        assert!(second > first);
    }

    #[test]
    fn unknown_event_fails_validation() {
        let entry = json!({
            "ts": Utc::now(),
            "level": "info",
            "component": "game",
            "event": "game.unknowable",
            "request_id": 1,
        });
        assert!(validate_entry(&entry).is_err());
    }

    #[test]
    fn missing_required_field_fails_validation() {
        let entry = json!({
            "ts": Utc::now(),
            "level": "info",
            "component": "broadcast",
            "event": "broadcast.sent",
            "request_id": 1,
            "event_type": "PONG",
            "delivered": 2,
            // "failed" omitted
        });
        let violation = validate_entry(&entry).unwrap_err();
        assert!(violation.contains("failed"));
    }

    #[test]
    fn component_must_prefix_event() {
        let entry = json!({
            "ts": Utc::now(),
            "level": "info",
            "component": "seat",
            "event": "game.start",
            "request_id": 1,
            "players": 2,
        });
        assert!(validate_entry(&entry).is_err());
    }
}
