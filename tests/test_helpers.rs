//! Shared harness for room-actor integration tests.
//!
//! Drives the actor directly with a manual clock and a manual alarm driver,
//! so deadlines, debounces and alarm ordering are fully deterministic.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use rollhouse_server::alarm::{AlarmDriver, AlarmKind, ManualAlarmDriver};
use rollhouse_server::clock::ManualClock;
use rollhouse_server::config::Config;
use rollhouse_server::game::{DiceRoller, GreedyPolicy, ScoreLowestPolicy};
use rollhouse_server::lobby::{ChannelLobbyNotifier, LobbyNotification};
use rollhouse_server::metrics::ServerMetrics;
use rollhouse_server::protocol::{ConnectionId, ErrorCode, Role, RoomStatus, SocketAttachment, UserId};
use rollhouse_server::retry::RetryConfig;
use rollhouse_server::room::{OutboundSink, RoomActor, RoomDeps, SocketOutput};
use rollhouse_server::storage::InMemoryStorage;

pub const ROOM_CODE: &str = "AB23CD";

/// Deterministic dice: pops scripted faces, repeats the last one forever.
pub struct ScriptedRoller {
    faces: Mutex<Vec<u8>>,
}

impl ScriptedRoller {
    pub fn new(faces: &[u8]) -> Self {
        let mut reversed: Vec<u8> = faces.to_vec();
        reversed.reverse();
        Self {
            faces: Mutex::new(reversed),
        }
    }
}

impl DiceRoller for ScriptedRoller {
    fn roll_die(&self) -> u8 {
        let mut faces = self.faces.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match faces.len() {
            0 => 1,
            1 => faces[0],
            _ => faces.pop().unwrap_or(1),
        }
    }
}

/// One fake client socket: its id, identity, and captured output frames.
pub struct TestSocket {
    pub connection_id: ConnectionId,
    pub attachment: SocketAttachment,
    pub rx: mpsc::Receiver<SocketOutput>,
}

impl TestSocket {
    /// Drain every frame queued so far, parsed as JSON.
    pub fn frames(&mut self) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(output) = self.rx.try_recv() {
            if let SocketOutput::Frame(bytes) = output {
                if let Ok(json) = serde_json::from_slice(&bytes) {
                    frames.push(json);
                }
            }
        }
        frames
    }

    /// Drain frames and return only those of the given type tag.
    pub fn frames_of(&mut self, type_tag: &str) -> Vec<serde_json::Value> {
        self.frames()
            .into_iter()
            .filter(|f| f["type"] == type_tag)
            .collect()
    }

    /// The close sent by the server, if any.
    pub fn close_frame(&mut self) -> Option<(u16, String)> {
        while let Ok(output) = self.rx.try_recv() {
            if let SocketOutput::Close { code, reason } = output {
                return Some((code, reason));
            }
        }
        None
    }
}

pub struct RoomHarness {
    pub actor: RoomActor,
    pub clock: ManualClock,
    pub driver: Arc<ManualAlarmDriver>,
    pub backend: Arc<InMemoryStorage>,
    pub lobby_rx: mpsc::Receiver<LobbyNotification>,
    pub metrics: Arc<ServerMetrics>,
    pub config: Arc<Config>,
    pub roller: Arc<dyn DiceRoller>,
}

impl RoomHarness {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        Self::build(tweak, Arc::new(rollhouse_server::game::FastrandRoller)).await
    }

    pub async fn with_dice(faces: &[u8]) -> Self {
        Self::build(|_| {}, Arc::new(ScriptedRoller::new(faces))).await
    }

    pub async fn with_config_and_dice(tweak: impl FnOnce(&mut Config), faces: &[u8]) -> Self {
        Self::build(tweak, Arc::new(ScriptedRoller::new(faces))).await
    }

    async fn build(tweak: impl FnOnce(&mut Config), roller: Arc<dyn DiceRoller>) -> Self {
        let mut config = Config::default();
        tweak(&mut config);
        let config = Arc::new(config);

        let clock = ManualClock::new(Utc::now());
        let driver = Arc::new(ManualAlarmDriver::new());
        let backend = Arc::new(InMemoryStorage::new());
        let metrics = Arc::new(ServerMetrics::new());
        let (lobby_tx, lobby_rx) = mpsc::channel(256);

        let deps = RoomDeps {
            config: Arc::clone(&config),
            clock: Arc::new(clock.clone()),
            metrics: Arc::clone(&metrics),
            lobby: Arc::new(ChannelLobbyNotifier::new(lobby_tx)),
            lobby_retry: RetryConfig::fast(),
            roller: Arc::clone(&roller),
            ai_policy: Arc::new(GreedyPolicy),
            timeout_policy: Arc::new(ScoreLowestPolicy),
        };

        let actor = RoomActor::hydrate(
            ROOM_CODE.to_string(),
            deps,
            Arc::clone(&backend) as Arc<dyn rollhouse_server::storage::StorageBackend>,
            Arc::clone(&driver) as Arc<dyn AlarmDriver>,
        )
        .await
        .expect("hydrate");

        Self {
            actor,
            clock,
            driver,
            backend,
            lobby_rx,
            metrics,
            config,
            roller,
        }
    }

    /// Re-create the actor from the same storage, as after hibernation.
    pub async fn rehydrate(&mut self) {
        let deps = RoomDeps {
            config: Arc::clone(&self.config),
            clock: Arc::new(self.clock.clone()),
            metrics: Arc::clone(&self.metrics),
            lobby: Arc::new(rollhouse_server::lobby::NoopLobbyNotifier),
            lobby_retry: RetryConfig::fast(),
            roller: Arc::clone(&self.roller),
            ai_policy: Arc::new(GreedyPolicy),
            timeout_policy: Arc::new(ScoreLowestPolicy),
        };
        self.actor = RoomActor::hydrate(
            ROOM_CODE.to_string(),
            deps,
            Arc::clone(&self.backend) as Arc<dyn rollhouse_server::storage::StorageBackend>,
            Arc::clone(&self.driver) as Arc<dyn AlarmDriver>,
        )
        .await
        .expect("rehydrate");
    }

    /// Open a socket for `user`; panics if the actor rejects it.
    pub async fn connect(&mut self, user_id: UserId, name: &str) -> TestSocket {
        self.try_connect(user_id, name)
            .await
            .unwrap_or_else(|e| panic!("connect rejected: {e:?}"))
    }

    pub async fn try_connect(
        &mut self,
        user_id: UserId,
        name: &str,
    ) -> Result<TestSocket, ErrorCode> {
        let connection_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(256);
        let role = self
            .actor
            .handle_socket_opened(connection_id, user_id, name.to_string(), OutboundSink::new(tx))
            .await?;
        Ok(TestSocket {
            connection_id,
            attachment: SocketAttachment {
                user_id,
                display_name: name.to_string(),
                role,
            },
            rx,
        })
    }

    pub async fn close(&mut self, socket: &TestSocket, code: u16) {
        self.actor.handle_socket_closed(socket.connection_id, code).await;
    }

    /// Send a raw command frame from this socket.
    pub async fn send(&mut self, socket: &TestSocket, frame: serde_json::Value) {
        self.actor
            .handle_client_frame(socket.connection_id, &socket.attachment, &frame.to_string())
            .await;
    }

    /// Advance the clock and fire the alarm handler, as the runtime would.
    pub async fn advance_and_fire(&mut self, millis: i64) {
        self.clock.advance_ms(millis);
        self.actor.handle_alarm_fired().await;
    }

    pub fn status(&self) -> RoomStatus {
        self.actor.room_record().map(|r| r.status).expect("room exists")
    }

    pub fn seat_count(&self) -> usize {
        self.actor.seat_registry().len()
    }

    pub fn alarm_kinds(&self) -> HashMap<AlarmKind, usize> {
        let mut kinds = HashMap::new();
        for entry in self.actor.alarm_queue().iter() {
            *kinds.entry(entry.kind).or_insert(0) += 1;
        }
        kinds
    }

    pub fn deadline_of(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.actor
            .seat_registry()
            .get(user_id)
            .and_then(|s| s.reconnect_deadline)
    }

    /// The §8 invariants that must hold after every handler.
    pub fn assert_invariants(&self) {
        let registry = self.actor.seat_registry();
        assert!(registry.invariants_hold(), "seat invariants violated");

        // Every disconnected human seat has a matching SEAT_EXPIRATION entry
        for seat in registry.iter().filter(|s| !s.is_connected && !s.is_ai) {
            let deadline = seat.reconnect_deadline.expect("deadline set");
            let matched = self.actor.alarm_queue().iter().any(|e| {
                e.kind == AlarmKind::SeatExpiration
                    && e.due_at == deadline
                    && e.payload["userId"] == serde_json::json!(seat.user_id)
            });
            assert!(matched, "no seat-expiration alarm for {}", seat.user_id);
        }

        // The runtime slot always holds the soonest due time
        let soonest = self.actor.alarm_queue().peek_next().map(|e| e.due_at);
        assert_eq!(self.driver.current(), soonest, "alarm slot out of sync");

        // paused <=> pausedAt set and exactly one PAUSE_TIMEOUT entry
        if let Some(room) = self.actor.room_record() {
            let paused = room.status == RoomStatus::Paused;
            assert_eq!(paused, room.paused_at.is_some(), "pausedAt mismatch");
            let pause_timeouts = self.actor.alarm_queue().count_kind(AlarmKind::PauseTimeout);
            assert_eq!(
                paused,
                pause_timeouts == 1,
                "pause timeout entries: {pause_timeouts} while paused={paused}"
            );
        }
    }
}

/// Build a command frame.
pub fn cmd(kind: &str) -> serde_json::Value {
    serde_json::json!({ "type": kind })
}

pub fn cmd_with(kind: &str, payload: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "type": kind, "payload": payload })
}

pub fn cmd_corr(kind: &str, payload: serde_json::Value, correlation: &str) -> serde_json::Value {
    serde_json::json!({ "type": kind, "payload": payload, "correlationId": correlation })
}

/// Start a two-player game and return (harness, host socket, guest socket).
pub async fn playing_room(faces: &[u8]) -> (RoomHarness, TestSocket, TestSocket, UserId, UserId) {
    let mut harness = RoomHarness::with_dice(faces).await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let mut host_socket = harness.connect(host, "hostess").await;
    let mut guest_socket = harness.connect(guest, "guest").await;
    harness.send(&host_socket, cmd("START_GAME")).await;
    assert_eq!(harness.status(), RoomStatus::Playing);
    // Clear setup noise from both sockets
    host_socket.frames();
    guest_socket.frames();
    (harness, host_socket, guest_socket, host, guest)
}

/// Role shortcut used by tests.
pub fn is_player(socket: &TestSocket) -> bool {
    socket.attachment.role == Role::Player
}
