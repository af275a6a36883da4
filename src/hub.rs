//! Room directory.
//!
//! Maps room codes to live actor mailboxes. Storage and the per-room alarm
//! driver outlive the actor: a retired (hibernated) actor leaves both in
//! place, and the next event, including an alarm firing with no actor
//! running, spawns a fresh incarnation that rehydrates from storage.

use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::alarm::{AlarmDriver, TokioAlarmDriver};
use crate::protocol::{ConnectionId, ErrorCode, InviteId, Role, UserId};
use crate::room::{OutboundSink, RoomActor, RoomDeps, RoomEvent};
use crate::storage::InMemoryStorage;

const MAILBOX_CAPACITY: usize = 256;
const SEND_RETRIES: usize = 3;

struct RoomSlot {
    slot_id: Uuid,
    tx: mpsc::Sender<RoomEvent>,
    cancel: CancellationToken,
}

/// Directory of room actors keyed by room code.
pub struct RoomHub {
    deps: RoomDeps,
    rooms: DashMap<String, RoomSlot>,
    storages: DashMap<String, Arc<InMemoryStorage>>,
    drivers: DashMap<String, Arc<TokioAlarmDriver>>,
    /// Serializes actor spawns so one code never gets two incarnations
    spawn_lock: Mutex<()>,
    shutdown: CancellationToken,
}

impl RoomHub {
    pub fn new(deps: RoomDeps) -> Arc<Self> {
        Arc::new(Self {
            deps,
            rooms: DashMap::new(),
            storages: DashMap::new(),
            drivers: DashMap::new(),
            spawn_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Admit a socket to a room, spawning or waking the actor as needed.
    pub async fn open_socket(
        self: &Arc<Self>,
        code: &str,
        connection_id: ConnectionId,
        user_id: UserId,
        display_name: String,
        sink: OutboundSink,
    ) -> Result<Role, ErrorCode> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_event(
            code,
            RoomEvent::SocketOpened {
                connection_id,
                user_id,
                display_name,
                sink,
                reply: reply_tx,
            },
        )
        .await?;
        reply_rx.await.map_err(|_| ErrorCode::Internal)?
    }

    /// Deliver any room event, waking a hibernated actor if necessary.
    pub async fn send_event(self: &Arc<Self>, code: &str, event: RoomEvent) -> Result<(), ErrorCode> {
        let mut event = event;
        for _ in 0..SEND_RETRIES {
            let tx = self.ensure_room(code).await?;
            match tx.send(event).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    // The actor retired between lookup and send; drop the
                    // stale slot and respawn
                    self.rooms.remove_if(code, |_, slot| slot.tx.is_closed());
                    event = returned;
                }
            }
        }
        Err(ErrorCode::Internal)
    }

    /// Invite answers relayed from the lobby.
    pub async fn deliver_invite_answer(
        self: &Arc<Self>,
        code: &str,
        invite_id: InviteId,
        user_id: UserId,
        display_name: String,
        accept: bool,
    ) -> Result<(), ErrorCode> {
        self.send_event(
            code,
            RoomEvent::InviteAnswer {
                invite_id,
                user_id,
                display_name,
                accept,
            },
        )
        .await
    }

    pub fn live_room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Cancel every live actor; used on server shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        for slot in self.rooms.iter() {
            slot.cancel.cancel();
        }
    }

    async fn ensure_room(self: &Arc<Self>, code: &str) -> Result<mpsc::Sender<RoomEvent>, ErrorCode> {
        if let Some(slot) = self.rooms.get(code) {
            return Ok(slot.tx.clone());
        }

        let _guard = self.spawn_lock.lock().await;
        // Double-check under the lock
        if let Some(slot) = self.rooms.get(code) {
            return Ok(slot.tx.clone());
        }

        let storage = self
            .storages
            .entry(code.to_string())
            .or_insert_with(|| Arc::new(InMemoryStorage::new()))
            .clone();
        let driver = self.driver_for(code);

        let actor = RoomActor::hydrate(
            code.to_string(),
            self.deps.clone(),
            storage,
            driver as Arc<dyn AlarmDriver>,
        )
        .await
        .map_err(|e| {
            tracing::error!(room_code = %code, error = %e, "Failed to hydrate room actor");
            ErrorCode::Internal
        })?;

        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let cancel = self.shutdown.child_token();
        let slot_id = Uuid::new_v4();
        self.rooms.insert(
            code.to_string(),
            RoomSlot {
                slot_id,
                tx: tx.clone(),
                cancel: cancel.clone(),
            },
        );

        let hub = Arc::downgrade(self);
        let exit_code = code.to_string();
        tokio::spawn(actor.run(rx, cancel, move || {
            if let Some(hub) = hub.upgrade() {
                hub.rooms.remove_if(&exit_code, |_, slot| slot.slot_id == slot_id);
            }
        }));

        Ok(tx)
    }

    /// One driver per code for the lifetime of the process: the single
    /// alarm slot survives actor hibernation.
    fn driver_for(self: &Arc<Self>, code: &str) -> Arc<TokioAlarmDriver> {
        if let Some(driver) = self.drivers.get(code) {
            return driver.clone();
        }
        let hub: Weak<RoomHub> = Arc::downgrade(self);
        let fire_code = code.to_string();
        let driver = Arc::new(TokioAlarmDriver::new(Arc::new(move || {
            let Some(hub) = hub.upgrade() else {
                return;
            };
            let code = fire_code.clone();
            tokio::spawn(async move {
                if let Err(e) = hub.send_event(&code, RoomEvent::AlarmFired).await {
                    tracing::warn!(room_code = %code, error = ?e, "Alarm wake failed");
                }
            });
        })));
        self.drivers.insert(code.to_string(), driver.clone());
        driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::Config;
    use crate::game::{FastrandRoller, GreedyPolicy, ScoreLowestPolicy};
    use crate::lobby::NoopLobbyNotifier;
    use crate::metrics::ServerMetrics;
    use crate::retry::RetryConfig;

    fn deps() -> RoomDeps {
        RoomDeps {
            config: Arc::new(Config::default()),
            clock: Arc::new(SystemClock),
            metrics: Arc::new(ServerMetrics::new()),
            lobby: Arc::new(NoopLobbyNotifier),
            lobby_retry: RetryConfig::fast(),
            roller: Arc::new(FastrandRoller),
            ai_policy: Arc::new(GreedyPolicy),
            timeout_policy: Arc::new(ScoreLowestPolicy),
        }
    }

    fn sink() -> (OutboundSink, mpsc::Receiver<crate::room::SocketOutput>) {
        let (tx, rx) = mpsc::channel(64);
        (OutboundSink::new(tx), rx)
    }

    #[tokio::test]
    async fn first_socket_creates_the_room_as_host() {
        let hub = RoomHub::new(deps());
        let (sink, mut rx) = sink();
        let role = hub
            .open_socket("AB23CD", Uuid::new_v4(), Uuid::new_v4(), "host".into(), sink)
            .await
            .unwrap();
        assert_eq!(role, Role::Player);
        assert_eq!(hub.live_room_count(), 1);

        // The CONNECTED snapshot arrives on the new socket
        let output = rx.recv().await.unwrap();
        match output {
            crate::room::SocketOutput::Frame(bytes) => {
                let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(json["type"], "CONNECTED");
                assert_eq!(json["payload"]["roomCode"], "AB23CD");
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_code_reuses_the_actor() {
        let hub = RoomHub::new(deps());
        let (sink_a, _rx_a) = sink();
        let (sink_b, _rx_b) = sink();
        hub.open_socket("AB23CD", Uuid::new_v4(), Uuid::new_v4(), "a".into(), sink_a)
            .await
            .unwrap();
        hub.open_socket("AB23CD", Uuid::new_v4(), Uuid::new_v4(), "b".into(), sink_b)
            .await
            .unwrap();
        assert_eq!(hub.live_room_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_actors() {
        let hub = RoomHub::new(deps());
        let (sink_a, _rx_a) = sink();
        hub.open_socket("AB23CD", Uuid::new_v4(), Uuid::new_v4(), "a".into(), sink_a)
            .await
            .unwrap();
        hub.shutdown();
        // The actor removes itself from the directory on exit
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while hub.live_room_count() > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
