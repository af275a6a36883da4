//! Multi-typed alarm queue over the runtime's single alarm slot.
//!
//! The runtime gives each room exactly one settable deadline. The queue
//! multiplexes typed entries over it: after every mutation the slot is set to
//! the soonest due time (or cleared when empty), and the whole queue is
//! persisted so a hibernated actor wakes with its schedule intact. Scheduling
//! a pause timeout must never clobber a pending seat expiration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::instrumentation::{Telemetry, TelemetryEvent};
use crate::metrics::ServerMetrics;
use crate::storage::{RoomStorage, StorageError, StorageKey};

/// Typed scheduled events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    SeatExpiration,
    PauseDebounce,
    PauseTimeout,
    TurnTimeout,
    InviteExpiration,
    TypingExpiry,
}

impl AlarmKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlarmKind::SeatExpiration => "seat_expiration",
            AlarmKind::PauseDebounce => "pause_debounce",
            AlarmKind::PauseTimeout => "pause_timeout",
            AlarmKind::TurnTimeout => "turn_timeout",
            AlarmKind::InviteExpiration => "invite_expiration",
            AlarmKind::TypingExpiry => "typing_expiry",
        }
    }
}

impl std::fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical scheduled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmEntry {
    pub id: Uuid,
    pub kind: AlarmKind,
    pub due_at: DateTime<Utc>,
    /// Insertion order, the tie-break for entries due at the same instant
    pub seq: u64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// The runtime's single alarm slot.
///
/// `set(None)` clears the slot. `current()` reports what the slot holds so
/// the at-most-one-alarm invariant is directly observable.
pub trait AlarmDriver: Send + Sync {
    fn set(&self, due: Option<DateTime<Utc>>);
    fn current(&self) -> Option<DateTime<Utc>>;
}

/// Driver that only records the deadline; tests fire it by hand.
#[derive(Debug, Default)]
pub struct ManualAlarmDriver {
    current: Mutex<Option<DateTime<Utc>>>,
}

impl ManualAlarmDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlarmDriver for ManualAlarmDriver {
    fn set(&self, due: Option<DateTime<Utc>>) {
        *self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = due;
    }

    fn current(&self) -> Option<DateTime<Utc>> {
        *self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

struct TokioDriverState {
    current: Option<DateTime<Utc>>,
    task: Option<JoinHandle<()>>,
}

/// Production driver: one tokio sleep task backs the slot. Setting a new
/// deadline replaces the previous task, so at most one timer exists.
pub struct TokioAlarmDriver {
    state: Mutex<TokioDriverState>,
    on_fire: Arc<dyn Fn() + Send + Sync>,
}

impl TokioAlarmDriver {
    pub fn new(on_fire: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self {
            state: Mutex::new(TokioDriverState {
                current: None,
                task: None,
            }),
            on_fire,
        }
    }
}

impl AlarmDriver for TokioAlarmDriver {
    fn set(&self, due: Option<DateTime<Utc>>) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.current = due;

        if let Some(due) = due {
            let delay = (due - Utc::now()).to_std().unwrap_or_default();
            let on_fire = Arc::clone(&self.on_fire);
            state.task = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                on_fire();
            }));
        }
    }

    fn current(&self) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .current
    }
}

impl Drop for TokioAlarmDriver {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }
}

/// Persisted queue shape under the `alarm_queue` key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedQueue {
    entries: Vec<AlarmEntry>,
    next_seq: u64,
}

/// The alarm queue owned by one room actor.
pub struct AlarmQueue {
    entries: Vec<AlarmEntry>,
    next_seq: u64,
    driver: Arc<dyn AlarmDriver>,
    storage: RoomStorage,
    telemetry: Arc<Telemetry>,
    metrics: Arc<ServerMetrics>,
}

impl AlarmQueue {
    /// Load the queue from storage and sync the driver.
    ///
    /// A malformed or unsupported stored queue self-heals to empty: the
    /// corruption is reported and the actor keeps running.
    pub async fn load(
        storage: RoomStorage,
        driver: Arc<dyn AlarmDriver>,
        telemetry: Arc<Telemetry>,
        metrics: Arc<ServerMetrics>,
    ) -> Result<Self, StorageError> {
        let persisted = match storage.get_opt::<PersistedQueue>(StorageKey::AlarmQueue).await {
            Ok(persisted) => persisted.unwrap_or_default(),
            Err(e @ (StorageError::Corrupt { .. } | StorageError::UnsupportedVersion { .. })) => {
                telemetry.emit(&TelemetryEvent::ErrorStateCorruption {
                    key: StorageKey::AlarmQueue,
                    detail: e.to_string(),
                });
                let healed = PersistedQueue::default();
                storage.put(StorageKey::AlarmQueue, &healed).await?;
                healed
            }
            Err(e) => return Err(e),
        };

        let mut queue = Self {
            entries: persisted.entries,
            next_seq: persisted.next_seq,
            driver,
            storage,
            telemetry,
            metrics,
        };
        queue.sort_entries();
        queue.sync_driver();
        Ok(queue)
    }

    /// Schedule a typed entry; returns its id.
    pub async fn schedule(
        &mut self,
        kind: AlarmKind,
        due_at: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Result<Uuid, StorageError> {
        let entry = AlarmEntry {
            id: Uuid::new_v4(),
            kind,
            due_at,
            seq: self.next_seq,
            payload,
        };
        let id = entry.id;
        self.next_seq += 1;
        self.entries.push(entry);
        self.sort_entries();
        self.persist().await?;
        self.sync_driver();

        ServerMetrics::increment(&self.metrics.alarms_scheduled);
        self.telemetry.emit(&TelemetryEvent::AlarmSchedule {
            kind: kind.as_str().to_string(),
            due_at,
        });
        Ok(id)
    }

    /// Cancel one entry by id; returns whether it existed.
    pub async fn cancel_by_id(&mut self, id: Uuid) -> Result<bool, StorageError> {
        let count = self.cancel_where(|e| e.id == id).await?;
        Ok(count > 0)
    }

    /// Cancel every entry matching the predicate; returns how many.
    pub async fn cancel_where<F>(&mut self, predicate: F) -> Result<usize, StorageError>
    where
        F: Fn(&AlarmEntry) -> bool,
    {
        let mut removed: Vec<AlarmEntry> = Vec::new();
        self.entries.retain(|e| {
            if predicate(e) {
                removed.push(e.clone());
                false
            } else {
                true
            }
        });
        if removed.is_empty() {
            return Ok(0);
        }

        self.persist().await?;
        self.sync_driver();

        for kind in dedup_kinds(&removed) {
            let count = removed.iter().filter(|e| e.kind == kind).count();
            ServerMetrics::increment(&self.metrics.alarms_cancelled);
            self.telemetry.emit(&TelemetryEvent::AlarmCancel {
                kind: kind.as_str().to_string(),
                count,
            });
        }
        Ok(removed.len())
    }

    /// Remove and return every entry due at or before `now`, in due-time
    /// order with ties broken by insertion order.
    pub async fn drain_due(&mut self, now: DateTime<Utc>) -> Result<Vec<AlarmEntry>, StorageError> {
        let split = self.entries.partition_point(|e| e.due_at <= now);
        if split == 0 {
            return Ok(Vec::new());
        }
        let due: Vec<AlarmEntry> = self.entries.drain(..split).collect();
        self.persist().await?;
        self.sync_driver();

        for entry in &due {
            ServerMetrics::increment(&self.metrics.alarms_fired);
            self.telemetry.emit(&TelemetryEvent::AlarmFire {
                kind: entry.kind.as_str().to_string(),
            });
        }
        Ok(due)
    }

    pub fn peek_next(&self) -> Option<&AlarmEntry> {
        self.entries.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlarmEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_kind(&self, kind: AlarmKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    fn sort_entries(&mut self) {
        self.entries.sort_by_key(|e| (e.due_at, e.seq));
    }

    fn sync_driver(&self) {
        let soonest = self.entries.first().map(|e| e.due_at);
        if self.driver.current() != soonest {
            self.driver.set(soonest);
        }
    }

    async fn persist(&self) -> Result<(), StorageError> {
        let persisted = PersistedQueue {
            entries: self.entries.clone(),
            next_seq: self.next_seq,
        };
        self.storage.put(StorageKey::AlarmQueue, &persisted).await
    }
}

fn dedup_kinds(entries: &[AlarmEntry]) -> Vec<AlarmKind> {
    let mut kinds: Vec<AlarmKind> = Vec::new();
    for entry in entries {
        if !kinds.contains(&entry.kind) {
            kinds.push(entry.kind);
        }
    }
    kinds
}
