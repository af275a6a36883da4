use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for the session server.
///
/// Shared by every room actor via `Arc`; surfaced through the health route.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    pub total_connections: AtomicU64,
    pub active_connections: AtomicU64,
    pub disconnections: AtomicU64,
    pub auth_rejections: AtomicU64,

    // Room lifecycle metrics
    pub rooms_created: AtomicU64,
    pub rooms_hydrated: AtomicU64,
    pub rooms_retired: AtomicU64,
    pub rooms_abandoned: AtomicU64,
    pub games_started: AtomicU64,
    pub games_completed: AtomicU64,

    // Seat metrics
    pub seats_assigned: AtomicU64,
    pub seats_reclaimed: AtomicU64,
    pub seats_expired: AtomicU64,

    // Command metrics
    pub commands_handled: AtomicU64,
    pub commands_rejected: AtomicU64,
    pub rate_limit_rejections: AtomicU64,

    // Alarm metrics
    pub alarms_scheduled: AtomicU64,
    pub alarms_fired: AtomicU64,
    pub alarms_cancelled: AtomicU64,

    // Storage metrics
    pub storage_reads: AtomicU64,
    pub storage_writes: AtomicU64,
    pub storage_deletes: AtomicU64,
    pub storage_failures: AtomicU64,

    // Broadcast metrics
    pub broadcasts_sent: AtomicU64,
    pub broadcast_send_failures: AtomicU64,

    // External notifier metrics
    pub lobby_notifications: AtomicU64,
    pub lobby_notify_failures: AtomicU64,
    pub lobby_notify_dropped: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(counter: &AtomicU64) {
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            timestamp: chrono::Utc::now(),
            total_connections: read(&self.total_connections),
            active_connections: read(&self.active_connections),
            disconnections: read(&self.disconnections),
            auth_rejections: read(&self.auth_rejections),
            rooms_created: read(&self.rooms_created),
            rooms_hydrated: read(&self.rooms_hydrated),
            rooms_retired: read(&self.rooms_retired),
            rooms_abandoned: read(&self.rooms_abandoned),
            games_started: read(&self.games_started),
            games_completed: read(&self.games_completed),
            seats_assigned: read(&self.seats_assigned),
            seats_reclaimed: read(&self.seats_reclaimed),
            seats_expired: read(&self.seats_expired),
            commands_handled: read(&self.commands_handled),
            commands_rejected: read(&self.commands_rejected),
            rate_limit_rejections: read(&self.rate_limit_rejections),
            alarms_scheduled: read(&self.alarms_scheduled),
            alarms_fired: read(&self.alarms_fired),
            alarms_cancelled: read(&self.alarms_cancelled),
            storage_reads: read(&self.storage_reads),
            storage_writes: read(&self.storage_writes),
            storage_deletes: read(&self.storage_deletes),
            storage_failures: read(&self.storage_failures),
            broadcasts_sent: read(&self.broadcasts_sent),
            broadcast_send_failures: read(&self.broadcast_send_failures),
            lobby_notifications: read(&self.lobby_notifications),
            lobby_notify_failures: read(&self.lobby_notify_failures),
            lobby_notify_dropped: read(&self.lobby_notify_dropped),
        }
    }
}

/// Point-in-time copy of every counter, JSON-serializable for the health route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub total_connections: u64,
    pub active_connections: u64,
    pub disconnections: u64,
    pub auth_rejections: u64,
    pub rooms_created: u64,
    pub rooms_hydrated: u64,
    pub rooms_retired: u64,
    pub rooms_abandoned: u64,
    pub games_started: u64,
    pub games_completed: u64,
    pub seats_assigned: u64,
    pub seats_reclaimed: u64,
    pub seats_expired: u64,
    pub commands_handled: u64,
    pub commands_rejected: u64,
    pub rate_limit_rejections: u64,
    pub alarms_scheduled: u64,
    pub alarms_fired: u64,
    pub alarms_cancelled: u64,
    pub storage_reads: u64,
    pub storage_writes: u64,
    pub storage_deletes: u64,
    pub storage_failures: u64,
    pub broadcasts_sent: u64,
    pub broadcast_send_failures: u64,
    pub lobby_notifications: u64,
    pub lobby_notify_failures: u64,
    pub lobby_notify_dropped: u64,
}
