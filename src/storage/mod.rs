//! Durable keyed storage for one room.
//!
//! The facade is deliberately narrow: six fixed keys, JSON-encodable values,
//! durable writes, tagged not-found. Every operation is instrumented with
//! start/end telemetry. Values are wrapped in a versioned envelope; reads of
//! unknown versions fail closed.

pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::instrumentation::{Telemetry, TelemetryEvent};
use crate::metrics::ServerMetrics;

pub use memory::InMemoryStorage;

/// Current schema version written into every envelope.
pub const SCHEMA_VERSION: u32 = 1;

/// The fixed key set used by the room actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKey {
    Room,
    Game,
    Seats,
    Chat,
    AlarmQueue,
    Invites,
}

impl StorageKey {
    pub const ALL: [StorageKey; 6] = [
        StorageKey::Room,
        StorageKey::Game,
        StorageKey::Seats,
        StorageKey::Chat,
        StorageKey::AlarmQueue,
        StorageKey::Invites,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::Room => "room",
            StorageKey::Game => "game",
            StorageKey::Seats => "seats",
            StorageKey::Chat => "chat",
            StorageKey::AlarmQueue => "alarm_queue",
            StorageKey::Invites => "invites",
        }
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage failure kinds.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The key holds no value. Tagged explicitly so "missing" is never
    /// confused with a stored null.
    #[error("no value stored under '{0}'")]
    NotFound(StorageKey),
    #[error("storage backend failed: {0}")]
    Backend(String),
    #[error("value under '{key}' failed to decode: {detail}")]
    Corrupt { key: StorageKey, detail: String },
    #[error("value under '{key}' has schema version {found}, expected {expected}")]
    UnsupportedVersion {
        key: StorageKey,
        found: u32,
        expected: u32,
    },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Raw keyed JSON storage. Writes must be durable before returning.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError>;
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError>;
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError>;
}

/// Versioned envelope around every stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionedRecord<T> {
    version: u32,
    data: T,
}

/// Instrumented storage facade handed to the room actor.
#[derive(Clone)]
pub struct RoomStorage {
    backend: Arc<dyn StorageBackend>,
    telemetry: Arc<Telemetry>,
    metrics: Arc<ServerMetrics>,
}

impl RoomStorage {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        telemetry: Arc<Telemetry>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            backend,
            telemetry,
            metrics,
        }
    }

    /// Read and decode the value under `key`. Absent keys are
    /// [`StorageError::NotFound`]; unknown schema versions fail closed.
    pub async fn get<T: DeserializeOwned>(&self, key: StorageKey) -> Result<T, StorageError> {
        self.telemetry.emit(&TelemetryEvent::StorageReadStart { key });
        ServerMetrics::increment(&self.metrics.storage_reads);
        let started = Instant::now();

        let result = self.get_inner(key).await;

        self.telemetry.emit(&TelemetryEvent::StorageReadEnd {
            key,
            duration_ms: duration_ms(started),
            success: !matches!(&result, Err(e) if !e.is_not_found()),
        });
        if matches!(&result, Err(e) if !e.is_not_found()) {
            ServerMetrics::increment(&self.metrics.storage_failures);
        }
        result
    }

    /// Like [`RoomStorage::get`], mapping NotFound to `None`.
    pub async fn get_opt<T: DeserializeOwned>(
        &self,
        key: StorageKey,
    ) -> Result<Option<T>, StorageError> {
        match self.get(key).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Durably write `value` under `key`.
    pub async fn put<T: Serialize>(&self, key: StorageKey, value: &T) -> Result<(), StorageError> {
        self.telemetry.emit(&TelemetryEvent::StorageWriteStart { key });
        ServerMetrics::increment(&self.metrics.storage_writes);
        let started = Instant::now();

        let result = self.put_inner(key, value).await;

        self.telemetry.emit(&TelemetryEvent::StorageWriteEnd {
            key,
            duration_ms: duration_ms(started),
            success: result.is_ok(),
        });
        if result.is_err() {
            ServerMetrics::increment(&self.metrics.storage_failures);
        }
        result
    }

    /// Remove the value under `key`; returns whether it existed.
    pub async fn delete(&self, key: StorageKey) -> Result<bool, StorageError> {
        ServerMetrics::increment(&self.metrics.storage_deletes);
        let result = self.backend.delete(key.as_str()).await;
        match &result {
            Ok(existed) => {
                self.telemetry.emit(&TelemetryEvent::StorageDelete { key, existed: *existed });
            }
            Err(e) => {
                ServerMetrics::increment(&self.metrics.storage_failures);
                self.telemetry.emit(&TelemetryEvent::ErrorStorageFailed {
                    key,
                    detail: e.to_string(),
                });
            }
        }
        result
    }

    /// List stored key names, optionally filtered by prefix.
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        self.backend.list(prefix).await
    }

    async fn get_inner<T: DeserializeOwned>(&self, key: StorageKey) -> Result<T, StorageError> {
        let raw = self
            .backend
            .get(key.as_str())
            .await?
            .ok_or(StorageError::NotFound(key))?;

        let envelope: VersionedRecord<serde_json::Value> =
            serde_json::from_value(raw).map_err(|e| StorageError::Corrupt {
                key,
                detail: e.to_string(),
            })?;
        if envelope.version != SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion {
                key,
                found: envelope.version,
                expected: SCHEMA_VERSION,
            });
        }
        serde_json::from_value(envelope.data).map_err(|e| StorageError::Corrupt {
            key,
            detail: e.to_string(),
        })
    }

    async fn put_inner<T: Serialize>(&self, key: StorageKey, value: &T) -> Result<(), StorageError> {
        let envelope = VersionedRecord {
            version: SCHEMA_VERSION,
            data: value,
        };
        let raw = serde_json::to_value(&envelope).map_err(|e| StorageError::Backend(e.to_string()))?;
        self.backend.put(key.as_str(), raw).await
    }
}

fn duration_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn facade() -> RoomStorage {
        RoomStorage::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(Telemetry::for_room("AB23CD")),
            Arc::new(ServerMetrics::new()),
        )
    }

    #[tokio::test]
    async fn read_your_writes() {
        let storage = facade();
        storage.put(StorageKey::Room, &json!({"code": "AB23CD"})).await.unwrap();
        let back: serde_json::Value = storage.get(StorageKey::Room).await.unwrap();
        assert_eq!(back["code"], "AB23CD");
    }

    #[tokio::test]
    async fn absent_key_is_tagged_not_found() {
        let storage = facade();
        let err = storage.get::<serde_json::Value>(StorageKey::Game).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(storage.get_opt::<serde_json::Value>(StorageKey::Game).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stored_null_is_not_not_found() {
        let storage = facade();
        storage.put(StorageKey::Game, &serde_json::Value::Null).await.unwrap();
        let back: serde_json::Value = storage.get(StorageKey::Game).await.unwrap();
        assert!(back.is_null());
    }

    #[tokio::test]
    async fn unknown_version_fails_closed() {
        let backend = Arc::new(InMemoryStorage::new());
        backend
            .put("room", json!({"version": 99, "data": {"code": "AB23CD"}}))
            .await
            .unwrap();
        let storage = RoomStorage::new(
            backend,
            Arc::new(Telemetry::for_room("AB23CD")),
            Arc::new(ServerMetrics::new()),
        );
        let err = storage.get::<serde_json::Value>(StorageKey::Room).await.unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedVersion { found: 99, .. }));
    }

    #[tokio::test]
    async fn malformed_envelope_is_corrupt() {
        let backend = Arc::new(InMemoryStorage::new());
        backend.put("alarm_queue", json!("not an envelope")).await.unwrap();
        let storage = RoomStorage::new(
            backend,
            Arc::new(Telemetry::for_room("AB23CD")),
            Arc::new(ServerMetrics::new()),
        );
        let err = storage.get::<Vec<u8>>(StorageKey::AlarmQueue).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let storage = facade();
        storage.put(StorageKey::Invites, &json!({})).await.unwrap();
        assert!(storage.delete(StorageKey::Invites).await.unwrap());
        assert!(!storage.delete(StorageKey::Invites).await.unwrap());
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let storage = facade();
        storage.put(StorageKey::Room, &json!({})).await.unwrap();
        storage.put(StorageKey::AlarmQueue, &json!([])).await.unwrap();
        let all = storage.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
        let filtered = storage.list(Some("alarm")).await.unwrap();
        assert_eq!(filtered, vec!["alarm_queue".to_string()]);
    }

    #[tokio::test]
    async fn serde_round_trip_is_identity() {
        let storage = facade();
        let seats = vec![json!({"userId": "u1", "turnOrder": 0})];
        storage.put(StorageKey::Seats, &seats).await.unwrap();
        let back: Vec<serde_json::Value> = storage.get(StorageKey::Seats).await.unwrap();
        assert_eq!(back, seats);
    }
}
