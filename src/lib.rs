#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Rollhouse Server
//!
//! A hibernation-capable WebSocket session server for real-time multiplayer
//! dice games.
//!
//! Each room is a single-threaded actor bound to a 6-character room code. The
//! actor owns the room's authoritative state (seats, game, chat, invites, alarm
//! queue), persists it through a narrow storage facade, and may be retired
//! between events; the next event rehydrates it from storage.

/// Alarm queue multiplexing typed scheduled events over one runtime alarm slot
pub mod alarm;

/// Session token validation (HMAC backed)
pub mod auth;

/// Clock abstraction so deadline math is testable
pub mod clock;

/// Server configuration and environment variables
pub mod config;

/// Dice game rules: scoring engine, state machine, policy hooks
pub mod game;

/// Room directory: spawn, look up and retire room actors
pub mod hub;

/// Structured telemetry events with schema validation
pub mod instrumentation;

/// Outbound lobby notifications with bounded retry
pub mod lobby;

/// Structured logging configuration
pub mod logging;

/// Metrics collection and reporting
pub mod metrics;

/// WebSocket message protocol definitions
pub mod protocol;

/// Retry logic utilities
pub mod retry;

/// The per-room session actor
pub mod room;

/// HTTP/WebSocket transport wiring
pub mod server;

/// Keyed durable storage facade
pub mod storage;
