//! Configuration module.
//!
//! Provides layered configuration management:
//! - JSON configuration files (`ROLLHOUSE_CONFIG_PATH`, then `./config.json`)
//! - Environment variable overrides (`ROLLHOUSE__` prefix, `__` nesting),
//!   plus the bare deployment knobs (`RECLAIM_WINDOW_MS` and friends)
//! - Sensible defaults compiled into the binary
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct and its sections
//! - [`defaults`]: Default value functions
//! - [`loader`]: Configuration loading functions
//! - [`logging`]: Logging configuration
//! - [`validation`]: Startup validation

// Submodules
pub mod defaults;
pub mod loader;
pub mod logging;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use loader::load;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use types::{Config, HubConfig, RateLimitConfig, RoomConfig, SecurityConfig};

pub use validation::{is_production_mode, validate_config};
