//! Engine Configuration Module
//!
//! Provides per-process configuration loaded from TOML files, replacing all
//! hardcoded table names, scheduling thresholds, and LLM settings with
//! operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `INSIGHTS_CONFIG` environment variable (path to TOML file)
//! 2. `insights_engine.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(EngineConfig::load());
//!
//! // Anywhere in the codebase:
//! let cap = config::get().event_driven_daily_cap;
//! ```

mod engine_config;
pub mod defaults;

pub use engine_config::*;

use std::sync::OnceLock;

/// Global engine configuration, initialized once at startup.
static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize the global engine configuration.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(config: EngineConfig) {
    if ENGINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global engine configuration.
///
/// Panics if `init()` has not been called: a missing config means startup
/// never ran `init()`, which is a programming error, not a runtime one.
pub fn get() -> &'static EngineConfig {
    ENGINE_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the config has been initialized.
///
/// Useful for tests and optional config paths.
pub fn is_initialized() -> bool {
    ENGINE_CONFIG.get().is_some()
}
