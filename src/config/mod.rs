//! Configuration for the voice-agent client.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for the server,
//! audio capture and session behaviour, `AppPaths` for the platform config
//! directory, and TOML persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, AudioConfig, ServerConfig, SessionConfig};
