//! Configuration for the voice assistant.
//!
//! Provides `AppConfig` (the whole `settings.toml`), one section per
//! subsystem, `AppPaths` for platform directories, and `ModeConfig`, the
//! immutable subset the orchestrator works from.

pub mod mode;
pub mod paths;
pub mod settings;

pub use mode::{ModeConfig, SettingsStore, TomlSettingsStore};
pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, BackendConfig, HistoryConfig, HotkeyConfig, TtsConfig, UiConfig,
    WakeWordConfig,
};
