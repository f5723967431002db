//! Platform directories via the `dirs` crate.
//!
//! Config dir (`settings.toml`):
//!   Linux:   ~/.config/voice-assistant/
//!   macOS:   ~/Library/Application Support/voice-assistant/
//!   Windows: %APPDATA%\voice-assistant\
//!
//! Data dir (`history.jsonl`, temporary screenshots):
//!   Linux:   ~/.local/share/voice-assistant/
//!   macOS:   ~/Library/Application Support/voice-assistant/
//!   Windows: %LOCALAPPDATA%\voice-assistant\

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    pub data_dir: PathBuf,
    /// Append-only JSON-lines session log.
    pub history_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-assistant";

    /// Falls back to the current directory when the platform has no
    /// standard location.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);
        Self::rooted(config_dir, data_dir)
    }

    /// Paths under explicit roots (tests, portable installs).
    pub fn rooted(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            settings_file: config_dir.join("settings.toml"),
            history_file: data_dir.join("history.jsonl"),
            config_dir,
            data_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        let paths = AppPaths::new();
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths
            .history_file
            .file_name()
            .is_some_and(|n| n == "history.jsonl"));
        assert!(paths.config_dir.ends_with("voice-assistant"));
    }

    #[test]
    fn rooted_paths_stay_under_roots() {
        let paths = AppPaths::rooted("/tmp/c".into(), "/tmp/d".into());
        assert!(paths.settings_file.starts_with("/tmp/c"));
        assert!(paths.history_file.starts_with("/tmp/d"));
    }
}
