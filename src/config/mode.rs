//! The slice of configuration the orchestrator acts on.
//!
//! [`ModeConfig`] is an immutable value.  The orchestrator swaps it whole on
//! `UpdateSettings` and when a toggle hotkey flips `pinned` / `tts_enabled`;
//! nothing edits it in place.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;

use super::settings::{AppConfig, HotkeyConfig};
use crate::audio::SilenceSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct ModeConfig {
    pub keys: HotkeyConfig,
    pub silence_timeout: Duration,
    pub silence_threshold: f32,
    pub max_recording: Duration,
    /// `None` when the wake-word listener is disabled.
    pub wake_phrase: Option<String>,
    pub tts_enabled: bool,
    pub pinned: bool,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

impl ModeConfig {
    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            keys: app.hotkey.clone(),
            silence_timeout: secs(app.audio.silence_timeout_secs),
            silence_threshold: app.audio.silence_threshold,
            max_recording: secs(app.audio.max_recording_secs),
            wake_phrase: app
                .wake_word
                .enabled
                .then(|| app.wake_word.phrase.trim().to_string())
                .filter(|p| !p.is_empty()),
            tts_enabled: app.tts.enabled,
            pinned: app.ui.chat_pinned,
        }
    }

    pub fn silence(&self) -> SilenceSettings {
        SilenceSettings {
            threshold: self.silence_threshold,
            timeout: self.silence_timeout,
        }
    }

    pub fn with_pinned(&self, pinned: bool) -> Self {
        Self {
            pinned,
            ..self.clone()
        }
    }

    pub fn with_tts(&self, tts_enabled: bool) -> Self {
        Self {
            tts_enabled,
            ..self.clone()
        }
    }
}

/// Negative or NaN values from a hand-edited file become zero.
fn secs(value: f32) -> Duration {
    Duration::try_from_secs_f32(value).unwrap_or(Duration::ZERO)
}

// ---------------------------------------------------------------------------
// SettingsStore
// ---------------------------------------------------------------------------

/// Persists the runtime toggles so they survive a restart.
pub trait SettingsStore: Send + Sync {
    fn persist_toggles(&self, pinned: bool, tts_enabled: bool) -> Result<()>;
}

/// Read-modify-write of `settings.toml`.
#[derive(Debug)]
pub struct TomlSettingsStore {
    path: PathBuf,
    // Serialises concurrent writers in this process.
    lock: Mutex<()>,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

impl SettingsStore for TomlSettingsStore {
    fn persist_toggles(&self, pinned: bool, tts_enabled: bool) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut app = AppConfig::load_from(&self.path)?;
        app.ui.chat_pinned = pinned;
        app.tts.enabled = tts_enabled;
        app.save_to(&self.path)?;
        log::debug!("persisted toggles: pinned={pinned} tts={tts_enabled}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn from_app_maps_audio_and_toggles() {
        let mut app = AppConfig::default();
        app.audio.silence_timeout_secs = 2.0;
        app.tts.enabled = true;
        app.ui.chat_pinned = true;
        let mode = ModeConfig::from_app(&app);
        assert_eq!(mode.silence_timeout, Duration::from_secs(2));
        assert_eq!(mode.max_recording, Duration::from_secs(60));
        assert!(mode.tts_enabled);
        assert!(mode.pinned);
        assert_eq!(mode.keys.cancel, "Escape");
    }

    #[test]
    fn wake_phrase_only_when_enabled() {
        let mut app = AppConfig::default();
        assert_eq!(ModeConfig::from_app(&app).wake_phrase, None);
        app.wake_word.enabled = true;
        assert_eq!(ModeConfig::from_app(&app).wake_phrase.as_deref(), Some("hey aria"));
        app.wake_word.phrase = "   ".into();
        assert_eq!(ModeConfig::from_app(&app).wake_phrase, None);
    }

    #[test]
    fn negative_durations_clamp_to_zero() {
        let mut app = AppConfig::default();
        app.audio.silence_timeout_secs = -1.0;
        assert_eq!(ModeConfig::from_app(&app).silence_timeout, Duration::ZERO);
    }

    #[test]
    fn toggles_produce_new_values() {
        let base = ModeConfig::default();
        let pinned = base.with_pinned(true);
        assert!(pinned.pinned);
        assert!(!base.pinned);
        assert_eq!(pinned.with_pinned(false), base);
        assert!(base.with_tts(true).tts_enabled);
    }

    #[test]
    fn toml_store_keeps_other_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut app = AppConfig::default();
        app.hotkey.chat = "F6".into();
        app.save_to(&path).unwrap();

        let store = TomlSettingsStore::new(&path);
        store.persist_toggles(true, true).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert!(loaded.ui.chat_pinned);
        assert!(loaded.tts.enabled);
        assert_eq!(loaded.hotkey.chat, "F6");
    }

    #[test]
    fn toml_store_creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub").join("settings.toml");
        TomlSettingsStore::new(&path).persist_toggles(false, true).unwrap();
        assert!(AppConfig::load_from(&path).unwrap().tts.enabled);
    }
}
