//! Application settings structs, defaults and TOML persistence.
//!
//! Every section implements `Serialize`, `Deserialize`, `Default` and
//! `Clone`.  Sections are `#[serde(default)]` so a hand-edited
//! `settings.toml` that only sets a few keys still loads.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

/// Remote transcription / chat / vision / speech service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// OpenAI-compatible API root.
    pub base_url: String,
    /// Name of the environment variable holding the API key.  The key itself
    /// is never written to disk.
    pub api_key_env: String,
    pub transcription_model: String,
    pub chat_model: String,
    pub vision_model: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Extra attempts for network errors and rate limiting.
    pub max_retries: u32,
    /// First backoff delay; doubled on each retry.
    pub retry_base_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".into(),
            api_key_env: "GROQ_API_KEY".into(),
            transcription_model: "whisper-large-v3".into(),
            chat_model: "moonshotai/kimi-k2-instruct".into(),
            vision_model: "meta-llama/llama-4-scout-17b-16e-instruct".into(),
            timeout_secs: 30,
            max_retries: 2,
            retry_base_ms: 500,
        }
    }
}

impl BackendConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

// ---------------------------------------------------------------------------
// HotkeyConfig
// ---------------------------------------------------------------------------

/// Global key bindings, by key name (see [`crate::hotkey::parse_key`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    pub dictation: String,
    pub chat: String,
    pub rewrite: String,
    pub vision: String,
    pub pin_toggle: String,
    pub tts_toggle: String,
    pub cancel: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            dictation: "F3".into(),
            chat: "F4".into(),
            rewrite: "F7".into(),
            vision: "F8".into(),
            pin_toggle: "F9".into(),
            tts_toggle: "F10".into(),
            cancel: "Escape".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Capture and silence detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Quiet period after speech that ends a Dictation / Chat / Rewrite
    /// capture.
    pub silence_timeout_secs: f32,
    /// RMS level below which a 30 ms frame counts as quiet.
    pub silence_threshold: f32,
    /// Recordings shorter than this are rejected before upload.
    pub min_recording_secs: f32,
    /// Hard limit; the session is submitted when it is reached.
    pub max_recording_secs: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            silence_timeout_secs: 1.5,
            silence_threshold: 0.01,
            min_recording_secs: 0.3,
            max_recording_secs: 60.0,
        }
    }
}

// ---------------------------------------------------------------------------
// WakeWordConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeWordConfig {
    pub enabled: bool,
    /// Phrase that starts a Chat session, matched case-insensitively.
    pub phrase: String,
    /// RMS gate for utterance segmentation.
    pub energy_threshold: f32,
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            phrase: "hey aria".into(),
            energy_threshold: 0.02,
        }
    }
}

// ---------------------------------------------------------------------------
// TtsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Read Chat and Vision answers aloud.
    pub enabled: bool,
    pub model: String,
    /// One of `diana`, `hannah`, `autumn`, `austin`, `daniel`, `troy`.
    pub voice: String,
    /// Longer answers are truncated before synthesis.
    pub max_chars: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "canopylabs/orpheus-v1-english".into(),
            voice: "diana".into(),
            max_chars: 4000,
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// Overlay appearance and behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Keep the chat panel visible instead of auto-hiding it.
    pub chat_pinned: bool,
    /// Show Chat / Vision answers in the overlay at all.
    pub chat_enabled: bool,
    /// Name of a palette from [`crate::app::COLOR_SCHEMES`].
    pub color_scheme: String,
    pub chat_auto_hide_secs: u64,
    /// Most chat messages kept in the panel.
    pub chat_message_limit: usize,
    pub always_on_top: bool,
    /// Last saved overlay position `(x, y)`.  `None` lets the window
    /// manager decide.
    pub window_position: Option<(f32, f32)>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            chat_pinned: false,
            chat_enabled: true,
            color_scheme: "Oceanic Zen".into(),
            chat_auto_hide_secs: 3,
            chat_message_limit: 20,
            always_on_top: true,
            window_position: None,
        }
    }
}

// ---------------------------------------------------------------------------
// HistoryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Entries kept in memory for the overlay's history view.
    pub answer_limit: usize,
    /// Token budget for the chat context sent to the backend (chars / 4).
    pub max_history_tokens: usize,
    /// Append every completed session to `history.jsonl`.
    pub persist: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            answer_limit: 15,
            max_history_tokens: 32_000,
            persist: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use voice_assistant::config::AppConfig;
///
/// let mut config = AppConfig::load().unwrap();
/// config.tts.enabled = true;
/// config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub hotkey: HotkeyConfig,
    pub audio: AudioConfig,
    pub wake_word: WakeWordConfig,
    pub tts: TtsConfig,
    pub ui: UiConfig,
    pub history: HistoryConfig,
}

impl AppConfig {
    /// Load from the platform `settings.toml`; defaults on first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save to the platform `settings.toml`, creating parent directories.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
