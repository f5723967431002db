//! Global hotkeys, backed by `rdev`.
//!
//! # Design
//!
//! `rdev::listen()` blocks forever, so it runs on a **dedicated OS thread**
//! ([`HotkeyListener`]).  The thread translates raw key events into
//! `OrchestratorEvent::HotkeyPressed` / `HotkeyReleased` through a
//! [`SharedKeyMap`], which the orchestrator swaps when settings change.
//!
//! ```text
//!  rdev thread ─► KeyFilter (auto-repeat dedup) ─► SharedKeyMap ─► mpsc ─► orchestrator
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use voice_assistant::config::HotkeyConfig;
//! use voice_assistant::hotkey::{HotkeyListener, KeyMap, SharedKeyMap};
//!
//! let (tx, _rx) = mpsc::channel(64);
//! let keys = SharedKeyMap::new(KeyMap::from_config(&HotkeyConfig::default()).unwrap());
//! let _listener = HotkeyListener::start(keys, tx);
//! ```

pub mod listener;

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

pub use listener::{HotkeyListener, KeyFilter};

use crate::config::HotkeyConfig;
use crate::orchestrator::Mode;

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// What a bound key does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    Dictation,
    Chat,
    Rewrite,
    Vision,
    PinToggle,
    TtsToggle,
    Cancel,
}

impl Binding {
    pub const ALL: [Binding; 7] = [
        Binding::Dictation,
        Binding::Chat,
        Binding::Rewrite,
        Binding::Vision,
        Binding::PinToggle,
        Binding::TtsToggle,
        Binding::Cancel,
    ];

    /// The session mode this binding starts, if any.
    pub fn mode(self) -> Option<Mode> {
        match self {
            Binding::Dictation => Some(Mode::Dictation),
            Binding::Chat => Some(Mode::Chat),
            Binding::Rewrite => Some(Mode::Rewrite),
            Binding::Vision => Some(Mode::Vision),
            Binding::PinToggle | Binding::TtsToggle | Binding::Cancel => None,
        }
    }

    fn key_name(self, cfg: &HotkeyConfig) -> &str {
        match self {
            Binding::Dictation => &cfg.dictation,
            Binding::Chat => &cfg.chat,
            Binding::Rewrite => &cfg.rewrite,
            Binding::Vision => &cfg.vision,
            Binding::PinToggle => &cfg.pin_toggle,
            Binding::TtsToggle => &cfg.tts_toggle,
            Binding::Cancel => &cfg.cancel,
        }
    }
}

// ---------------------------------------------------------------------------
// KeyMap
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyMapError {
    #[error("unknown key {name:?} for {binding:?}")]
    UnknownKey { binding: Binding, name: String },

    #[error("key {name:?} is bound to both {first:?} and {second:?}")]
    Duplicate {
        name: String,
        first: Binding,
        second: Binding,
    },
}

/// Key → binding table.  Small enough that a linear scan is the lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyMap {
    entries: Vec<(rdev::Key, Binding)>,
}

impl KeyMap {
    /// Build from config key names.  Every binding must parse and no key may
    /// be bound twice.
    pub fn from_config(cfg: &HotkeyConfig) -> Result<Self, KeyMapError> {
        let mut entries: Vec<(rdev::Key, Binding)> = Vec::with_capacity(Binding::ALL.len());
        for binding in Binding::ALL {
            let name = binding.key_name(cfg);
            let key = parse_key(name).ok_or_else(|| KeyMapError::UnknownKey {
                binding,
                name: name.to_string(),
            })?;
            if let Some(&(_, first)) = entries.iter().find(|(k, _)| *k == key) {
                return Err(KeyMapError::Duplicate {
                    name: name.to_string(),
                    first,
                    second: binding,
                });
            }
            entries.push((key, binding));
        }
        Ok(Self { entries })
    }

    pub fn binding_for(&self, key: rdev::Key) -> Option<Binding> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|&(_, binding)| binding)
    }
}

/// [`KeyMap`] shared between the listener thread and the orchestrator.
#[derive(Debug, Clone)]
pub struct SharedKeyMap(Arc<RwLock<KeyMap>>);

impl SharedKeyMap {
    pub fn new(map: KeyMap) -> Self {
        Self(Arc::new(RwLock::new(map)))
    }

    pub fn binding_for(&self, key: rdev::Key) -> Option<Binding> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .binding_for(key)
    }

    /// Swap the whole table at once.
    pub fn replace(&self, map: KeyMap) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = map;
    }
}

// ---------------------------------------------------------------------------
// parse_key
// ---------------------------------------------------------------------------

/// Parse a key name from `settings.toml` into an [`rdev::Key`].
///
/// Names are case-insensitive.  Supports F1–F12, common named keys and single
/// ASCII letters.
///
/// ```
/// use voice_assistant::hotkey::parse_key;
///
/// assert_eq!(parse_key("F8"), Some(rdev::Key::F8));
/// assert_eq!(parse_key("esc"), Some(rdev::Key::Escape));
/// assert_eq!(parse_key("q"), Some(rdev::Key::KeyQ));
/// assert_eq!(parse_key("Ctrl+V"), None);
/// ```
pub fn parse_key(name: &str) -> Option<rdev::Key> {
    use rdev::Key::*;

    let lower = name.trim().to_ascii_lowercase();
    let key = match lower.as_str() {
        "f1" => F1,
        "f2" => F2,
        "f3" => F3,
        "f4" => F4,
        "f5" => F5,
        "f6" => F6,
        "f7" => F7,
        "f8" => F8,
        "f9" => F9,
        "f10" => F10,
        "f11" => F11,
        "f12" => F12,
        "escape" | "esc" => Escape,
        "space" => Space,
        "return" | "enter" => Return,
        "tab" => Tab,
        "backspace" => Backspace,
        "delete" | "del" => Delete,
        "insert" | "ins" => Insert,
        "home" => Home,
        "end" => End,
        "pageup" => PageUp,
        "pagedown" => PageDown,
        "up" | "uparrow" => UpArrow,
        "down" | "downarrow" => DownArrow,
        "left" | "leftarrow" => LeftArrow,
        "right" | "rightarrow" => RightArrow,
        "capslock" => CapsLock,
        "numlock" => NumLock,
        "scrolllock" => ScrollLock,
        "printscreen" => PrintScreen,
        "pause" => Pause,
        "metaright" | "superright" => MetaRight,
        "altgr" => AltGr,
        single if single.len() == 1 => return letter(single.as_bytes()[0]),
        _ => return None,
    };
    Some(key)
}

fn letter(c: u8) -> Option<rdev::Key> {
    use rdev::Key::*;

    const LETTERS: [rdev::Key; 26] = [
        KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM, KeyN, KeyO,
        KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
    ];
    c.is_ascii_lowercase()
        .then(|| LETTERS[(c - b'a') as usize])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
