//! Everything that can happen to the orchestrator, as one enum.
//!
//! Producers (hotkey thread, wake-word thread, capture analysis thread,
//! timers, worker tasks, the overlay) only ever *send* these.  Completion
//! events carry the [`SessionId`] they belong to; the orchestrator drops
//! any whose id is not the current session's.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, Completion};
use crate::config::ModeConfig;
use crate::hotkey::Binding;
use crate::screen::{ScreenError, Screenshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Dictation,
    Chat,
    Rewrite,
    Vision,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Dictation => "Listening...",
            Mode::Chat => "AI Listening...",
            Mode::Rewrite => "Rewrite Mode...",
            Mode::Vision => "Vision Mode...",
        }
    }

    /// Whether the answer goes to the chat panel (and may be spoken) rather
    /// than being typed at the cursor.
    pub fn is_conversational(self) -> bool {
        matches!(self, Mode::Chat | Mode::Vision)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Hotkey(Binding),
    WakeWord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    HotkeyPressed(Binding),
    HotkeyReleased(Binding),
    WakeWordFired,
    SilenceDetected(SessionId),
    CaptureLimitReached(SessionId),
    ScreenshotReady {
        session: SessionId,
        result: Result<Screenshot, ScreenError>,
    },
    BackendCompleted {
        session: SessionId,
        result: Result<Completion, BackendError>,
    },
    SpeechFinished(SessionId),
    /// Same as the cancel hotkey, for callers without a key (overlay button).
    Cancel,
    UpdateSettings(ModeConfig),
    Shutdown,
}

impl OrchestratorEvent {
    /// The session a completion event belongs to.
    pub fn session(&self) -> Option<SessionId> {
        match self {
            OrchestratorEvent::SilenceDetected(id)
            | OrchestratorEvent::CaptureLimitReached(id)
            | OrchestratorEvent::SpeechFinished(id) => Some(*id),
            OrchestratorEvent::ScreenshotReady { session, .. }
            | OrchestratorEvent::BackendCompleted { session, .. } => Some(*session),
            _ => None,
        }
    }
}
