//! Everything the user sees or hears as a result of a session.
//!
//! The orchestrator talks to a [`PresentationSink`] only.  Every method is
//! fire-and-forget: it must return quickly and never block on device I/O.
//! [`DesktopPresenter`] is the shipped sink.  It writes [`OverlayState`] for
//! the egui widget to render, pastes text through the clipboard on the
//! blocking pool and plays speech on a tokio task that reports back with
//! `SpeechFinished`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::Role;
use crate::inject::TextInjector;
use crate::orchestrator::{Mode, OrchestratorEvent, SessionId};
use crate::speech::Speaker;

pub trait PresentationSink: Send + Sync {
    fn show_recording_indicator(&self, mode: Mode);
    fn show_processing_indicator(&self, mode: Mode);
    /// Clears any indicator, including the speaking one.
    fn hide_recording_indicator(&self);
    fn append_chat_message(&self, role: Role, text: &str);
    fn inject_text_at_cursor(&self, text: &str);
    /// Must eventually produce `SpeechFinished(session)` unless
    /// [`stop_speaking`](Self::stop_speaking) is called first.
    fn speak(&self, session: SessionId, text: &str);
    fn stop_speaking(&self);
    fn show_error(&self, message: &str);
    fn show_toggles(&self, pinned: bool, tts_enabled: bool);
}

// ---------------------------------------------------------------------------
// OverlayState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Indicator {
    Hidden,
    Recording { mode: Mode, since: Instant },
    Processing(Mode),
    Speaking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub role: Role,
    pub text: String,
}

/// What the overlay widget draws.  Written by [`DesktopPresenter`], read by
/// the UI thread.
#[derive(Debug, Clone)]
pub struct OverlayState {
    pub indicator: Indicator,
    pub pinned: bool,
    pub tts_enabled: bool,
    pub messages: VecDeque<ChatLine>,
    /// Last text pasted at the cursor.
    pub last_text: Option<String>,
    pub last_error: Option<String>,
    /// Last time anything changed; drives chat auto-hide.
    pub last_activity: Instant,
    message_limit: usize,
}

impl OverlayState {
    pub fn new(message_limit: usize, pinned: bool, tts_enabled: bool) -> Self {
        Self {
            indicator: Indicator::Hidden,
            pinned,
            tts_enabled,
            messages: VecDeque::new(),
            last_text: None,
            last_error: None,
            last_activity: Instant::now(),
            message_limit: message_limit.max(1),
        }
    }

    /// Oldest messages fall off past the limit.
    pub fn push_message(&mut self, role: Role, text: &str) {
        self.messages.push_back(ChatLine {
            role,
            text: text.to_string(),
        });
        while self.messages.len() > self.message_limit {
            self.messages.pop_front();
        }
        self.touch();
    }

    /// Pinned, busy or recently active.
    pub fn chat_visible(&self, auto_hide: Duration) -> bool {
        if self.messages.is_empty() {
            return false;
        }
        self.pinned
            || self.indicator != Indicator::Hidden
            || self.last_activity.elapsed() < auto_hide
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

#[derive(Debug, Clone)]
pub struct SharedOverlay(Arc<Mutex<OverlayState>>);

impl SharedOverlay {
    pub fn new(state: OverlayState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    pub fn update(&self, f: impl FnOnce(&mut OverlayState)) {
        f(&mut self.lock());
    }

    pub fn snapshot(&self) -> OverlayState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, OverlayState> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// DesktopPresenter
// ---------------------------------------------------------------------------

/// Must be called from inside a tokio runtime: injection and speech are
/// spawned onto it.
pub struct DesktopPresenter {
    overlay: SharedOverlay,
    injector: TextInjector,
    speaker: Arc<dyn Speaker>,
    events: mpsc::Sender<OrchestratorEvent>,
    playback: Mutex<Option<JoinHandle<()>>>,
    chat_enabled: bool,
}

impl DesktopPresenter {
    pub fn new(
        overlay: SharedOverlay,
        speaker: Arc<dyn Speaker>,
        events: mpsc::Sender<OrchestratorEvent>,
        chat_enabled: bool,
    ) -> Self {
        Self {
            overlay,
            injector: TextInjector::default(),
            speaker,
            events,
            playback: Mutex::new(None),
            chat_enabled,
        }
    }

    pub fn overlay(&self) -> &SharedOverlay {
        &self.overlay
    }

    fn take_playback(&self) -> Option<JoinHandle<()>> {
        self.playback.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl PresentationSink for DesktopPresenter {
    fn show_recording_indicator(&self, mode: Mode) {
        self.overlay.update(|s| {
            s.indicator = Indicator::Recording {
                mode,
                since: Instant::now(),
            };
            s.last_error = None;
            s.touch();
        });
    }

    fn show_processing_indicator(&self, mode: Mode) {
        self.overlay.update(|s| {
            s.indicator = Indicator::Processing(mode);
            s.touch();
        });
    }

    fn hide_recording_indicator(&self) {
        self.overlay.update(|s| {
            s.indicator = Indicator::Hidden;
            s.touch();
        });
    }

    fn append_chat_message(&self, role: Role, text: &str) {
        if !self.chat_enabled {
            return;
        }
        self.overlay.update(|s| s.push_message(role, text));
    }

    fn inject_text_at_cursor(&self, text: &str) {
        self.overlay.update(|s| s.last_text = Some(text.to_string()));
        let injector = self.injector.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = injector.inject(&text) {
                log::error!("text injection failed: {e}");
            }
        });
    }

    fn speak(&self, session: SessionId, text: &str) {
        if let Some(previous) = self.take_playback() {
            previous.abort();
        }
        self.overlay.update(|s| {
            s.indicator = Indicator::Speaking;
            s.touch();
        });

        let speaker = Arc::clone(&self.speaker);
        let events = self.events.clone();
        let text = text.to_string();
        let task = tokio::spawn(async move {
            if let Err(e) = speaker.speak(&text).await {
                log::warn!("speech for session {session} failed: {e}");
            }
            let _ = events.send(OrchestratorEvent::SpeechFinished(session)).await;
        });
        *self.playback.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
    }

    fn stop_speaking(&self) {
        self.speaker.stop();
        if let Some(task) = self.take_playback() {
            task.abort();
        }
    }

    fn show_error(&self, message: &str) {
        log::warn!("session error shown: {message}");
        self.overlay.update(|s| {
            s.last_error = Some(message.to_string());
            s.touch();
        });
    }

    fn show_toggles(&self, pinned: bool, tts_enabled: bool) {
        self.overlay.update(|s| {
            s.pinned = pinned;
            s.tts_enabled = tts_enabled;
            s.touch();
        });
    }
}
