//! [`ModeOrchestrator`]: the one place session state changes.
//!
//! # State machine
//!
//! ```text
//!                 mode key / wake-word
//!        Idle ─────────────────────────► Capturing(mode)
//!         ▲  ◄── cancel, same key again ──┘     │
//!         │                                     │ key up / silence / limit
//!         │  ◄── failure (one error shown) ─┐   ▼
//!         │                           Submitting(mode)
//!         │  ◄── success, no speech ────────────┤
//!         │                                     │ success, Chat/Vision + TTS
//!         └──── speech finished / cancel ── Speaking
//! ```
//!
//! A different mode key pre-empts Capturing, Submitting and Speaking: the
//! old session is torn down and the new one starts.  Vision leaves
//! Submitting for the backend only once both the spoken question and the
//! screenshot are in.
//!
//! # Concurrency
//!
//! The orchestrator runs as a single tokio task reading one channel.
//! Threads and tasks that produce events (hotkeys, wake-word, the capture
//! analysis thread, timers, screenshot and backend workers, speech) only
//! send.  Every completion event carries a [`SessionId`]; ones that do not
//! match the current session are dropped in [`ModeOrchestrator::handle`].
//!
//! Device work that can block (suspending the wake-word listener, opening
//! and closing the microphone) runs on the blocking pool and is awaited,
//! so the runtime keeps serving other tasks while one event is applied.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::event::{Mode, OrchestratorEvent, SessionId, TriggerSource};
use super::session::{Session, SessionError, SessionStatus};
use crate::audio::{
    AudioBuffer, AudioCaptureSession, CaptureError, CaptureOptions, DeviceLease, LeaseHolder,
    Microphone,
};
use crate::backend::prompt::rewrite_request;
use crate::backend::{BackendError, BackendGateway, ChatMessage, Completion, Role, SpokenInput};
use crate::config::{ModeConfig, SettingsStore};
use crate::history::{Conversation, HistoryEntry, HistoryStore};
use crate::hotkey::{Binding, KeyMap, SharedKeyMap};
use crate::inject::SelectionSource;
use crate::present::PresentationSink;
use crate::screen::{ScreenCapture, ScreenError, Screenshot};
use crate::wake::WakeControl;

/// Everything the orchestrator drives, behind traits so tests can swap in
/// doubles.
#[derive(Clone)]
pub struct Collaborators {
    pub microphone: Arc<dyn Microphone>,
    pub gateway: Arc<dyn BackendGateway>,
    pub sink: Arc<dyn PresentationSink>,
    pub history: Arc<dyn HistoryStore>,
    pub selection: Arc<dyn SelectionSource>,
    pub screen: Arc<dyn ScreenCapture>,
    pub wake: Arc<dyn WakeControl>,
    pub lease: Arc<DeviceLease>,
    pub keymap: SharedKeyMap,
    pub settings: Arc<dyn SettingsStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Capturing(Mode),
    Submitting(Mode),
    Speaking,
}

/// The non-terminal session and the resources it holds.
struct Active {
    session: Session,
    capture: Option<AudioCaptureSession>,
    /// Vision: the question, parked until the screenshot arrives.
    audio: Option<AudioBuffer>,
    screenshot: Option<Screenshot>,
    timer: Option<JoinHandle<()>>,
    /// Screenshot and backend workers.
    tasks: Vec<JoinHandle<()>>,
}

/// A backend call, built on the orchestrator task and sent from a worker.
enum Request {
    Transcribe(AudioBuffer),
    Chat(AudioBuffer, Vec<ChatMessage>),
    Rewrite(String, AudioBuffer, Vec<ChatMessage>),
    Vision(Screenshot, AudioBuffer, Vec<ChatMessage>),
}

impl Request {
    async fn send(self, gateway: &dyn BackendGateway) -> Result<Completion, BackendError> {
        match self {
            Request::Transcribe(audio) => gateway.transcribe(audio).await,
            Request::Chat(audio, history) => {
                gateway.chat(SpokenInput::Audio(audio), history).await
            }
            Request::Rewrite(selection, audio, history) => {
                gateway.rewrite(selection, audio, history).await
            }
            Request::Vision(image, audio, history) => {
                gateway.vision(image, SpokenInput::Audio(audio), history).await
            }
        }
    }
}

pub struct ModeOrchestrator {
    config: ModeConfig,
    deps: Collaborators,
    /// Cloned into every worker so it can report back.
    events: mpsc::Sender<OrchestratorEvent>,
    state: OrchestratorState,
    active: Option<Active>,
    last_id: u64,
    conversation: Conversation,
}

impl ModeOrchestrator {
    /// `events` must be the sending half of the channel later passed to
    /// [`run`](Self::run).
    pub fn new(
        config: ModeConfig,
        deps: Collaborators,
        events: mpsc::Sender<OrchestratorEvent>,
        max_history_tokens: usize,
    ) -> Self {
        Self {
            config,
            deps,
            events,
            state: OrchestratorState::Idle,
            active: None,
            last_id: 0,
            conversation: Conversation::new(max_history_tokens),
        }
    }

    /// Consume events until `Shutdown` or until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<OrchestratorEvent>) {
        log::info!("orchestrator started");
        while let Some(event) = rx.recv().await {
            let stop = matches!(event, OrchestratorEvent::Shutdown);
            self.handle(event).await;
            if stop {
                break;
            }
        }
        self.shutdown().await;
        log::info!("orchestrator stopped");
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.active.as_ref().map(|a| &a.session)
    }

    pub fn config(&self) -> &ModeConfig {
        &self.config
    }

    /// Apply one event.  The only method that changes state.
    pub async fn handle(&mut self, event: OrchestratorEvent) {
        if let Some(id) = event.session() {
            if self.current_id() != Some(id) {
                log::debug!("discarding stale event for session {id}");
                return;
            }
        }

        match event {
            OrchestratorEvent::HotkeyPressed(binding) => self.on_pressed(binding).await,
            OrchestratorEvent::HotkeyReleased(binding) => self.on_released(binding).await,
            OrchestratorEvent::WakeWordFired => self.on_wake_word().await,
            OrchestratorEvent::SilenceDetected(_) => self.on_input_ended("silence").await,
            OrchestratorEvent::CaptureLimitReached(_) => self.on_input_ended("time limit").await,
            OrchestratorEvent::ScreenshotReady { result, .. } => self.on_screenshot(result).await,
            OrchestratorEvent::BackendCompleted { result, .. } => self.on_completed(result).await,
            OrchestratorEvent::SpeechFinished(_) => self.on_speech_finished(),
            OrchestratorEvent::Cancel => self.cancel().await,
            OrchestratorEvent::UpdateSettings(config) => self.apply_settings(config),
            OrchestratorEvent::Shutdown => self.shutdown().await,
        }
    }

    // ── Triggers ─────────────────────────────────────────────────────────

    async fn on_pressed(&mut self, binding: Binding) {
        let Some(mode) = binding.mode() else {
            match binding {
                Binding::Cancel => self.cancel().await,
                Binding::PinToggle | Binding::TtsToggle => self.toggle(binding),
                _ => {}
            }
            return;
        };

        let trigger = TriggerSource::Hotkey(binding);
        match self.state {
            OrchestratorState::Idle => {}
            OrchestratorState::Capturing(_) if self.current_trigger() == Some(trigger) => {
                log::info!("{binding:?} pressed again, cancelling");
                self.cancel().await;
                return;
            }
            OrchestratorState::Submitting(current) if current == mode => {
                log::debug!("{mode:?} already submitting, press ignored");
                return;
            }
            OrchestratorState::Capturing(_) | OrchestratorState::Submitting(_) => {
                log::info!("{mode:?} pre-empts the current session");
                self.abandon().await;
            }
            OrchestratorState::Speaking => {
                self.deps.sink.stop_speaking();
                self.abandon().await;
            }
        }
        self.start_session(mode, trigger).await;
    }

    async fn on_released(&mut self, binding: Binding) {
        let ours = matches!(self.state, OrchestratorState::Capturing(_))
            && self.current_trigger() == Some(TriggerSource::Hotkey(binding));
        if ours {
            self.finish_input("key release").await;
        } else {
            log::trace!("release of {binding:?} ignored");
        }
    }

    async fn on_wake_word(&mut self) {
        if self.state != OrchestratorState::Idle {
            log::debug!("wake word ignored while {:?}", self.state);
            return;
        }
        self.start_session(Mode::Chat, TriggerSource::WakeWord).await;
    }

    async fn on_input_ended(&mut self, reason: &str) {
        if matches!(self.state, OrchestratorState::Capturing(_)) {
            self.finish_input(reason).await;
        }
    }

    // ── Session lifecycle ────────────────────────────────────────────────

    async fn start_session(&mut self, mode: Mode, trigger: TriggerSource) {
        self.last_id += 1;
        let id = SessionId(self.last_id);

        let selection = if mode == Mode::Rewrite {
            match self.snapshot_selection().await {
                Some(text) => Some(text),
                None => {
                    self.reject(id, SessionError::InvalidSelection);
                    return;
                }
            }
        } else {
            None
        };

        let options = CaptureOptions {
            // The Vision question ends on key release or the limit only.
            silence: (mode != Mode::Vision).then(|| self.config.silence()),
            max_duration: self.config.max_recording,
        };
        let events = self.events.clone();
        let runtime = Handle::current();
        // Runs on the analysis thread.  The send waits for room on the
        // runtime, so a full channel delays the signal instead of losing it.
        let on_silence = move || {
            runtime.spawn(async move {
                if events.send(OrchestratorEvent::SilenceDetected(id)).await.is_err() {
                    log::debug!("orchestrator gone; silence for session {id} dropped");
                }
            });
        };
        let capture = match self.open_capture(id, options, on_silence).await {
            Ok(capture) => capture,
            Err(e) => {
                self.reject(id, e);
                return;
            }
        };

        let mut tasks = Vec::new();
        if mode == Mode::Vision {
            tasks.push(self.spawn_screenshot(id));
        }
        self.active = Some(Active {
            session: Session::new(id, mode, trigger, selection),
            capture: Some(capture),
            audio: None,
            screenshot: None,
            timer: Some(self.spawn_timer(id)),
            tasks,
        });
        self.state = OrchestratorState::Capturing(mode);
        log::info!("session {id}: {mode:?} started by {trigger:?}");
        self.deps.sink.show_recording_indicator(mode);
    }

    /// Quiet the wake-word listener, take the lease and open the
    /// microphone.  The lease is handed back if the open fails.
    async fn open_capture(
        &self,
        id: SessionId,
        options: CaptureOptions,
        on_silence: impl FnOnce() + Send + 'static,
    ) -> Result<AudioCaptureSession, SessionError> {
        let wake = Arc::clone(&self.deps.wake);
        let lease = Arc::clone(&self.deps.lease);
        let microphone = Arc::clone(&self.deps.microphone);
        let opened = tokio::task::spawn_blocking(move || -> Result<_, SessionError> {
            wake.suspend();
            lease.acquire_session(id)?;
            AudioCaptureSession::start(microphone.as_ref(), options, on_silence).map_err(|e| {
                lease.release(LeaseHolder::Session(id));
                SessionError::from(e)
            })
        })
        .await;
        opened.unwrap_or_else(|e| {
            self.deps.lease.release(LeaseHolder::Session(id));
            Err(SessionError::DeviceUnavailable(format!("capture task failed: {e}")))
        })
    }

    async fn snapshot_selection(&self) -> Option<String> {
        let source = Arc::clone(&self.deps.selection);
        match tokio::task::spawn_blocking(move || source.snapshot()).await {
            Ok(Ok(selection)) => selection,
            Ok(Err(e)) => {
                log::warn!("selection snapshot failed: {e}");
                None
            }
            Err(e) => {
                log::error!("selection snapshot task failed: {e}");
                None
            }
        }
    }

    fn spawn_timer(&self, id: SessionId) -> JoinHandle<()> {
        let events = self.events.clone();
        let limit = self.config.max_recording;
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            let _ = events.send(OrchestratorEvent::CaptureLimitReached(id)).await;
        })
    }

    fn spawn_screenshot(&self, id: SessionId) -> JoinHandle<()> {
        let screen = Arc::clone(&self.deps.screen);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || screen.capture())
                .await
                .unwrap_or_else(|e| Err(ScreenError::Read(e.to_string())));
            let _ = events
                .send(OrchestratorEvent::ScreenshotReady {
                    session: id,
                    result,
                })
                .await;
        })
    }

    /// Stop the capture and move to Submitting.  Runs at most once per
    /// session: the capture is taken on the first call.
    async fn finish_input(&mut self, reason: &str) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(capture) = active.capture.take() else {
            return;
        };
        if let Some(timer) = active.timer.take() {
            timer.abort();
        }
        let id = active.session.id;
        let mode = active.session.mode;

        let stopped = stop_capture(capture).await;
        self.deps.lease.release(LeaseHolder::Session(id));
        let audio = match stopped {
            Ok(audio) => audio,
            Err(e) => {
                self.fail(e.into()).await;
                return;
            }
        };
        log::info!(
            "session {id}: {:.1}s captured, ended by {reason}",
            audio.duration_secs()
        );

        self.state = OrchestratorState::Submitting(mode);
        self.deps.sink.show_processing_indicator(mode);
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.session.status = SessionStatus::Processing;
        if mode == Mode::Vision && active.screenshot.is_none() {
            log::debug!("session {id}: question ready, waiting for screenshot");
            active.audio = Some(audio);
            return;
        }
        self.submit(audio);
    }

    async fn on_screenshot(&mut self, result: Result<Screenshot, ScreenError>) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.session.mode != Mode::Vision || self.state == OrchestratorState::Speaking {
            return;
        }
        match result {
            Ok(image) => {
                active.screenshot = Some(image);
                if let Some(audio) = active.audio.take() {
                    self.submit(audio);
                }
            }
            Err(e) => self.fail(e.into()).await,
        }
    }

    fn submit(&mut self, audio: AudioBuffer) {
        let history = self.conversation.messages();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let id = active.session.id;
        let request = match active.session.mode {
            Mode::Dictation => Request::Transcribe(audio),
            Mode::Chat => Request::Chat(audio, history),
            Mode::Rewrite => {
                let selection = active.session.selection.clone().unwrap_or_default();
                Request::Rewrite(selection, audio, history)
            }
            Mode::Vision => match active.screenshot.take() {
                Some(image) => Request::Vision(image, audio, history),
                None => {
                    log::error!("session {id}: vision submitted without a screenshot");
                    return;
                }
            },
        };

        let gateway = Arc::clone(&self.deps.gateway);
        let events = self.events.clone();
        active.tasks.push(tokio::spawn(async move {
            let result = request.send(gateway.as_ref()).await;
            let _ = events
                .send(OrchestratorEvent::BackendCompleted {
                    session: id,
                    result,
                })
                .await;
        }));
        log::debug!("session {id}: submitted");
    }

    async fn on_completed(&mut self, result: Result<Completion, BackendError>) {
        if !matches!(self.state, OrchestratorState::Submitting(_)) {
            log::debug!("completion ignored while {:?}", self.state);
            return;
        }
        match result {
            Ok(completion) => self.complete(completion),
            Err(e) => self.fail(e.into()).await,
        }
    }

    fn complete(&mut self, completion: Completion) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.session.status = SessionStatus::Completed;
        let id = active.session.id;
        let mode = active.session.mode;
        let selection = active.session.selection.clone();
        log::info!("session {id}: {mode:?} completed");

        let entry = HistoryEntry::new(mode, &completion.heard, &completion.text);
        if let Err(e) = self.deps.history.append(entry) {
            log::warn!("could not record history: {e}");
        }
        self.remember(mode, &completion, selection.as_deref());
        self.deps.sink.hide_recording_indicator();

        if !mode.is_conversational() {
            self.deps.sink.inject_text_at_cursor(&completion.text);
            self.go_idle();
            return;
        }

        self.deps.sink.append_chat_message(Role::User, &completion.heard);
        self.deps.sink.append_chat_message(Role::Assistant, &completion.text);
        if self.config.tts_enabled {
            self.deps.sink.speak(id, &completion.text);
            self.state = OrchestratorState::Speaking;
        } else {
            self.go_idle();
        }
    }

    /// Extend the chat context with a finished exchange.
    fn remember(&mut self, mode: Mode, completion: &Completion, selection: Option<&str>) {
        let user = match mode {
            Mode::Dictation => return,
            Mode::Chat => completion.heard.clone(),
            Mode::Rewrite => rewrite_request(&completion.heard, selection.unwrap_or_default()),
            Mode::Vision => format!("[Screenshot] {}", completion.heard),
        };
        self.conversation.push(Role::User, user);
        self.conversation.push(Role::Assistant, completion.text.clone());
    }

    fn on_speech_finished(&mut self) {
        if self.state == OrchestratorState::Speaking {
            self.deps.sink.hide_recording_indicator();
            self.go_idle();
        }
    }

    // ── Endings ──────────────────────────────────────────────────────────

    /// Drop the current session.  No effect while Idle.
    async fn cancel(&mut self) {
        match self.state {
            OrchestratorState::Idle => {
                log::debug!("nothing to cancel");
                return;
            }
            OrchestratorState::Speaking => self.deps.sink.stop_speaking(),
            OrchestratorState::Capturing(_) | OrchestratorState::Submitting(_) => {}
        }
        if let Some(id) = self.current_id() {
            log::info!("session {id} cancelled");
        }
        self.abandon().await;
        self.go_idle();
    }

    async fn fail(&mut self, err: SessionError) {
        match self.current_id() {
            Some(id) => log::warn!("session {id} failed: {err}"),
            None => log::warn!("session failed: {err}"),
        }
        self.teardown(SessionStatus::Failed).await;
        self.deps.sink.hide_recording_indicator();
        self.deps.sink.show_error(&err.user_message());
        self.go_idle();
    }

    /// A session that never got going.  Nothing to tear down yet.
    fn reject(&mut self, id: SessionId, err: SessionError) {
        log::warn!("session {id} rejected: {err}");
        self.deps.sink.show_error(&err.user_message());
        self.go_idle();
    }

    /// Tear down without leaving Capturing/Submitting/Speaking; the caller
    /// either starts a new session or goes idle.
    async fn abandon(&mut self) {
        self.teardown(SessionStatus::Cancelled).await;
        self.deps.sink.hide_recording_indicator();
    }

    /// Abort workers, close the capture, give back the microphone.
    async fn teardown(&mut self, status: SessionStatus) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let Some(timer) = active.timer.take() {
            timer.abort();
        }
        for task in active.tasks.drain(..) {
            task.abort();
        }
        active.audio = None;
        if !active.session.status.is_terminal() {
            active.session.status = status;
        }
        let id = active.session.id;
        if let Some(capture) = active.capture.take() {
            cancel_capture(capture).await;
        }
        self.deps.lease.release(LeaseHolder::Session(id));
    }

    fn go_idle(&mut self) {
        self.state = OrchestratorState::Idle;
        self.active = None;
        self.deps.wake.resume();
    }

    async fn shutdown(&mut self) {
        if self.state == OrchestratorState::Speaking {
            self.deps.sink.stop_speaking();
        }
        self.teardown(SessionStatus::Cancelled).await;
        self.state = OrchestratorState::Idle;
        self.active = None;
    }

    // ── Settings ─────────────────────────────────────────────────────────

    fn toggle(&mut self, binding: Binding) {
        if self.state != OrchestratorState::Idle {
            log::debug!("{binding:?} ignored while {:?}", self.state);
            return;
        }
        let config = match binding {
            Binding::PinToggle => self.config.with_pinned(!self.config.pinned),
            Binding::TtsToggle => self.config.with_tts(!self.config.tts_enabled),
            _ => return,
        };
        if let Err(e) = self
            .deps
            .settings
            .persist_toggles(config.pinned, config.tts_enabled)
        {
            log::warn!("could not save toggles: {e:#}");
        }
        log::info!("pinned={} tts={}", config.pinned, config.tts_enabled);
        self.deps.sink.show_toggles(config.pinned, config.tts_enabled);
        self.config = config;
    }

    fn apply_settings(&mut self, config: ModeConfig) {
        if config.keys != self.config.keys {
            match KeyMap::from_config(&config.keys) {
                Ok(map) => self.deps.keymap.replace(map),
                Err(e) => log::warn!("keeping previous key bindings: {e}"),
            }
        }
        if config.wake_phrase != self.config.wake_phrase {
            self.deps.wake.set_phrase(config.wake_phrase.clone());
        }
        self.deps.sink.show_toggles(config.pinned, config.tts_enabled);
        self.config = config;
        log::info!("settings updated");
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn current_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.session.id)
    }

    fn current_trigger(&self) -> Option<TriggerSource> {
        self.active.as_ref().map(|a| a.session.trigger)
    }
}

/// Close the stream and collect the recording on the blocking pool.
async fn stop_capture(mut capture: AudioCaptureSession) -> Result<AudioBuffer, CaptureError> {
    tokio::task::spawn_blocking(move || capture.stop())
        .await
        .unwrap_or_else(|e| Err(CaptureError::Stream(format!("capture task failed: {e}"))))
}

async fn cancel_capture(mut capture: AudioCaptureSession) {
    if let Err(e) = tokio::task::spawn_blocking(move || capture.cancel()).await {
        log::error!("capture cancel task failed: {e}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
