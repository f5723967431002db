//! Voice Assistant entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the backend gateway, speaker and presenter.
//! 5. Start the wake-word listener (parked until a phrase is set).
//! 6. Spawn the [`ModeOrchestrator`] on the tokio runtime.
//! 7. Spawn the hotkey listener thread.
//! 8. Run [`eframe::run_native`], which blocks until the window
//!    is closed, then shut the orchestrator down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::sync::mpsc;
use voice_assistant::{
    app::{native_options, OverlayApp},
    audio::{CpalMicrophone, DeviceLease, Microphone},
    backend::{BackendGateway, GroqGateway, RetryingGateway},
    config::{AppConfig, AppPaths, HotkeyConfig, ModeConfig, TomlSettingsStore},
    history::AnswerHistory,
    hotkey::{HotkeyListener, KeyMap, SharedKeyMap},
    inject::ClipboardSelection,
    orchestrator::{Collaborators, ModeOrchestrator, OrchestratorEvent},
    present::{DesktopPresenter, OverlayState, SharedOverlay},
    screen::CommandScreenshot,
    speech::GroqSpeaker,
    wake::{NoWake, SegmenterSettings, TranscriptSpotter, WakeControl, WakeWordDetector},
};

/// Room for a burst of key events while a backend reply is being handled.
const EVENT_CAPACITY: usize = 64;

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Voice Assistant starting up");

    // 2. Configuration
    let paths = AppPaths::new();
    let config = AppConfig::load_from(&paths.settings_file).unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e:#}); using defaults");
        AppConfig::default()
    });
    let api_key = config.backend.api_key();
    if api_key.is_none() {
        log::warn!(
            "{} is not set; every request will fail until it is",
            config.backend.api_key_env
        );
    }

    // 3. Tokio runtime (2 worker threads)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let (events_tx, events_rx) = mpsc::channel::<OrchestratorEvent>(EVENT_CAPACITY);

    // 4. Backend, speech, presentation
    let gateway: Arc<dyn BackendGateway> = Arc::new(RetryingGateway::new(
        GroqGateway::new(
            &config.backend,
            api_key.clone(),
            config.audio.min_recording_secs,
        ),
        config.backend.max_retries,
        Duration::from_millis(config.backend.retry_base_ms),
    ));
    let speaker = Arc::new(GroqSpeaker::new(&config.backend, &config.tts, api_key));

    let overlay = SharedOverlay::new(OverlayState::new(
        config.ui.chat_message_limit,
        config.ui.chat_pinned,
        config.tts.enabled,
    ));
    let presenter = Arc::new(DesktopPresenter::new(
        overlay.clone(),
        speaker,
        events_tx.clone(),
        config.ui.chat_enabled,
    ));

    let history = Arc::new(AnswerHistory::new(
        config.history.answer_limit,
        config.history.persist.then(|| paths.history_file.clone()),
    ));

    let keymap = match KeyMap::from_config(&config.hotkey) {
        Ok(map) => map,
        Err(e) => {
            log::warn!("Invalid key bindings ({e}); using defaults");
            KeyMap::from_config(&HotkeyConfig::default())?
        }
    };
    let keymap = SharedKeyMap::new(keymap);

    let microphone: Arc<dyn Microphone> = Arc::new(CpalMicrophone::new());
    let lease = Arc::new(DeviceLease::new());
    let mode_config = ModeConfig::from_app(&config);

    // 5. Wake-word listener
    let phrase = mode_config.wake_phrase.clone();
    if phrase.is_none() {
        log::info!("No wake phrase set; hands-free trigger off");
    }
    let spotter = Arc::new(TranscriptSpotter::new(
        Arc::clone(&gateway),
        phrase.as_deref().unwrap_or_default(),
    ));
    let wake: Arc<dyn WakeControl> = match WakeWordDetector::start(
        Arc::clone(&microphone),
        Arc::clone(&lease),
        spotter,
        phrase,
        &SegmenterSettings::with_threshold(config.wake_word.energy_threshold),
        events_tx.clone(),
        rt.handle().clone(),
    ) {
        Ok(detector) => Arc::new(detector),
        Err(e) => {
            log::warn!("Wake-word listener unavailable: {e}");
            Arc::new(NoWake)
        }
    };

    // 6. Orchestrator
    let deps = Collaborators {
        microphone,
        gateway,
        sink: presenter,
        history: history.clone(),
        selection: Arc::new(ClipboardSelection::default()),
        screen: Arc::new(CommandScreenshot::default()),
        wake,
        lease,
        keymap: keymap.clone(),
        settings: Arc::new(TomlSettingsStore::new(paths.settings_file.clone())),
    };
    let orchestrator = ModeOrchestrator::new(
        mode_config,
        deps,
        events_tx.clone(),
        config.history.max_history_tokens,
    );
    let orchestrator_task = rt.spawn(orchestrator.run(events_rx));

    // 7. Hotkey listener thread
    let _hotkey_listener = HotkeyListener::start(keymap, events_tx.clone());

    // 8. Overlay (blocks until the window is closed)
    let app = OverlayApp::new(overlay, history, events_tx.clone(), config.clone());
    let result = eframe::run_native(
        "Voice Assistant",
        native_options(&config),
        Box::new(move |_cc| Ok(Box::new(app))),
    );

    rt.block_on(async {
        let _ = events_tx.send(OrchestratorEvent::Shutdown).await;
        if let Err(e) = orchestrator_task.await {
            log::warn!("orchestrator task ended abnormally: {e}");
        }
    });
    log::info!("Voice Assistant stopped");
    result.map_err(|e| anyhow!("overlay failed: {e}"))
}
