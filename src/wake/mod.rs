//! Hands-free trigger: listen for a spoken phrase and start a Chat session.
//!
//! # Threading
//!
//! [`WakeWordDetector`] owns one `wake-word` thread that holds the
//! microphone while listening.  Everything reaches it as a [`Control`]
//! message on a std channel: audio chunks from the stream callback,
//! spotter verdicts from the tokio runtime, and suspend / resume / phrase
//! changes from the orchestrator.
//!
//! ```text
//!            resume (lease free)            suspend
//! Suspended ───────────────────► Listening ─────────► Suspended
//!     ▲                            │  ▲  │
//!     │ suspend      phrase heard  │  │  │ phrase cleared
//!     └──────────────── Fired ◄────┘  │  ▼
//!                         │ resume    Parked
//!                         └───► Listening (or Parked without a phrase)
//! ```
//!
//! Setting a phrase while Parked starts listening straight away.
//!
//! The stream is closed and the [`DeviceLease`] released *before*
//! `suspend()` returns and before `WakeWordFired` is sent, so a capture
//! session that starts right after can always take the microphone.

pub mod segment;
pub mod spotter;

pub use segment::{SegmenterSettings, UtteranceSegmenter};
pub use spotter::{PhraseSpotter, TranscriptSpotter};

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::audio::{DeviceLease, LeaseHolder, Microphone, StreamGuard};
use crate::orchestrator::OrchestratorEvent;

/// Longest `suspend()` waits for the listener thread to let go of the
/// microphone.
const SUSPEND_TIMEOUT: Duration = Duration::from_secs(2);

/// What the orchestrator needs from the wake-word listener.
pub trait WakeControl: Send + Sync {
    /// Stop listening and release the microphone.  Returns once released.
    fn suspend(&self);
    /// Listen again.  Also ends the cool-down after a detection.
    fn resume(&self);
    /// Change the phrase.  `None` stops listening until one is set again.
    fn set_phrase(&self, phrase: Option<String>);
}

/// Wake-word disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWake;

impl WakeControl for NoWake {
    fn suspend(&self) {}
    fn resume(&self) {}
    fn set_phrase(&self, phrase: Option<String>) {
        if phrase.is_some() {
            log::warn!("wake-word listener is not running; phrase change ignored");
        }
    }
}

enum Control {
    Audio { epoch: u64, chunk: Vec<f32> },
    Spotted { epoch: u64 },
    Suspend(std_mpsc::Sender<()>),
    Resume,
    SetPhrase(Option<String>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Listening,
    Suspended,
    /// Detected; silent until the next resume.
    Fired,
    /// Free to listen, but there is no phrase.
    Parked,
}

pub struct WakeWordDetector {
    control: std_mpsc::Sender<Control>,
    thread: Option<JoinHandle<()>>,
}

impl WakeWordDetector {
    /// Spawn the listener thread.  With a `phrase` it starts listening
    /// straight away if the microphone is free; without one it stays parked
    /// until [`set_phrase`](WakeControl::set_phrase).  Spotting runs on
    /// `runtime`.
    pub fn start(
        mic: Arc<dyn Microphone>,
        lease: Arc<DeviceLease>,
        spotter: Arc<dyn PhraseSpotter>,
        phrase: Option<String>,
        settings: &SegmenterSettings,
        events: mpsc::Sender<OrchestratorEvent>,
        runtime: Handle,
    ) -> std::io::Result<Self> {
        let (control, rx) = std_mpsc::channel();
        let worker = Worker {
            mic,
            lease,
            spotter,
            events,
            runtime,
            control: control.clone(),
            segmenter: UtteranceSegmenter::new(settings),
            phase: Phase::Parked,
            enabled: false,
            epoch: 0,
            stream: None,
        };
        let thread = std::thread::Builder::new()
            .name("wake-word".into())
            .spawn(move || worker.run(phrase, rx))?;
        Ok(Self {
            control,
            thread: Some(thread),
        })
    }
}

impl WakeControl for WakeWordDetector {
    fn suspend(&self) {
        let (ack_tx, ack_rx) = std_mpsc::channel();
        if self.control.send(Control::Suspend(ack_tx)).is_err() {
            return;
        }
        if ack_rx.recv_timeout(SUSPEND_TIMEOUT).is_err() {
            log::warn!("wake-word listener did not release the microphone in time");
        }
    }

    fn resume(&self) {
        let _ = self.control.send(Control::Resume);
    }

    fn set_phrase(&self, phrase: Option<String>) {
        let _ = self.control.send(Control::SetPhrase(phrase));
    }
}

impl Drop for WakeWordDetector {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    mic: Arc<dyn Microphone>,
    lease: Arc<DeviceLease>,
    spotter: Arc<dyn PhraseSpotter>,
    events: mpsc::Sender<OrchestratorEvent>,
    runtime: Handle,
    control: std_mpsc::Sender<Control>,
    segmenter: UtteranceSegmenter,
    phase: Phase,
    /// A phrase is set.
    enabled: bool,
    /// Bumped whenever the stream closes; audio and verdicts from an
    /// older stream are ignored.
    epoch: u64,
    stream: Option<StreamGuard>,
}

impl Worker {
    fn run(mut self, phrase: Option<String>, rx: std_mpsc::Receiver<Control>) {
        self.set_phrase(phrase);
        while let Ok(msg) = rx.recv() {
            match msg {
                Control::Audio { epoch, chunk } => self.on_audio(epoch, &chunk),
                Control::Spotted { epoch } => self.on_spotted(epoch),
                Control::Suspend(ack) => {
                    self.close(Phase::Suspended);
                    let _ = ack.send(());
                }
                Control::Resume => self.resume(),
                Control::SetPhrase(phrase) => self.set_phrase(phrase),
                Control::Shutdown => break,
            }
        }
        self.close(Phase::Suspended);
        log::debug!("wake-word thread exiting");
    }

    fn resume(&mut self) {
        match self.phase {
            Phase::Listening | Phase::Parked => {}
            Phase::Suspended | Phase::Fired if self.enabled => self.listen(),
            Phase::Suspended | Phase::Fired => self.phase = Phase::Parked,
        }
    }

    fn set_phrase(&mut self, phrase: Option<String>) {
        match phrase {
            Some(phrase) => {
                self.spotter.set_phrase(&phrase);
                self.enabled = true;
                log::info!("wake phrase set to {phrase:?}");
                if self.phase == Phase::Parked {
                    self.listen();
                }
            }
            None => {
                if self.enabled {
                    log::info!("wake phrase cleared");
                }
                self.enabled = false;
                if self.phase == Phase::Listening {
                    self.close(Phase::Parked);
                }
            }
        }
    }

    fn listen(&mut self) {
        if let Err(e) = self.lease.acquire_detector() {
            log::debug!("wake-word listener waiting: {e}");
            self.phase = Phase::Suspended;
            return;
        }
        self.epoch += 1;
        self.segmenter.reset();

        let epoch = self.epoch;
        let control = self.control.clone();
        let sink = Box::new(move |chunk: Vec<f32>| {
            let _ = control.send(Control::Audio { epoch, chunk });
        });
        match self.mic.open(sink) {
            Ok(stream) => {
                self.stream = Some(stream);
                self.phase = Phase::Listening;
                log::debug!("wake-word listener active");
            }
            Err(e) => {
                log::warn!("wake-word listener cannot open microphone: {e}");
                self.lease.release(LeaseHolder::Detector);
                self.phase = Phase::Suspended;
            }
        }
    }

    fn close(&mut self, next: Phase) {
        self.epoch += 1;
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
        self.lease.release(LeaseHolder::Detector);
        self.phase = next;
    }

    fn on_audio(&mut self, epoch: u64, chunk: &[f32]) {
        if epoch != self.epoch || self.phase != Phase::Listening {
            return;
        }
        for utterance in self.segmenter.push(chunk) {
            let spotter = Arc::clone(&self.spotter);
            let control = self.control.clone();
            self.runtime.spawn(async move {
                if spotter.spot(utterance).await {
                    let _ = control.send(Control::Spotted { epoch });
                }
            });
        }
    }

    fn on_spotted(&mut self, epoch: u64) {
        if epoch != self.epoch || self.phase != Phase::Listening {
            log::debug!("ignoring late wake-word verdict");
            return;
        }
        log::info!("wake phrase detected");
        self.close(Phase::Fired);
        if self.events.blocking_send(OrchestratorEvent::WakeWordFired).is_err() {
            log::warn!("orchestrator gone; wake-word event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CaptureError, ChunkSink};
    use crate::orchestrator::SessionId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedMic {
        script: Vec<Vec<f32>>,
        open: Arc<AtomicUsize>,
        opened: AtomicUsize,
    }

    impl ScriptedMic {
        fn new(script: Vec<Vec<f32>>) -> Arc<Self> {
            Arc::new(Self {
                script,
                open: Arc::new(AtomicUsize::new(0)),
                opened: AtomicUsize::new(0),
            })
        }

        fn open_streams(&self) -> usize {
            self.open.load(Ordering::SeqCst)
        }
    }

    impl Microphone for ScriptedMic {
        fn open(&self, mut sink: ChunkSink) -> Result<StreamGuard, CaptureError> {
            for chunk in &self.script {
                sink(chunk.clone());
            }
            self.open.fetch_add(1, Ordering::SeqCst);
            self.opened.fetch_add(1, Ordering::SeqCst);
            let open = Arc::clone(&self.open);
            Ok(StreamGuard::new(move || {
                drop(sink);
                open.fetch_sub(1, Ordering::SeqCst);
            }))
        }
    }

    struct AlwaysSpot;

    #[async_trait]
    impl PhraseSpotter for AlwaysSpot {
        async fn spot(&self, _utterance: Vec<f32>) -> bool {
            true
        }

        fn set_phrase(&self, _phrase: &str) {}
    }

    fn phrase_audio() -> Vec<Vec<f32>> {
        vec![vec![0.2; 16 * 800], vec![0.0; 16 * 700]]
    }

    async fn eventually(f: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if f() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn start(
        mic: Arc<ScriptedMic>,
        lease: Arc<DeviceLease>,
    ) -> (WakeWordDetector, mpsc::Receiver<OrchestratorEvent>) {
        start_with(mic, lease, Some("hey aria".into()))
    }

    fn start_with(
        mic: Arc<ScriptedMic>,
        lease: Arc<DeviceLease>,
        phrase: Option<String>,
    ) -> (WakeWordDetector, mpsc::Receiver<OrchestratorEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let detector = WakeWordDetector::start(
            mic,
            lease,
            Arc::new(AlwaysSpot),
            phrase,
            &SegmenterSettings::default(),
            tx,
            Handle::current(),
        )
        .unwrap();
        (detector, rx)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fires_once_then_cools_down_until_resume() {
        let mic = ScriptedMic::new(phrase_audio());
        let lease = Arc::new(DeviceLease::new());
        let (detector, mut rx) = start(Arc::clone(&mic), Arc::clone(&lease));

        let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(ev, Some(OrchestratorEvent::WakeWordFired));
        // Microphone already handed back when the event arrives.
        assert_eq!(lease.holder(), LeaseHolder::Free);
        assert_eq!(mic.open_streams(), 0);

        assert!(tokio::time::timeout(Duration::from_millis(300), rx.recv()).await.is_err());

        detector.resume();
        let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(ev, Some(OrchestratorEvent::WakeWordFired));
        assert_eq!(mic.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn suspend_releases_microphone_before_returning() {
        let mic = ScriptedMic::new(Vec::new());
        let lease = Arc::new(DeviceLease::new());
        let (detector, _rx) = start(Arc::clone(&mic), Arc::clone(&lease));

        assert!(eventually(|| lease.holder() == LeaseHolder::Detector).await);
        detector.suspend();
        assert_eq!(lease.holder(), LeaseHolder::Free);
        assert_eq!(mic.open_streams(), 0);

        detector.resume();
        assert!(eventually(|| lease.holder() == LeaseHolder::Detector).await);
        assert_eq!(mic.open_streams(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn does_not_listen_while_a_session_holds_the_lease() {
        let mic = ScriptedMic::new(Vec::new());
        let lease = Arc::new(DeviceLease::new());
        lease.acquire_session(SessionId(1)).unwrap();
        let (detector, _rx) = start(Arc::clone(&mic), Arc::clone(&lease));

        detector.resume();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mic.opened.load(Ordering::SeqCst), 0);
        assert_eq!(lease.holder(), LeaseHolder::Session(SessionId(1)));

        lease.release(LeaseHolder::Session(SessionId(1)));
        detector.resume();
        assert!(eventually(|| lease.holder() == LeaseHolder::Detector).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drop_closes_the_stream() {
        let mic = ScriptedMic::new(Vec::new());
        let lease = Arc::new(DeviceLease::new());
        let (detector, _rx) = start(Arc::clone(&mic), Arc::clone(&lease));
        assert!(eventually(|| mic.open_streams() == 1).await);

        drop(detector);
        assert_eq!(mic.open_streams(), 0);
        assert_eq!(lease.holder(), LeaseHolder::Free);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn no_phrase_keeps_the_microphone_closed_until_one_is_set() {
        let mic = ScriptedMic::new(Vec::new());
        let lease = Arc::new(DeviceLease::new());
        let (detector, _rx) = start_with(Arc::clone(&mic), Arc::clone(&lease), None);

        detector.resume();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mic.opened.load(Ordering::SeqCst), 0);
        assert_eq!(lease.holder(), LeaseHolder::Free);

        detector.set_phrase(Some("hey aria".into()));
        assert!(eventually(|| lease.holder() == LeaseHolder::Detector).await);
        assert_eq!(mic.open_streams(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn clearing_the_phrase_parks_the_listener() {
        let mic = ScriptedMic::new(Vec::new());
        let lease = Arc::new(DeviceLease::new());
        let (detector, _rx) = start(Arc::clone(&mic), Arc::clone(&lease));
        assert!(eventually(|| mic.open_streams() == 1).await);

        detector.set_phrase(None);
        assert!(eventually(|| mic.open_streams() == 0).await);
        assert_eq!(lease.holder(), LeaseHolder::Free);

        // A session coming and going does not wake it up.
        detector.suspend();
        detector.resume();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mic.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn new_phrase_during_a_session_waits_for_resume() {
        let mic = ScriptedMic::new(Vec::new());
        let lease = Arc::new(DeviceLease::new());
        let (detector, _rx) = start_with(Arc::clone(&mic), Arc::clone(&lease), None);

        detector.suspend();
        lease.acquire_session(SessionId(3)).unwrap();
        detector.set_phrase(Some("hey aria".into()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mic.opened.load(Ordering::SeqCst), 0);

        lease.release(LeaseHolder::Session(SessionId(3)));
        detector.resume();
        assert!(eventually(|| lease.holder() == LeaseHolder::Detector).await);
    }

    #[test]
    fn no_wake_is_inert() {
        NoWake.suspend();
        NoWake.resume();
        NoWake.set_phrase(Some("hey aria".into()));
    }
}
