//! One microphone recording, from open to hand-off.
//!
//! ```text
//!  Microphone ──ChunkSink──► mpsc ──► analysis thread ──► samples (capped)
//!                                          │
//!                                          └─► SilenceDetector ─► on_silence()
//! ```
//!
//! [`AudioCaptureSession::stop`] closes the stream, waits for the analysis
//! thread to drain what is left in the channel and hands the samples out
//! as an [`AudioBuffer`].  [`AudioCaptureSession::cancel`] closes the stream
//! and throws everything away.  Either way the device is released before the
//! call returns.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::capture::{CaptureError, ChunkSink, Microphone, StreamGuard};
use super::resample::TARGET_RATE;
use super::silence::{SilenceDetector, SilenceSettings};
use super::wav::encode_wav;

// ---------------------------------------------------------------------------
// AudioBuffer
// ---------------------------------------------------------------------------

/// Finished recording.  Moved, never shared.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 16-bit PCM WAV bytes for upload.
    pub fn to_wav(&self) -> Vec<u8> {
        encode_wav(&self.samples, self.sample_rate)
    }
}

// ---------------------------------------------------------------------------
// CaptureOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    /// `None` disables the silence signal (Vision questions).
    pub silence: Option<SilenceSettings>,
    /// Samples beyond this duration are dropped.
    pub max_duration: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            silence: Some(SilenceSettings::default()),
            max_duration: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioCaptureSession
// ---------------------------------------------------------------------------

pub struct AudioCaptureSession {
    stream: Option<StreamGuard>,
    analysis: Option<JoinHandle<Vec<f32>>>,
    finished: bool,
}

impl AudioCaptureSession {
    /// Open `mic` and start buffering.
    ///
    /// `on_silence` runs on the analysis thread, at most once, when the
    /// quiet period after speech exceeds the configured timeout.
    ///
    /// # Errors
    ///
    /// Whatever the microphone reports when it cannot open; typically
    /// [`CaptureError::NoDevice`].
    pub fn start(
        mic: &dyn Microphone,
        options: CaptureOptions,
        on_silence: impl FnOnce() + Send + 'static,
    ) -> Result<Self, CaptureError> {
        let (tx, rx) = mpsc::channel::<Vec<f32>>();

        let analysis = thread::Builder::new()
            .name("capture-analysis".into())
            .spawn(move || analyse(rx, options, on_silence))
            .map_err(|e| CaptureError::Stream(format!("cannot spawn analysis thread: {e}")))?;

        let sink: ChunkSink = Box::new(move |chunk| {
            // The analysis thread only goes away after the stream is closed.
            let _ = tx.send(chunk);
        });

        // On failure the sink has been dropped, so the analysis thread ends
        // on its own; no need to join it here.
        let stream = mic.open(sink)?;

        Ok(Self {
            stream: Some(stream),
            analysis: Some(analysis),
            finished: false,
        })
    }

    /// Close the stream and return everything recorded.  Succeeds once.
    pub fn stop(&mut self) -> Result<AudioBuffer, CaptureError> {
        if self.finished {
            return Err(CaptureError::AlreadyFinished);
        }
        self.finished = true;

        if let Some(stream) = self.stream.take() {
            stream.close();
        }
        let samples = match self.analysis.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| CaptureError::Stream("analysis thread panicked".into()))?,
            None => Vec::new(),
        };
        log::debug!(
            "capture stopped: {:.2}s recorded",
            samples.len() as f32 / TARGET_RATE as f32
        );
        Ok(AudioBuffer::new(samples, TARGET_RATE))
    }

    /// Close the stream and discard the recording.  Safe to call repeatedly
    /// and after [`stop`](Self::stop).
    pub fn cancel(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
        // Detach: the thread exits as soon as the channel is closed.
        self.analysis.take();
        log::debug!("capture cancelled");
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for AudioCaptureSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for AudioCaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCaptureSession")
            .field("finished", &self.finished)
            .finish()
    }
}

fn analyse(
    rx: mpsc::Receiver<Vec<f32>>,
    options: CaptureOptions,
    on_silence: impl FnOnce(),
) -> Vec<f32> {
    let cap = (options.max_duration.as_secs_f64() * TARGET_RATE as f64) as usize;
    let mut detector = options.silence.map(SilenceDetector::new);
    let mut on_silence = Some(on_silence);
    let mut samples = Vec::with_capacity(cap.min(TARGET_RATE as usize * 10));

    while let Ok(chunk) = rx.recv() {
        if let Some(det) = detector.as_mut() {
            if det.push(&chunk) {
                if let Some(notify) = on_silence.take() {
                    log::debug!("silence detected");
                    notify();
                }
            }
        }
        let room = cap.saturating_sub(samples.len());
        samples.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
    samples
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::silence::FRAME_SAMPLES;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Delivers a fixed script of chunks at open time and tracks open streams.
    struct ScriptedMic {
        script: Vec<Vec<f32>>,
        open: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ScriptedMic {
        fn new(script: Vec<Vec<f32>>) -> Self {
            Self {
                script,
                open: Arc::new(AtomicUsize::new(0)),
                fail: false,
            }
        }
    }

    impl Microphone for ScriptedMic {
        fn open(&self, mut sink: ChunkSink) -> Result<StreamGuard, CaptureError> {
            if self.fail {
                return Err(CaptureError::NoDevice);
            }
            for chunk in &self.script {
                sink(chunk.clone());
            }
            self.open.fetch_add(1, Ordering::SeqCst);
            let open = Arc::clone(&self.open);
            Ok(StreamGuard::new(move || {
                drop(sink);
                open.fetch_sub(1, Ordering::SeqCst);
            }))
        }
    }

    fn no_silence() -> CaptureOptions {
        CaptureOptions {
            silence: None,
            max_duration: Duration::from_secs(60),
        }
    }

    #[test]
    fn stop_returns_buffer_once() {
        let mic = ScriptedMic::new(vec![vec![0.1; 1600], vec![0.2; 1600]]);
        let mut cap = AudioCaptureSession::start(&mic, no_silence(), || {}).unwrap();
        assert_eq!(mic.open.load(Ordering::SeqCst), 1);

        let buf = cap.stop().unwrap();
        assert_eq!(buf.samples.len(), 3200);
        assert_eq!(buf.sample_rate, TARGET_RATE);
        assert!((buf.duration_secs() - 0.2).abs() < 1e-6);
        assert_eq!(mic.open.load(Ordering::SeqCst), 0, "device released");

        assert!(matches!(cap.stop(), Err(CaptureError::AlreadyFinished)));
    }

    #[test]
    fn cancel_is_idempotent_and_releases() {
        let mic = ScriptedMic::new(vec![vec![0.1; 480]]);
        let mut cap = AudioCaptureSession::start(&mic, no_silence(), || {}).unwrap();
        cap.cancel();
        cap.cancel();
        assert_eq!(mic.open.load(Ordering::SeqCst), 0);
        assert!(matches!(cap.stop(), Err(CaptureError::AlreadyFinished)));
    }

    #[test]
    fn drop_releases_device() {
        let mic = ScriptedMic::new(vec![]);
        {
            let _cap = AudioCaptureSession::start(&mic, no_silence(), || {}).unwrap();
            assert_eq!(mic.open.load(Ordering::SeqCst), 1);
        }
        assert_eq!(mic.open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn open_failure_is_reported() {
        let mut mic = ScriptedMic::new(vec![]);
        mic.fail = true;
        let err = AudioCaptureSession::start(&mic, no_silence(), || {}).unwrap_err();
        assert!(matches!(err, CaptureError::NoDevice));
    }

    #[test]
    fn buffer_is_capped_at_max_duration() {
        let mic = ScriptedMic::new(vec![vec![0.0; 16_000]; 3]);
        let opts = CaptureOptions {
            silence: None,
            max_duration: Duration::from_millis(1500),
        };
        let mut cap = AudioCaptureSession::start(&mic, opts, || {}).unwrap();
        assert_eq!(cap.stop().unwrap().samples.len(), 24_000);
    }

    #[test]
    fn silence_callback_fires_once_after_speech() {
        let mut script = vec![vec![0.3; FRAME_SAMPLES * 10]];
        // 2 s of silence, in several chunks
        script.extend(std::iter::repeat(vec![0.0; 3200]).take(10));
        let mic = ScriptedMic::new(script);
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let opts = CaptureOptions {
            silence: Some(SilenceSettings {
                threshold: 0.01,
                timeout: Duration::from_millis(500),
            }),
            max_duration: Duration::from_secs(60),
        };
        let mut cap = AudioCaptureSession::start(&mic, opts, move || {
            f.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        // stop() joins the analysis thread, so every chunk has been seen.
        cap.stop().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn leading_silence_only_never_fires() {
        let mic = ScriptedMic::new(vec![vec![0.0; 48_000]]);
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let mut cap = AudioCaptureSession::start(&mic, CaptureOptions::default(), move || {
            f.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        cap.stop().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn wav_export_matches_length() {
        let buf = AudioBuffer::new(vec![0.0; 800], TARGET_RATE);
        assert_eq!(buf.to_wav().len(), 44 + 1600);
    }
}
