//! Microphone access via `cpal`.
//!
//! [`Microphone`] is the seam between device I/O and everything that
//! consumes audio.  An implementation opens an input stream and delivers
//! **16 kHz mono** chunks to a [`ChunkSink`] until the returned
//! [`StreamGuard`] is dropped.
//!
//! `cpal::Stream` is not `Send` on every platform, so [`CpalMicrophone`]
//! builds and owns the stream on a dedicated thread.  Opening is still
//! synchronous: [`Microphone::open`] returns only after that thread has
//! either started the stream or reported why it could not.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::resample::MonoConverter;

/// Receives converted 16 kHz mono chunks from the audio callback.
pub type ChunkSink = Box<dyn FnMut(Vec<f32>) + Send>;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio stream failed: {0}")]
    Stream(String),

    #[error("capture already finished")]
    AlreadyFinished,
}

// ---------------------------------------------------------------------------
// StreamGuard
// ---------------------------------------------------------------------------

/// Keeps an input stream open.  Dropping it closes the stream and drops the
/// [`ChunkSink`] it was feeding.
pub struct StreamGuard {
    on_close: std::sync::Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl StreamGuard {
    pub fn new(on_close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_close: std::sync::Mutex::new(Some(Box::new(on_close))),
        }
    }

    /// Close explicitly.  Same as dropping.
    pub fn close(mut self) {
        self.run_close();
    }

    fn run_close(&mut self) {
        let close = match self.on_close.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(close) = close {
            close();
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.run_close();
    }
}

impl std::fmt::Debug for StreamGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamGuard")
            .field(
                "open",
                &self
                    .on_close
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .is_some(),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

pub trait Microphone: Send + Sync {
    /// Open the input device and start delivering chunks to `sink`.
    fn open(&self, sink: ChunkSink) -> Result<StreamGuard, CaptureError>;
}

/// The system default input device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    pub fn new() -> Self {
        Self
    }
}

impl Microphone for CpalMicrophone {
    fn open(&self, sink: ChunkSink) -> Result<StreamGuard, CaptureError> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), CaptureError>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let worker = thread::Builder::new()
            .name("cpal-input".into())
            .spawn(move || {
                let stream = match build_stream(sink) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Park until the guard is dropped (sender dropped or signalled).
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("cpal input stream closed");
            })
            .map_err(|e| CaptureError::Stream(format!("cannot spawn input thread: {e}")))?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(StreamGuard::new(move || {
                drop(stop_tx);
                let _ = worker.join();
            })),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => Err(CaptureError::Stream(
                "input device did not start in time".into(),
            )),
        }
    }
}

fn build_stream(mut sink: ChunkSink) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
    let supported = device.default_input_config()?;

    let mut converter = MonoConverter::new(supported.sample_rate().0, supported.channels());
    let config: cpal::StreamConfig = supported.into();
    log::info!(
        "opening input device {:?} @ {} Hz, {} ch",
        device.name().unwrap_or_default(),
        config.sample_rate.0,
        config.channels
    );

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let chunk = converter.convert(data);
            if !chunk.is_empty() {
                sink(chunk);
            }
        },
        |err: cpal::StreamError| {
            log::error!("cpal stream error: {err}");
        },
        None,
    )?;
    stream.play()?;
    Ok(stream)
}
