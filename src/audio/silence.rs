//! Trailing-silence detection for an open capture.
//!
//! ## Algorithm
//!
//! Incoming 16 kHz mono audio is cut into 30 ms frames (480 samples).  A
//! frame is *voiced* when its RMS exceeds the configured threshold.
//!
//! ```text
//!   quiet quiet VOICE VOICE quiet quiet quiet ... quiet
//!   ^ not armed  ^ armed        ^ quiet run starts    ^ run >= timeout → fire
//! ```
//!
//! The detector only arms after the first voiced frame, so a user who takes
//! a moment before speaking is not cut off.  It fires at most once.

use std::time::Duration;

use super::resample::TARGET_RATE;

/// 30 ms at 16 kHz.
pub const FRAME_SAMPLES: usize = 480;

/// Root-mean-square amplitude of `frame` (0.0 for an empty frame).
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let mean_sq = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
    mean_sq.sqrt()
}

/// Tunables for [`SilenceDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceSettings {
    /// RMS amplitude below which a frame counts as quiet.
    pub threshold: f32,
    /// Quiet duration after speech that raises the signal.
    pub timeout: Duration,
}

impl Default for SilenceSettings {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            timeout: Duration::from_millis(1500),
        }
    }
}

/// Streaming detector fed with consecutive chunks of a single capture.
#[derive(Debug)]
pub struct SilenceDetector {
    threshold: f32,
    quiet_frames_needed: usize,
    /// Samples that did not yet fill a whole frame.
    pending: Vec<f32>,
    armed: bool,
    quiet_run: usize,
    fired: bool,
}

impl SilenceDetector {
    pub fn new(settings: SilenceSettings) -> Self {
        let frame_secs = FRAME_SAMPLES as f64 / TARGET_RATE as f64;
        let needed = (settings.timeout.as_secs_f64() / frame_secs).ceil() as usize;
        Self {
            threshold: settings.threshold,
            quiet_frames_needed: needed.max(1),
            pending: Vec::with_capacity(FRAME_SAMPLES),
            armed: false,
            quiet_run: 0,
            fired: false,
        }
    }

    /// Feed the next chunk.  Returns `true` exactly once, on the frame that
    /// completes the quiet run.
    pub fn push(&mut self, samples: &[f32]) -> bool {
        if self.fired {
            return false;
        }
        self.pending.extend_from_slice(samples);

        let mut consumed = 0;
        let mut triggered = false;
        for frame in self.pending.chunks_exact(FRAME_SAMPLES) {
            consumed += FRAME_SAMPLES;
            if rms(frame) > self.threshold {
                self.armed = true;
                self.quiet_run = 0;
            } else if self.armed {
                self.quiet_run += 1;
                if self.quiet_run >= self.quiet_frames_needed {
                    triggered = true;
                    break;
                }
            }
        }
        self.pending.drain(..consumed);

        if triggered {
            self.fired = true;
            self.pending.clear();
        }
        triggered
    }

    /// `true` once a voiced frame has been seen.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}
