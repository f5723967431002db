//! Energy-gated utterance segmentation for the wake-word listener.
//!
//! Audio is cut into 30 ms frames.  While quiet, frames go into a short
//! pre-roll ring so the first syllable is not clipped.  The first voiced
//! frame opens an utterance; it closes after `trailing_quiet` of silence.
//! Utterances whose voiced part is shorter than `min_len` are dropped.  One
//! that runs past `max_len` is dropped too, and nothing new opens until the
//! speaker pauses: a wake phrase is short.

use std::time::Duration;

use crate::audio::{rms, RingBuffer, FRAME_SAMPLES, TARGET_RATE};

#[derive(Debug, Clone, PartialEq)]
pub struct SegmenterSettings {
    /// Frame RMS at or above this counts as voiced.
    pub threshold: f32,
    pub min_len: Duration,
    pub max_len: Duration,
    pub trailing_quiet: Duration,
    pub pre_roll: Duration,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            min_len: Duration::from_millis(300),
            max_len: Duration::from_secs(3),
            trailing_quiet: Duration::from_millis(500),
            pre_roll: Duration::from_millis(300),
        }
    }
}

impl SegmenterSettings {
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }
}

pub struct UtteranceSegmenter {
    threshold: f32,
    min_samples: usize,
    max_samples: usize,
    quiet_samples: usize,
    pre_roll: RingBuffer<f32>,
    /// Incomplete trailing frame from the last push.
    partial: Vec<f32>,
    state: State,
}

enum State {
    Quiet,
    Speaking(Utterance),
    /// Dropped an overlong utterance; waiting for a pause.
    Overlong { quiet: usize },
}

struct Utterance {
    samples: Vec<f32>,
    /// Pre-roll at the front, not counted as voiced.
    lead: usize,
    quiet: usize,
}

impl UtteranceSegmenter {
    pub fn new(settings: &SegmenterSettings) -> Self {
        Self {
            threshold: settings.threshold,
            min_samples: samples(settings.min_len),
            max_samples: samples(settings.max_len),
            quiet_samples: samples(settings.trailing_quiet).max(1),
            pre_roll: RingBuffer::new(samples(settings.pre_roll)),
            partial: Vec::with_capacity(FRAME_SAMPLES),
            state: State::Quiet,
        }
    }

    /// Feed 16 kHz mono audio; returns every utterance completed by it.
    pub fn push(&mut self, chunk: &[f32]) -> Vec<Vec<f32>> {
        let mut done = Vec::new();
        self.partial.extend_from_slice(chunk);
        let whole = self.partial.len() / FRAME_SAMPLES * FRAME_SAMPLES;
        let frames: Vec<f32> = self.partial.drain(..whole).collect();

        for frame in frames.chunks_exact(FRAME_SAMPLES) {
            if let Some(utterance) = self.push_frame(frame) {
                done.push(utterance);
            }
        }
        done
    }

    /// Drop any partial utterance and pre-roll.
    pub fn reset(&mut self) {
        self.pre_roll.clear();
        self.partial.clear();
        self.state = State::Quiet;
    }

    pub fn in_utterance(&self) -> bool {
        matches!(self.state, State::Speaking(_))
    }

    fn push_frame(&mut self, frame: &[f32]) -> Option<Vec<f32>> {
        let voiced = rms(frame) >= self.threshold;

        match &mut self.state {
            State::Quiet => {
                if voiced {
                    let mut samples = self.pre_roll.drain();
                    let lead = samples.len();
                    samples.extend_from_slice(frame);
                    self.state = State::Speaking(Utterance {
                        samples,
                        lead,
                        quiet: 0,
                    });
                } else {
                    self.pre_roll.push_slice(frame);
                }
                None
            }
            State::Overlong { quiet } => {
                *quiet = if voiced { 0 } else { *quiet + frame.len() };
                if *quiet >= self.quiet_samples {
                    self.state = State::Quiet;
                }
                None
            }
            State::Speaking(utt) => {
                utt.samples.extend_from_slice(frame);
                utt.quiet = if voiced { 0 } else { utt.quiet + frame.len() };
                let voiced_len = utt.samples.len() - utt.lead - utt.quiet;

                if voiced_len > self.max_samples {
                    log::trace!("wake segmenter: utterance too long, dropped");
                    self.state = State::Overlong { quiet: 0 };
                    return None;
                }
                if utt.quiet < self.quiet_samples {
                    return None;
                }
                let keep = voiced_len >= self.min_samples;
                match std::mem::replace(&mut self.state, State::Quiet) {
                    State::Speaking(utt) if keep => Some(utt.samples),
                    _ => None,
                }
            }
        }
    }
}

fn samples(d: Duration) -> usize {
    (d.as_secs_f64() * TARGET_RATE as f64).round() as usize
}
