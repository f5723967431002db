//! Streaming conversion of raw device audio to 16 kHz mono.
//!
//! The backend transcription endpoint and the silence monitor both work on
//! **16 kHz mono `f32`**.  Microphones usually deliver 44.1 or 48 kHz with
//! one or two interleaved channels, in callback-sized chunks of arbitrary
//! length.
//!
//! [`MonoConverter`] keeps its interpolation position between chunks so the
//! output is continuous across callback boundaries (a per-chunk resampler
//! would click at every boundary and drift in length).

/// Target sample rate for everything downstream of the microphone.
pub const TARGET_RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// downmix
// ---------------------------------------------------------------------------

/// Average interleaved frames of `channels` samples into one mono sample.
///
/// A trailing partial frame is dropped.  `channels == 0` yields nothing.
///
/// ```rust
/// use voice_assistant::audio::downmix;
///
/// let stereo = [1.0_f32, -1.0, 0.5, 0.5];
/// assert_eq!(downmix(&stereo, 2), vec![0.0, 0.5]);
/// ```
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// MonoConverter
// ---------------------------------------------------------------------------

/// Stateful downmix + linear-interpolation resampler to [`TARGET_RATE`].
#[derive(Debug, Clone)]
pub struct MonoConverter {
    channels: u16,
    /// Source samples consumed per output sample.
    step: f64,
    /// Position of the next output sample, relative to `prev`.
    ///
    /// `0.0` means "exactly at `prev`", `1.0` "exactly at the first sample
    /// of the next chunk".
    phase: f64,
    /// Last mono sample of the previous chunk.
    prev: Option<f32>,
}

impl MonoConverter {
    /// Build a converter for a device running at `source_rate` Hz with
    /// `channels` interleaved channels.
    pub fn new(source_rate: u32, channels: u16) -> Self {
        let source_rate = source_rate.max(1);
        Self {
            channels,
            step: source_rate as f64 / TARGET_RATE as f64,
            phase: 0.0,
            prev: None,
        }
    }

    /// `true` when the device already delivers 16 kHz (no interpolation).
    pub fn is_passthrough(&self) -> bool {
        (self.step - 1.0).abs() < f64::EPSILON
    }

    /// Convert one device chunk.  Call repeatedly with consecutive chunks.
    pub fn convert(&mut self, interleaved: &[f32]) -> Vec<f32> {
        let mono = downmix(interleaved, self.channels);
        if mono.is_empty() || self.is_passthrough() {
            return mono;
        }

        // Work on [prev, mono...] so interpolation can straddle the boundary.
        // On the first chunk there is no `prev` and we start on mono[0].
        let mut src = Vec::with_capacity(mono.len() + 1);
        src.extend(self.prev);
        src.extend_from_slice(&mono);

        let mut pos = self.phase;
        let mut out = Vec::with_capacity((mono.len() as f64 / self.step).ceil() as usize + 1);
        let last = (src.len() - 1) as f64;

        while pos <= last {
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let sample = if idx + 1 < src.len() {
                src[idx] * (1.0 - frac) + src[idx + 1] * frac
            } else {
                src[idx]
            };
            out.push(sample);
            pos += self.step;
        }

        // Carry the remainder relative to the new `prev` (last sample).
        self.phase = pos - last;
        self.prev = src.last().copied();
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_frames() {
        let out = downmix(&[0.4_f32, 0.4, 0.4, 0.4], 4);
        assert_eq!(out.len(), 1);
        assert!((out[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn downmix_zero_channels_is_empty() {
        assert!(downmix(&[1.0_f32, 2.0], 0).is_empty());
    }

    #[test]
    fn passthrough_at_16k_mono() {
        let mut conv = MonoConverter::new(16_000, 1);
        assert!(conv.is_passthrough());
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(conv.convert(&input), input);
    }

    #[test]
    fn one_second_of_48k_becomes_one_second_of_16k() {
        let mut conv = MonoConverter::new(48_000, 1);
        let mut total = 0;
        // 100 chunks of 480 samples (10 ms each) = 1 s
        for _ in 0..100 {
            total += conv.convert(&vec![0.25_f32; 480]).len();
        }
        assert!(total.abs_diff(16_000) <= 1, "got {total}");
    }

    #[test]
    fn odd_chunk_sizes_do_not_drift() {
        let mut conv = MonoConverter::new(44_100, 2);
        let mut total = 0;
        let mut fed = 0;
        for size in [441usize, 1000, 37, 2048, 913].iter().cycle().take(200) {
            // stereo: 2 samples per frame
            total += conv.convert(&vec![0.0_f32; size * 2]).len();
            fed += size;
        }
        let expected = fed as f64 * 16_000.0 / 44_100.0;
        assert!(
            (total as f64 - expected).abs() <= 2.0,
            "expected ~{expected}, got {total}"
        );
    }

    #[test]
    fn constant_signal_keeps_amplitude() {
        let mut conv = MonoConverter::new(48_000, 1);
        for _ in 0..3 {
            for s in conv.convert(&vec![0.5_f32; 480]) {
                assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
            }
        }
    }

    #[test]
    fn upsampling_doubles_length() {
        let mut conv = MonoConverter::new(8_000, 1);
        let mut total = 0;
        for _ in 0..10 {
            total += conv.convert(&vec![0.0_f32; 80]).len();
        }
        assert!(total.abs_diff(1_600) <= 1, "got {total}");
    }
}
