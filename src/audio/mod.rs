//! Audio input: microphone → 16 kHz mono → capture sessions and wake-word.
//!
//! # Pipeline
//!
//! ```text
//! Microphone (cpal thread) → MonoConverter → ChunkSink
//!     ├─ AudioCaptureSession → SilenceDetector → AudioBuffer → WAV upload
//!     └─ wake-word listener  → RingBuffer pre-roll → PhraseSpotter
//! ```
//!
//! The [`DeviceLease`] records which of the two consumers currently holds
//! the input stream.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use voice_assistant::audio::{AudioCaptureSession, CaptureOptions, CpalMicrophone};
//!
//! let mic = CpalMicrophone::new();
//! let mut capture =
//!     AudioCaptureSession::start(&mic, CaptureOptions::default(), || println!("quiet")).unwrap();
//! std::thread::sleep(std::time::Duration::from_secs(2));
//! let audio = capture.stop().unwrap();
//! println!("{:.1}s recorded", audio.duration_secs());
//! ```

pub mod buffer;
pub mod capture;
pub mod lease;
pub mod resample;
pub mod session;
pub mod silence;
pub mod wav;

pub use buffer::RingBuffer;
pub use capture::{CaptureError, ChunkSink, CpalMicrophone, Microphone, StreamGuard};
pub use lease::{DeviceLease, LeaseError, LeaseHolder};
pub use resample::{downmix, MonoConverter, TARGET_RATE};
pub use session::{AudioBuffer, AudioCaptureSession, CaptureOptions};
pub use silence::{rms, SilenceDetector, SilenceSettings, FRAME_SAMPLES};
pub use wav::encode_wav;
