//! Text-to-speech for Chat and Vision answers.
//!
//! [`Speaker`] is what the presenter calls; [`GroqSpeaker`] fetches a WAV
//! from the backend's `/audio/speech` endpoint and plays it through the
//! default output device with rodio.
//!
//! `stop()` bumps a generation counter.  A `speak()` started under an older
//! generation stops its sink at the next poll and returns `Ok(())`, whether
//! it was still downloading or already playing.

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use rodio::{Decoder, OutputStream, Sink};
use serde_json::json;
use thiserror::Error;

use crate::backend::groq::{classify, truncate};
use crate::backend::BackendError;
use crate::config::{BackendConfig, TtsConfig};

/// How often the playback loop checks for `stop()`.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("audio playback failed: {0}")]
    Playback(String),
}

#[async_trait]
pub trait Speaker: Send + Sync {
    /// Resolves when playback ends or is stopped.
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;

    /// Interrupt whatever is being spoken.  No-op when silent.
    fn stop(&self);
}

pub struct GroqSpeaker {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    config: TtsConfig,
    generation: Arc<AtomicU64>,
}

impl GroqSpeaker {
    pub fn new(backend: &BackendConfig, tts: &TtsConfig, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(backend.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: backend.base_url.trim_end_matches('/').to_string(),
            api_key,
            config: tts.clone(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, BackendError> {
        let key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| BackendError::Auth("no API key for speech".into()))?;

        let body = json!({
            "model": self.config.model,
            "voice": self.config.voice,
            "input": speech_input(text, self.config.max_chars),
            "response_format": "wav",
        });
        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, retry_after, &body));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Speaker for GroqSpeaker {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let wav = self.synthesize(text).await?;
        if self.generation.load(Ordering::SeqCst) != generation {
            log::debug!("speech stopped before playback");
            return Ok(());
        }

        let current = Arc::clone(&self.generation);
        tokio::task::spawn_blocking(move || play_wav(wav, &current, generation))
            .await
            .map_err(|e| SpeechError::Playback(e.to_string()))?
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Blocking.  Plays until the sink drains or `current` moves past
/// `generation`.
fn play_wav(wav: Vec<u8>, current: &AtomicU64, generation: u64) -> Result<(), SpeechError> {
    let (_stream, handle) =
        OutputStream::try_default().map_err(|e| SpeechError::Playback(e.to_string()))?;
    let sink = Sink::try_new(&handle).map_err(|e| SpeechError::Playback(e.to_string()))?;
    let source = Decoder::new(Cursor::new(wav)).map_err(|e| SpeechError::Playback(e.to_string()))?;
    sink.append(source);

    while !sink.empty() {
        if current.load(Ordering::SeqCst) != generation {
            sink.stop();
            log::debug!("speech interrupted");
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    Ok(())
}

/// Trimmed and cut to `max_chars` characters.
pub fn speech_input(text: &str, max_chars: usize) -> &str {
    truncate(text.trim(), max_chars)
}
