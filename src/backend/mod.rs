//! Remote transcription / chat / vision backend.
//!
//! This module provides:
//! * [`BackendGateway`]: async trait the orchestrator submits sessions to.
//! * [`GroqGateway`]: OpenAI-compatible REST implementation (Groq).
//! * [`RetryingGateway`]: wraps any gateway with exponential backoff.
//! * [`prompt`]: system / rewrite prompts and the transcript guard.
//! * [`BackendError`]: the four failure classes the orchestrator reports.
//!
//! Every call returns a [`Completion`]: the text to present plus `heard`,
//! what the user actually said, which becomes the history input summary.

pub mod groq;
pub mod prompt;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use groq::GroqGateway;
pub use retry::RetryingGateway;

use crate::audio::AudioBuffer;
use crate::screen::Screenshot;

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// Transport failure, timeout or a 5xx.  Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// Missing or rejected credential.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// HTTP 429.  Retryable after `retry_after` when the server says so.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// The request or the response was unusable: audio too short, a
    /// silence hallucination, a 4xx, or a reply without content.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Network(_) | BackendError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Network("request timed out".into())
        } else if e.is_decode() {
            BackendError::InvalidPayload(e.to_string())
        } else {
            BackendError::Network(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Spoken input, or text that was already transcribed.
#[derive(Debug, Clone, PartialEq)]
pub enum SpokenInput {
    Audio(AudioBuffer),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Transcript of the user's speech (or the typed input).
    pub heard: String,
    /// Text to inject, show or speak.
    pub text: String,
}

// ---------------------------------------------------------------------------
// BackendGateway
// ---------------------------------------------------------------------------

/// One method per mode.  Implementations must be cancel-safe: dropping the
/// future abandons the request.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Speech to text.  `heard` and `text` are the same transcript.
    async fn transcribe(&self, audio: AudioBuffer) -> Result<Completion, BackendError>;

    async fn chat(
        &self,
        input: SpokenInput,
        history: Vec<ChatMessage>,
    ) -> Result<Completion, BackendError>;

    /// Rewrite `selection` following the spoken instruction.
    async fn rewrite(
        &self,
        selection: String,
        instruction: AudioBuffer,
        history: Vec<ChatMessage>,
    ) -> Result<Completion, BackendError>;

    /// Answer a question about a screenshot.
    async fn vision(
        &self,
        image: Screenshot,
        question: SpokenInput,
        history: Vec<ChatMessage>,
    ) -> Result<Completion, BackendError>;
}
