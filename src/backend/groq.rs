//! [`GroqGateway`]: the OpenAI-compatible REST backend.
//!
//! | Operation  | Endpoint                 | Model (default)                              |
//! |------------|--------------------------|----------------------------------------------|
//! | transcribe | `/audio/transcriptions`  | `whisper-large-v3`                           |
//! | chat       | `/chat/completions`      | `moonshotai/kimi-k2-instruct`                |
//! | rewrite    | transcribe + chat        |                                              |
//! | vision     | `/chat/completions`      | `meta-llama/llama-4-scout-17b-16e-instruct`  |
//!
//! All connection details come from [`BackendConfig`]; the API key is
//! passed in by the caller (read once from the environment at startup).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{multipart, StatusCode};
use serde_json::{json, Value};

use super::prompt::{build_messages, check_transcript, rewrite_request};
use super::{BackendError, BackendGateway, ChatMessage, Completion, SpokenInput};
use crate::audio::AudioBuffer;
use crate::config::BackendConfig;
use crate::screen::Screenshot;

pub struct GroqGateway {
    client: reqwest::Client,
    config: BackendConfig,
    api_key: Option<String>,
    min_recording_secs: f32,
}

impl GroqGateway {
    /// `api_key = None` makes every call fail with `Auth` before touching
    /// the network.
    pub fn new(config: &BackendConfig, api_key: Option<String>, min_recording_secs: f32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            config: config.clone(),
            api_key,
            min_recording_secs,
        }
    }

    fn key(&self) -> Result<&str, BackendError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                BackendError::Auth(format!("{} is not set", self.config.api_key_env))
            })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Upload audio, return the guarded transcript.
    async fn transcript(&self, audio: &AudioBuffer) -> Result<String, BackendError> {
        let key = self.key()?;
        if audio.duration_secs() < self.min_recording_secs {
            return Err(BackendError::InvalidPayload(format!(
                "recording too short ({:.2}s)",
                audio.duration_secs()
            )));
        }

        let file = multipart::Part::bytes(audio.to_wav())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| BackendError::InvalidPayload(e.to_string()))?;
        let form = multipart::Form::new()
            .text("model", self.config.transcription_model.clone())
            .text("response_format", "json")
            .part("file", file);

        let response = self
            .client
            .post(self.url("audio/transcriptions"))
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await?;
        let body = ok_json(response).await?;

        let text = body["text"]
            .as_str()
            .ok_or_else(|| BackendError::InvalidPayload("transcription without text".into()))?;
        log::debug!("transcribed {:.1}s of audio", audio.duration_secs());
        check_transcript(text)
    }

    async fn heard(&self, input: &SpokenInput) -> Result<String, BackendError> {
        match input {
            SpokenInput::Audio(audio) => self.transcript(audio).await,
            SpokenInput::Text(text) => Ok(text.trim().to_string()),
        }
    }

    async fn complete(&self, model: &str, messages: Value) -> Result<String, BackendError> {
        let key = self.key()?;
        let body = json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });
        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        completion_text(&ok_json(response).await?)
    }
}

#[async_trait]
impl BackendGateway for GroqGateway {
    async fn transcribe(&self, audio: AudioBuffer) -> Result<Completion, BackendError> {
        let text = self.transcript(&audio).await?;
        Ok(Completion {
            heard: text.clone(),
            text,
        })
    }

    async fn chat(
        &self,
        input: SpokenInput,
        history: Vec<ChatMessage>,
    ) -> Result<Completion, BackendError> {
        let heard = self.heard(&input).await?;
        let messages = serde_json::to_value(build_messages(&history, &heard))
            .map_err(|e| BackendError::InvalidPayload(e.to_string()))?;
        let text = self.complete(&self.config.chat_model, messages).await?;
        Ok(Completion { heard, text })
    }

    async fn rewrite(
        &self,
        selection: String,
        instruction: AudioBuffer,
        history: Vec<ChatMessage>,
    ) -> Result<Completion, BackendError> {
        let heard = self.transcript(&instruction).await?;
        let request = rewrite_request(&heard, &selection);
        let messages = serde_json::to_value(build_messages(&history, &request))
            .map_err(|e| BackendError::InvalidPayload(e.to_string()))?;
        let text = self.complete(&self.config.chat_model, messages).await?;
        Ok(Completion { heard, text })
    }

    async fn vision(
        &self,
        image: Screenshot,
        question: SpokenInput,
        history: Vec<ChatMessage>,
    ) -> Result<Completion, BackendError> {
        let heard = self.heard(&question).await?;
        let messages = vision_messages(&history, &heard, &image);
        let text = self.complete(&self.config.vision_model, messages).await?;
        Ok(Completion { heard, text })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Chat messages whose final user turn carries the image.
fn vision_messages(history: &[ChatMessage], question: &str, image: &Screenshot) -> Value {
    let mut messages: Vec<Value> = build_messages(history, question)
        .into_iter()
        .map(|m| json!({ "role": m.role, "content": m.content }))
        .collect();
    if let Some(last) = messages.last_mut() {
        *last = json!({
            "role": "user",
            "content": [
                { "type": "text", "text": question },
                { "type": "image_url", "image_url": { "url": image.to_data_url() } },
            ],
        });
    }
    Value::Array(messages)
}

/// Map an HTTP status to the error taxonomy.
pub(crate) fn classify(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> BackendError {
    let detail = format!("HTTP {status}: {}", truncate(body, 200));
    match status.as_u16() {
        401 | 403 => BackendError::Auth(detail),
        429 => BackendError::RateLimited { retry_after },
        400 | 413 | 415 | 422 => BackendError::InvalidPayload(detail),
        _ => BackendError::Network(detail),
    }
}

fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    let secs: f64 = value?.to_str().ok()?.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

async fn ok_json(response: reqwest::Response) -> Result<Value, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
        let body = response.text().await.unwrap_or_default();
        return Err(classify(status, retry_after, &body));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| BackendError::InvalidPayload(e.to_string()))
}

pub(crate) fn completion_text(body: &Value) -> Result<String, BackendError> {
    let text = body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::trim)
        .unwrap_or_default();
    if text.is_empty() {
        return Err(BackendError::InvalidPayload("empty completion".into()));
    }
    Ok(text.to_string())
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
