//! Retry wrapper: wraps any [`BackendGateway`] and retries transient
//! failures with exponential backoff.
//!
//! `Network` and `RateLimited` are retried; `Auth` and `InvalidPayload`
//! are returned immediately.  A server-supplied `Retry-After` replaces the
//! computed delay.  The whole retry loop runs inside the caller's future,
//! so aborting the submission task also stops retrying.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{BackendError, BackendGateway, ChatMessage, Completion, SpokenInput};
use crate::audio::AudioBuffer;
use crate::screen::Screenshot;

/// Longest delay we are willing to sleep, whatever the server asks.
const MAX_DELAY: Duration = Duration::from_secs(10);

pub struct RetryingGateway<G: BackendGateway> {
    inner: G,
    max_retries: u32,
    base_delay: Duration,
}

impl<G: BackendGateway> RetryingGateway<G> {
    pub fn new(inner: G, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    fn delay_for(&self, attempt: u32, err: &BackendError) -> Duration {
        let backoff = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let delay = match err {
            BackendError::RateLimited {
                retry_after: Some(after),
            } => *after,
            _ => backoff,
        };
        delay.min(MAX_DELAY)
    }

    async fn retry<F, Fut>(&self, op: &str, mut call: F) -> Result<Completion, BackendError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<Completion, BackendError>> + Send,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt, &err);
                    attempt += 1;
                    log::warn!(
                        "{op} failed ({err}); retry {attempt}/{} in {delay:?}",
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl<G: BackendGateway> BackendGateway for RetryingGateway<G> {
    async fn transcribe(&self, audio: AudioBuffer) -> Result<Completion, BackendError> {
        self.retry("transcribe", || self.inner.transcribe(audio.clone()))
            .await
    }

    async fn chat(
        &self,
        input: SpokenInput,
        history: Vec<ChatMessage>,
    ) -> Result<Completion, BackendError> {
        self.retry("chat", || self.inner.chat(input.clone(), history.clone()))
            .await
    }

    async fn rewrite(
        &self,
        selection: String,
        instruction: AudioBuffer,
        history: Vec<ChatMessage>,
    ) -> Result<Completion, BackendError> {
        self.retry("rewrite", || {
            self.inner
                .rewrite(selection.clone(), instruction.clone(), history.clone())
        })
        .await
    }

    async fn vision(
        &self,
        image: Screenshot,
        question: SpokenInput,
        history: Vec<ChatMessage>,
    ) -> Result<Completion, BackendError> {
        self.retry("vision", || {
            self.inner
                .vision(image.clone(), question.clone(), history.clone())
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
