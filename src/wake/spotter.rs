//! Deciding whether an utterance was the wake phrase.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::audio::{AudioBuffer, TARGET_RATE};
use crate::backend::BackendGateway;

#[async_trait]
pub trait PhraseSpotter: Send + Sync {
    /// `utterance` is 16 kHz mono.  Errors count as "no".
    async fn spot(&self, utterance: Vec<f32>) -> bool;
    /// Listen for `phrase` from now on.
    fn set_phrase(&self, phrase: &str);
}

/// Transcribes the utterance and looks for the phrase in the text.
pub struct TranscriptSpotter {
    gateway: Arc<dyn BackendGateway>,
    /// Normalised.
    phrase: RwLock<String>,
}

impl TranscriptSpotter {
    pub fn new(gateway: Arc<dyn BackendGateway>, phrase: &str) -> Self {
        Self {
            gateway,
            phrase: RwLock::new(normalise(phrase)),
        }
    }

    pub fn matches(&self, transcript: &str) -> bool {
        let phrase = self.phrase.read().unwrap_or_else(PoisonError::into_inner);
        !phrase.is_empty() && contains_phrase(&normalise(transcript), &phrase)
    }
}

#[async_trait]
impl PhraseSpotter for TranscriptSpotter {
    async fn spot(&self, utterance: Vec<f32>) -> bool {
        let audio = AudioBuffer::new(utterance, TARGET_RATE);
        match self.gateway.transcribe(audio).await {
            Ok(completion) => {
                let hit = self.matches(&completion.text);
                log::debug!("wake spotter heard {:?} (match: {hit})", completion.text);
                hit
            }
            Err(e) => {
                log::debug!("wake spotter transcription failed: {e}");
                false
            }
        }
    }

    fn set_phrase(&self, phrase: &str) {
        *self.phrase.write().unwrap_or_else(PoisonError::into_inner) = normalise(phrase);
    }
}

/// Lowercase words separated by single spaces, punctuation removed.
pub fn normalise(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whole-word match: "hey aria" is in "okay hey aria" but not "hey arianne".
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    format!(" {haystack} ").contains(&format!(" {phrase} "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, ChatMessage, Completion, SpokenInput};
    use crate::screen::Screenshot;

    struct FixedTranscript(Result<String, BackendError>);

    #[async_trait]
    impl BackendGateway for FixedTranscript {
        async fn transcribe(&self, _audio: AudioBuffer) -> Result<Completion, BackendError> {
            self.0.clone().map(|text| Completion {
                heard: text.clone(),
                text,
            })
        }

        async fn chat(
            &self,
            _input: SpokenInput,
            _history: Vec<ChatMessage>,
        ) -> Result<Completion, BackendError> {
            unreachable!()
        }

        async fn rewrite(
            &self,
            _selection: String,
            _instruction: AudioBuffer,
            _history: Vec<ChatMessage>,
        ) -> Result<Completion, BackendError> {
            unreachable!()
        }

        async fn vision(
            &self,
            _image: Screenshot,
            _question: SpokenInput,
            _history: Vec<ChatMessage>,
        ) -> Result<Completion, BackendError> {
            unreachable!()
        }
    }

    fn spotter(transcript: Result<String, BackendError>) -> TranscriptSpotter {
        TranscriptSpotter::new(Arc::new(FixedTranscript(transcript)), "Hey Aria")
    }

    #[test]
    fn normalise_strips_case_and_punctuation() {
        assert_eq!(normalise("  Hey, ARIA!  "), "hey aria");
        assert_eq!(normalise("hey...aria"), "hey aria");
    }

    #[test]
    fn matches_whole_words_only() {
        let s = spotter(Ok(String::new()));
        assert!(s.matches("Okay, hey Aria."));
        assert!(s.matches("hey aria what's up"));
        assert!(!s.matches("hey arianne"));
        assert!(!s.matches("aria"));
    }

    #[tokio::test]
    async fn spots_through_gateway() {
        assert!(spotter(Ok("Hey Aria!".into())).spot(vec![0.0; 8000]).await);
        assert!(!spotter(Ok("hello there".into())).spot(vec![0.0; 8000]).await);
    }

    #[tokio::test]
    async fn new_phrase_replaces_the_old_one() {
        let s = spotter(Ok("okay computer".into()));
        assert!(!s.spot(vec![0.0; 8000]).await);

        s.set_phrase("Okay, Computer");
        assert!(s.spot(vec![0.0; 8000]).await);
        assert!(!s.matches("hey aria"));
    }

    #[tokio::test]
    async fn backend_errors_are_a_miss() {
        let s = spotter(Err(BackendError::Network("down".into())));
        assert!(!s.spot(vec![0.0; 8000]).await);
    }
}
