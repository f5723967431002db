//! Prompts sent with chat requests, and the transcript guard.
//!
//! Whisper tends to "hear" stock phrases in silence or breathing ("Thank
//! you.", "Subtitle").  [`check_transcript`] rejects those before they turn
//! into a chat turn or get typed into the user's document.

use super::{BackendError, ChatMessage, Role};

// ---------------------------------------------------------------------------
// System instructions
// ---------------------------------------------------------------------------

pub const SYSTEM_PROMPT: &str = "\
Act as a compassionate assistant. Base your reasoning on the principles of \
Nonviolent Communication and A Course in Miracles. Apply these frameworks as \
your underlying logic without explicitly naming them or forcing them. Let your \
output be grounded, clear, and highly concise. Return ONLY the direct response.";

/// Phrases Whisper produces for near-silent input.
const HALLUCINATIONS: &[&str] = &[
    "thank you",
    "you're welcome",
    "thanks",
    "subtitle",
    "untertitel",
    "you",
];

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// User turn for a rewrite request.
pub fn rewrite_request(instruction: &str, original: &str) -> String {
    format!(
        "INSTRUCTION:\n{instruction}\n\nORIGINAL:\n{original}\n\n\
         Rewrite original based on instruction. Output ONLY result."
    )
}

/// `[system, ...history, user]` ready for `/chat/completions`.
pub fn build_messages(history: &[ChatMessage], user: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new(Role::System, SYSTEM_PROMPT));
    messages.extend(history.iter().filter(|m| m.role != Role::System).cloned());
    messages.push(ChatMessage::new(Role::User, user));
    messages
}

// ---------------------------------------------------------------------------
// Transcript guard
// ---------------------------------------------------------------------------

/// Lowercase, drop `.` and `!`, trim.
fn normalise(transcript: &str) -> String {
    transcript
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.' && *c != '!')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Returns the trimmed transcript, or `InvalidPayload` if it is empty, too
/// short, or a known silence hallucination.
pub fn check_transcript(transcript: &str) -> Result<String, BackendError> {
    let clean = normalise(transcript);
    if clean.chars().count() < 2 || HALLUCINATIONS.contains(&clean.as_str()) {
        log::warn!("ignored hallucinated transcript: {transcript:?}");
        return Err(BackendError::InvalidPayload(format!(
            "no speech recognised ({:?})",
            transcript.trim()
        )));
    }
    Ok(transcript.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_hallucinations() {
        for t in ["Thank you.", "  thanks! ", "You", "Subtitle", "UNTERTITEL", "You're welcome!"] {
            assert!(check_transcript(t).is_err(), "{t:?} should be rejected");
        }
    }

    #[test]
    fn rejects_empty_and_single_char() {
        assert!(check_transcript("").is_err());
        assert!(check_transcript("  a. ").is_err());
        assert!(check_transcript("...").is_err());
    }

    #[test]
    fn keeps_real_speech_trimmed() {
        assert_eq!(
            check_transcript("  Thank you for the report. ").unwrap(),
            "Thank you for the report."
        );
        assert_eq!(check_transcript("ok").unwrap(), "ok");
    }

    #[test]
    fn rewrite_request_layout() {
        let req = rewrite_request("make it formal", "hey dude");
        assert!(req.starts_with("INSTRUCTION:\nmake it formal\n\nORIGINAL:\nhey dude\n\n"));
        assert!(req.ends_with("Output ONLY result."));
    }

    #[test]
    fn messages_wrap_history_with_system_and_user() {
        let history = vec![
            ChatMessage::new(Role::User, "a"),
            ChatMessage::new(Role::Assistant, "b"),
        ];
        let msgs = build_messages(&history, "c");
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[1].content, "a");
        assert_eq!(msgs[3], ChatMessage::new(Role::User, "c"));
    }
}
