//! The record of one interaction and how it failed, if it did.

use std::time::Instant;

use thiserror::Error;

use super::event::{Mode, SessionId, TriggerSource};
use crate::audio::{CaptureError, LeaseError};
use crate::backend::BackendError;
use crate::screen::ScreenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Capturing,
    Processing,
    Completed,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Failed
        )
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub mode: Mode,
    pub trigger: TriggerSource,
    pub started_at: Instant,
    /// Rewrite only; taken once before capture starts.
    pub selection: Option<String>,
    pub status: SessionStatus,
}

impl Session {
    pub fn new(id: SessionId, mode: Mode, trigger: TriggerSource, selection: Option<String>) -> Self {
        Self {
            id,
            mode,
            trigger,
            started_at: Instant::now(),
            selection,
            status: SessionStatus::Capturing,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Why a session ended without a result.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("no text selected")]
    InvalidSelection,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<CaptureError> for SessionError {
    fn from(e: CaptureError) -> Self {
        SessionError::DeviceUnavailable(e.to_string())
    }
}

impl From<LeaseError> for SessionError {
    fn from(e: LeaseError) -> Self {
        SessionError::DeviceUnavailable(e.to_string())
    }
}

impl From<ScreenError> for SessionError {
    fn from(e: ScreenError) -> Self {
        SessionError::DeviceUnavailable(format!("screenshot failed: {e}"))
    }
}

impl SessionError {
    /// Short text for the overlay's error indicator.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::DeviceUnavailable(_) => "Microphone or screen unavailable".into(),
            SessionError::InvalidSelection => "Select some text first".into(),
            SessionError::Backend(BackendError::Auth(_)) => "API key missing or rejected".into(),
            SessionError::Backend(BackendError::RateLimited { .. }) => {
                "Rate limited, try again shortly".into()
            }
            SessionError::Backend(BackendError::Network(_)) => "Network error".into(),
            SessionError::Backend(BackendError::InvalidPayload(_)) => "Nothing recognised".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!SessionStatus::Capturing.is_terminal());
        assert!(!SessionStatus::Processing.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
    }

    #[test]
    fn device_errors_map_to_device_unavailable() {
        let e: SessionError = CaptureError::NoDevice.into();
        assert!(matches!(e, SessionError::DeviceUnavailable(_)));
        let e: SessionError = ScreenError::Empty.into();
        assert!(matches!(e, SessionError::DeviceUnavailable(ref m) if m.contains("screenshot")));
    }

    #[test]
    fn user_messages_are_short() {
        let errors = [
            SessionError::InvalidSelection,
            SessionError::Backend(BackendError::Auth("x".into())),
            SessionError::Backend(BackendError::RateLimited { retry_after: None }),
        ];
        for e in errors {
            assert!(e.user_message().len() < 40);
        }
    }
}
