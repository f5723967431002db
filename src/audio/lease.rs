//! Who currently owns the microphone.
//!
//! Only one of the wake-word listener and a capture session may hold an open
//! input stream.  The lease makes the hand-off explicit:
//!
//! ```text
//!            acquire_detector            suspend → release(Detector)
//!   Free ───────────────────► Detector ─────────────────────────► Free
//!    ▲                                                              │
//!    │ release(Session(id))                  acquire_session(id)    │
//!    └──────────────────────── Session(id) ◄────────────────────────┘
//! ```

use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::orchestrator::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseHolder {
    Free,
    Detector,
    Session(SessionId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeaseError {
    #[error("microphone is held by {0:?}")]
    Busy(LeaseHolder),
}

#[derive(Debug)]
pub struct DeviceLease {
    holder: Mutex<LeaseHolder>,
}

impl Default for DeviceLease {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLease {
    pub fn new() -> Self {
        Self {
            holder: Mutex::new(LeaseHolder::Free),
        }
    }

    pub fn holder(&self) -> LeaseHolder {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the microphone for a capture session.  Re-acquiring for the
    /// same session is a no-op.
    pub fn acquire_session(&self, id: SessionId) -> Result<(), LeaseError> {
        self.acquire(LeaseHolder::Session(id))
    }

    /// Take the microphone for the wake-word listener.
    pub fn acquire_detector(&self) -> Result<(), LeaseError> {
        self.acquire(LeaseHolder::Detector)
    }

    fn acquire(&self, want: LeaseHolder) -> Result<(), LeaseError> {
        let mut holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        match *holder {
            LeaseHolder::Free => {
                *holder = want;
                log::debug!("device lease: Free -> {want:?}");
                Ok(())
            }
            current if current == want => Ok(()),
            current => Err(LeaseError::Busy(current)),
        }
    }

    /// Give the microphone back.  Releasing on behalf of someone who does
    /// not hold the lease is ignored and returns `false`.
    pub fn release(&self, who: LeaseHolder) -> bool {
        let mut holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        if *holder == who && who != LeaseHolder::Free {
            *holder = LeaseHolder::Free;
            log::debug!("device lease: {who:?} -> Free");
            true
        } else {
            false
        }
    }
}
