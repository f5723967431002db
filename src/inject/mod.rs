//! Clipboard-based text injection and selection snapshots.
//!
//! # Overview
//!
//! Typing long answers key by key is slow and breaks on non-ASCII text, so
//! results are pasted:
//!
//! 1. **Save** the current clipboard.
//! 2. **Set** the text (with a leading space so it does not merge into the
//!    previous word).
//! 3. **Simulate** Ctrl+V (Ctrl+Shift+V in terminals, ⌘V on macOS).
//! 4. **Restore** the saved clipboard (best-effort).
//!
//! # Usage
//!
//! ```no_run
//! use voice_assistant::inject::TextInjector;
//!
//! TextInjector::default().inject("hello from the assistant").expect("injection failed");
//! ```

pub mod clipboard;
pub mod keyboard;
pub mod selection;

pub use clipboard::{clear_clipboard, read_clipboard, restore_clipboard, set_clipboard};
pub use keyboard::{simulate_copy, simulate_paste};
pub use selection::{ClipboardSelection, SelectionSource};

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("cannot access clipboard: {0}")]
    ClipboardAccess(String),

    #[error("cannot set clipboard text: {0}")]
    ClipboardSet(String),

    #[error("cannot simulate key press: {0}")]
    KeySimulation(String),
}

/// Clipboard-paste injector with configurable delays.
#[derive(Debug, Clone)]
pub struct TextInjector {
    /// Wait after setting the clipboard, before pasting.
    pub delay: Duration,
    /// Wait after pasting, before restoring the clipboard.
    pub restore_delay: Duration,
}

impl Default for TextInjector {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(50),
            restore_delay: Duration::from_millis(100),
        }
    }
}

impl TextInjector {
    /// Blocking.  Empty text is a no-op.
    pub fn inject(&self, text: &str) -> Result<(), InjectError> {
        let Some(payload) = paste_payload(text) else {
            return Ok(());
        };
        let saved = read_clipboard()?;
        set_clipboard(&payload)?;
        std::thread::sleep(self.delay);
        let pasted = simulate_paste();
        std::thread::sleep(self.restore_delay);
        let _ = restore_clipboard(saved);
        pasted
    }
}

/// Text as pasted: trimmed, with one leading space.
pub fn paste_payload(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| format!(" {trimmed}"))
}
