//! Snapshot of the text currently selected in the focused application.
//!
//! Used once at the start of a Rewrite session.  There is no portable
//! "get selection" API, so [`ClipboardSelection`] does what a user would:
//! copy, read the clipboard, then put the previous clipboard back.

use std::time::Duration;

use super::clipboard::{clear_clipboard, read_clipboard, restore_clipboard};
use super::keyboard::simulate_copy;
use super::InjectError;

pub trait SelectionSource: Send + Sync {
    /// Blocking.  `Ok(None)` when nothing is selected.
    fn snapshot(&self) -> Result<Option<String>, InjectError>;
}

#[derive(Debug, Clone)]
pub struct ClipboardSelection {
    /// Time the target app gets to service the copy.
    pub copy_delay: Duration,
}

impl Default for ClipboardSelection {
    fn default() -> Self {
        Self {
            copy_delay: Duration::from_millis(100),
        }
    }
}

impl SelectionSource for ClipboardSelection {
    fn snapshot(&self) -> Result<Option<String>, InjectError> {
        let saved = read_clipboard()?;
        // Without clearing, an empty selection would return stale clipboard
        // text.
        clear_clipboard()?;
        let copied = simulate_copy().map(|_| {
            std::thread::sleep(self.copy_delay);
            read_clipboard()
        });
        if let Err(e) = restore_clipboard(saved) {
            log::warn!("could not restore clipboard after selection snapshot: {e}");
        }
        Ok(normalise_selection(copied??))
    }
}

/// Trimmed selection, `None` if nothing but whitespace.
pub fn normalise_selection(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
