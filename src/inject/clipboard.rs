//! Clipboard access backed by `arboard`.
//!
//! Each call opens a short-lived [`arboard::Clipboard`]; the handle is not
//! `Send` everywhere and is cheap to create.

use arboard::Clipboard;

use super::InjectError;

/// Current plain-text content.  `None` for an empty or non-text clipboard.
pub fn read_clipboard() -> Result<Option<String>, InjectError> {
    let mut clipboard = open_clipboard()?;
    Ok(clipboard.get_text().ok())
}

pub fn set_clipboard(text: &str) -> Result<(), InjectError> {
    open_clipboard()?
        .set_text(text)
        .map_err(|e| InjectError::ClipboardSet(e.to_string()))
}

/// Empty the clipboard so a following copy can be told apart from stale
/// content.
pub fn clear_clipboard() -> Result<(), InjectError> {
    open_clipboard()?
        .clear()
        .map_err(|e| InjectError::ClipboardSet(e.to_string()))
}

/// Put back a value saved with [`read_clipboard`].  `None` leaves the
/// clipboard alone.
pub fn restore_clipboard(saved: Option<String>) -> Result<(), InjectError> {
    match saved {
        Some(text) => set_clipboard(&text),
        None => Ok(()),
    }
}

fn open_clipboard() -> Result<Clipboard, InjectError> {
    Clipboard::new().map_err(|e| InjectError::ClipboardAccess(e.to_string()))
}
