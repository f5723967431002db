//! Keyboard shortcuts simulated with `enigo`.
//!
//! | Action | Regular window | Terminal emulator |
//! |--------|----------------|-------------------|
//! | paste  | Ctrl+V         | Ctrl+Shift+V      |
//! | copy   | Ctrl+C         | Ctrl+Shift+C      |
//!
//! On macOS the modifier is ⌘ and terminals need no Shift.

use std::process::Command;

use enigo::{Direction, Enigo, Key, Keyboard, Settings};

use super::InjectError;

/// Substrings of `WM_CLASS` that identify terminal emulators.
const TERMINAL_CLASSES: &[&str] = &[
    "terminal", "terminator", "tilix", "alacritty", "kitty", "konsole", "xterm", "urxvt",
    "sakura", "terminology", "guake", "tilda", "yakuake", "wezterm", "foot",
    "cool-retro-term", "hyper", "tabby", "rio", "ghostty",
];

pub fn simulate_paste() -> Result<(), InjectError> {
    chord('v')
}

pub fn simulate_copy() -> Result<(), InjectError> {
    chord('c')
}

fn key_err(e: impl std::fmt::Display) -> InjectError {
    InjectError::KeySimulation(e.to_string())
}

/// Modifier + `letter`, adding Shift when a terminal has focus.
fn chord(letter: char) -> Result<(), InjectError> {
    let mut enigo = Enigo::new(&Settings::default()).map_err(key_err)?;

    #[cfg(target_os = "macos")]
    let (modifier, shift) = (Key::Meta, false);
    #[cfg(not(target_os = "macos"))]
    let (modifier, shift) = (Key::Control, focused_is_terminal());

    enigo.key(modifier, Direction::Press).map_err(key_err)?;
    if shift {
        enigo.key(Key::Shift, Direction::Press).map_err(key_err)?;
    }
    let clicked = enigo.key(Key::Unicode(letter), Direction::Click);
    // Always release the modifiers, even if the click failed.
    if shift {
        let _ = enigo.key(Key::Shift, Direction::Release);
    }
    let _ = enigo.key(modifier, Direction::Release);
    clicked.map_err(key_err)
}

/// Ask X11 for the focused window's class.  `false` whenever the tools are
/// missing (Wayland, minimal installs).
pub fn focused_is_terminal() -> bool {
    let Some(window) = run_quiet("xdotool", &["getactivewindow"]) else {
        return false;
    };
    run_quiet("xprop", &["-id", window.trim(), "WM_CLASS"])
        .is_some_and(|class| is_terminal_class(&class))
}

pub fn is_terminal_class(wm_class: &str) -> bool {
    let lower = wm_class.to_lowercase();
    TERMINAL_CLASSES.iter().any(|kw| lower.contains(kw))
}

fn run_quiet(program: &str, args: &[&str]) -> Option<String> {
    let out = Command::new(program).args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_terminal_classes() {
        assert!(is_terminal_class(r#"WM_CLASS(STRING) = "gnome-terminal-server", "Gnome-terminal""#));
        assert!(is_terminal_class(r#"WM_CLASS(STRING) = "com.mitchellh.ghostty", "Ghostty""#));
        assert!(is_terminal_class("Alacritty"));
    }

    #[test]
    fn editors_are_not_terminals() {
        assert!(!is_terminal_class(r#"WM_CLASS(STRING) = "gedit", "Gedit""#));
        assert!(!is_terminal_class(r#"WM_CLASS(STRING) = "firefox", "firefox""#));
    }
}
