//! Global-hotkey voice assistant.
//!
//! Four modes share one microphone: Dictation types what you said, Chat
//! answers it, Rewrite edits the selected text as instructed and Vision
//! answers a question about the screen.  [`orchestrator`] owns the session
//! state machine; everything else is a collaborator behind a trait.

pub mod app;
pub mod audio;
pub mod backend;
pub mod config;
pub mod history;
pub mod hotkey;
pub mod inject;
pub mod orchestrator;
pub mod present;
pub mod screen;
pub mod speech;
pub mod wake;
