//! Session history and chat context.
//!
//! Two distinct records:
//!
//! * [`AnswerHistory`]: implements [`HistoryStore`].  One [`HistoryEntry`]
//!   per successful session; the newest entries stay in memory for the
//!   overlay, and every entry is appended to `history.jsonl`.
//! * [`Conversation`]: the role-tagged context sent with Chat, Rewrite and
//!   Vision requests.  Oldest messages are dropped once the estimated token
//!   count exceeds the budget (roughly four characters per token).

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{ChatMessage, Role};
use crate::orchestrator::Mode;

// ---------------------------------------------------------------------------
// HistoryEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub mode: Mode,
    /// What the user said (or selected, for Rewrite).
    pub input: String,
    pub output: String,
    pub timestamp: DateTime<Local>,
}

impl HistoryEntry {
    pub fn new(mode: Mode, input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            mode,
            input: input.into(),
            output: output.into(),
            timestamp: Local::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history file: {0}")]
    Io(#[from] std::io::Error),

    #[error("history encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait HistoryStore: Send + Sync {
    fn append(&self, entry: HistoryEntry) -> Result<(), HistoryError>;
}

// ---------------------------------------------------------------------------
// AnswerHistory
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AnswerHistory {
    recent: Mutex<VecDeque<HistoryEntry>>,
    limit: usize,
    file: Option<PathBuf>,
}

impl AnswerHistory {
    /// `file = None` keeps history in memory only.
    pub fn new(limit: usize, file: Option<PathBuf>) -> Self {
        Self {
            recent: Mutex::new(VecDeque::with_capacity(limit)),
            limit: limit.max(1),
            file,
        }
    }

    /// Newest first.
    pub fn recent(&self) -> Vec<HistoryEntry> {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn write_line(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?
            .write_all(line.as_bytes())?;
        Ok(())
    }
}

impl HistoryStore for AnswerHistory {
    fn append(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        {
            let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
            recent.push_front(entry.clone());
            recent.truncate(self.limit);
        }
        self.write_line(&entry)
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[derive(Debug, Clone)]
pub struct Conversation {
    messages: VecDeque<ChatMessage>,
    max_tokens: usize,
}

impl Conversation {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_tokens,
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push_back(ChatMessage::new(role, content));
        self.trim();
    }

    fn trim(&mut self) {
        while self.tokens() > self.max_tokens && !self.messages.is_empty() {
            self.messages.pop_front();
        }
    }

    pub fn tokens(&self) -> usize {
        self.messages.iter().map(|m| estimate_tokens(&m.content)).sum()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
