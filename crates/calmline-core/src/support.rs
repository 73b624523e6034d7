use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the support chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into(), timestamp: Utc::now() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into(), timestamp: Utc::now() }
    }
}

/// Running support-chat history, oldest turns dropped past `limit`.
#[derive(Debug, Clone)]
pub struct Transcript {
    entries: VecDeque<TranscriptEntry>,
    limit: usize,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }
}

impl Transcript {
    pub fn with_limit(limit: usize) -> Self {
        let limit = limit.max(1);
        Self { entries: VecDeque::with_capacity(limit), limit }
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        if self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(TranscriptEntry::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.push(TranscriptEntry::assistant(text));
    }

    /// Contiguous view for the responder.
    pub fn entries(&mut self) -> &[TranscriptEntry] {
        self.entries.make_contiguous()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
