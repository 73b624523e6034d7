use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::answers::Answers;
use super::state::{FlowKind, StateId};
use crate::support::Transcript;
use crate::timed::SequenceHandle;

/// Live state of one in-progress flow for one user.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub flow: FlowKind,
    pub state: StateId,
    pub answers: Answers,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub metadata: SessionMetadata,
}

/// Flow-specific scratch data that never reaches the completed record directly.
#[derive(Debug, Clone, Default)]
pub struct SessionMetadata {
    pub panic: PanicScratch,
    pub timed: Option<SequenceHandle>,
    pub transcript: Transcript,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanicScratch {
    /// Every rating given in this session, oldest first. The first is the baseline.
    pub ratings: Vec<u8>,
    pub attempts: u32,
    /// Technique ids in the order they were offered.
    pub offered: Vec<&'static str>,
    pub current: Option<&'static str>,
}

impl PanicScratch {
    pub fn baseline(&self) -> Option<u8> {
        self.ratings.first().copied()
    }

    pub fn last_rating(&self) -> Option<u8> {
        self.ratings.last().copied()
    }
}

impl Session {
    pub fn new(user_id: impl Into<String>, flow: FlowKind, initial: StateId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            flow,
            state: initial,
            answers: Answers::new(),
            started_at: now,
            last_activity: now,
            metadata: SessionMetadata::default(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Cancel the timed sequence this session owns, if any.
    pub fn cancel_timed(&mut self) -> bool {
        match self.metadata.timed.take() {
            Some(handle) => handle.cancel(),
            None => false,
        }
    }
}
