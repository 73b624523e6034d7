pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod flows;
pub mod interrupt;
pub mod ports;
pub mod recommend;
pub mod session;
pub mod support;
pub mod timed;
pub mod usage;

pub use config::{BreathingPattern, FlowConfig, ResponderQuota};
pub use dispatch::Dispatcher;
pub use engine::{menu, FlowEngine, FlowSignal, Handled};
pub use error::{DefinitionError, FlowError, FlowResult, StorageError, ValidationError};
pub use flows::FlowRegistry;
pub use recommend::{commit, CompletedRecord};
pub use session::{AnswerValue, Answers, FlowKind, Session, SessionStore, StateId};

// Simple in-crate mocks for demos and tests
pub mod mocks {
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use protocol::OutboundAction;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    use crate::error::StorageError;
    use crate::ports::{AlertPort, CheckInRepository, OutboundPort, RecordFilter, Responder, UsageStore};
    use crate::recommend::CompletedRecord;
    use crate::support::TranscriptEntry;
    use crate::usage::DailyUsage;

    /// Records kept in memory. `fail_saves` makes every save fail until reset.
    #[derive(Clone, Default)]
    pub struct InMemoryRepository {
        records: Arc<Mutex<Vec<CompletedRecord>>>,
        failing: Arc<AtomicBool>,
    }

    impl InMemoryRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_saves(&self, yes: bool) {
            self.failing.store(yes, Ordering::SeqCst);
        }

        pub fn records(&self) -> Vec<CompletedRecord> {
            self.records.lock().unwrap_or_else(|p| p.into_inner()).clone()
        }
    }

    #[async_trait]
    impl CheckInRepository for InMemoryRepository {
        async fn save(&self, record: &CompletedRecord) -> Result<(), StorageError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("injected failure".into()));
            }
            self.records.lock().unwrap_or_else(|p| p.into_inner()).push(record.clone());
            Ok(())
        }

        async fn query(&self, user_id: &str, filter: &RecordFilter) -> Result<Vec<CompletedRecord>, StorageError> {
            let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
            let mut found: Vec<CompletedRecord> = records
                .iter()
                .filter(|r| r.user_id == user_id && filter.matches(r))
                .cloned()
                .collect();
            if let Some(limit) = filter.limit {
                let skip = found.len().saturating_sub(limit);
                found.drain(..skip);
            }
            Ok(found)
        }
    }

    /// Replies from a script, then echoes. Remembers every transcript it saw.
    #[derive(Clone, Default)]
    pub struct ScriptedResponder {
        replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
        seen: Arc<Mutex<Vec<Vec<TranscriptEntry>>>>,
    }

    impl ScriptedResponder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: impl Into<String>) -> Self {
            self.replies.lock().unwrap_or_else(|p| p.into_inner()).push_back(Ok(text.into()));
            self
        }

        pub fn fail(self, reason: impl Into<String>) -> Self {
            self.replies.lock().unwrap_or_else(|p| p.into_inner()).push_back(Err(reason.into()));
            self
        }

        pub fn transcripts(&self) -> Vec<Vec<TranscriptEntry>> {
            self.seen.lock().unwrap_or_else(|p| p.into_inner()).clone()
        }
    }

    #[async_trait]
    impl Responder for ScriptedResponder {
        async fn respond(&self, transcript: &[TranscriptEntry]) -> Result<String> {
            self.seen.lock().unwrap_or_else(|p| p.into_inner()).push(transcript.to_vec());
            let next = self.replies.lock().unwrap_or_else(|p| p.into_inner()).pop_front();
            match next {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(reason)) => Err(anyhow!(reason)),
                None => Ok(transcript.last().map(|e| format!("I hear you: {}", e.text)).unwrap_or_default()),
            }
        }
    }

    #[derive(Clone)]
    pub struct ChannelOutbound(pub mpsc::Sender<(String, OutboundAction)>);

    #[async_trait]
    impl OutboundPort for ChannelOutbound {
        async fn send(&self, user_id: &str, action: OutboundAction) -> Result<()> {
            self.0.send((user_id.to_string(), action)).await.map_err(|e| anyhow!(e.to_string()))
        }
    }

    /// Drops everything.
    #[derive(Clone, Default)]
    pub struct NullOutbound;

    #[async_trait]
    impl OutboundPort for NullOutbound {
        async fn send(&self, _user_id: &str, _action: OutboundAction) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    pub struct RecordingAlert(pub Arc<Mutex<Vec<String>>>);

    impl RecordingAlert {
        pub fn alerts(&self) -> Vec<String> {
            self.0.lock().unwrap_or_else(|p| p.into_inner()).clone()
        }
    }

    #[async_trait]
    impl AlertPort for RecordingAlert {
        async fn notify(&self, text: &str) -> Result<()> {
            self.0.lock().unwrap_or_else(|p| p.into_inner()).push(text.to_string());
            Ok(())
        }
    }

    /// Usage counter kept in memory; clones share it, like a file across restarts.
    #[derive(Clone, Default)]
    pub struct MemoryUsageStore(pub Arc<Mutex<Option<DailyUsage>>>);

    impl MemoryUsageStore {
        pub fn saved(&self) -> Option<DailyUsage> {
            *self.0.lock().unwrap_or_else(|p| p.into_inner())
        }
    }

    #[async_trait]
    impl UsageStore for MemoryUsageStore {
        async fn load(&self) -> Result<Option<DailyUsage>> {
            Ok(self.saved())
        }

        async fn save(&self, usage: &DailyUsage) -> Result<()> {
            *self.0.lock().unwrap_or_else(|p| p.into_inner()) = Some(*usage);
            Ok(())
        }
    }
}
