use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use protocol::OutboundAction;

use crate::error::StorageError;
use crate::recommend::CompletedRecord;
use crate::session::FlowKind;
use crate::support::TranscriptEntry;
use crate::usage::DailyUsage;

/// Narrowing for [`CheckInRepository::query`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub flow: Option<FlowKind>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn flow(kind: FlowKind) -> Self {
        Self { flow: Some(kind), ..Self::default() }
    }

    pub fn matches(&self, record: &CompletedRecord) -> bool {
        self.flow.map_or(true, |f| f == record.flow)
            && self.since.map_or(true, |since| record.timestamp >= since)
    }
}

#[async_trait]
pub trait CheckInRepository: Send + Sync {
    async fn save(&self, record: &CompletedRecord) -> Result<(), StorageError>;
    async fn query(&self, user_id: &str, filter: &RecordFilter) -> Result<Vec<CompletedRecord>, StorageError>;
}

/// Produces the next support-chat reply from the running transcript.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, transcript: &[TranscriptEntry]) -> Result<String>;
}

#[async_trait]
pub trait OutboundPort: Send + Sync {
    async fn send(&self, user_id: &str, action: OutboundAction) -> Result<()>;
}

/// Operator notifications.
#[async_trait]
pub trait AlertPort: Send + Sync {
    async fn notify(&self, text: &str) -> Result<()>;
}

/// Durable home for the responder's daily usage counter.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn load(&self) -> Result<Option<DailyUsage>>;
    async fn save(&self, usage: &DailyUsage) -> Result<()>;
}
