use anyhow::{Context, Result};
use async_trait::async_trait;
use calmline_core::ports::{CheckInRepository, RecordFilter, UsageStore};
use calmline_core::usage::DailyUsage;
use calmline_core::{CompletedRecord, StorageError};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Completed records appended to a JSON-lines file.
pub struct JsonlRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRepository {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        info!(path = %path.display(), "record file ready");
        Ok(Self { path, write_lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CheckInRepository for JsonlRepository {
    async fn save(&self, record: &CompletedRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn query(&self, user_id: &str, filter: &RecordFilter) -> Result<Vec<CompletedRecord>, StorageError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        for (n, line) in contents.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            match serde_json::from_str::<CompletedRecord>(line) {
                Ok(record) if record.user_id == user_id && filter.matches(&record) => found.push(record),
                Ok(_) => {}
                Err(e) => warn!(line = n + 1, "skipping unreadable record: {}", e),
            }
        }
        if let Some(limit) = filter.limit {
            let skip = found.len().saturating_sub(limit);
            found.drain(..skip);
        }
        Ok(found)
    }
}

/// Responder usage kept as a single JSON object, rewritten on every call.
pub struct JsonUsageStore {
    path: PathBuf,
}

impl JsonUsageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UsageStore for JsonUsageStore {
    async fn load(&self) -> Result<Option<DailyUsage>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        match serde_json::from_str(&contents) {
            Ok(usage) => Ok(Some(usage)),
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring unreadable usage file: {}", e);
                Ok(None)
            }
        }
    }

    async fn save(&self, usage: &DailyUsage) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(usage)?).await?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
