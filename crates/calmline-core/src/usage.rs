//! Daily budget for the support-chat responder.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::config::ResponderQuota;
use crate::ports::{AlertPort, Responder, UsageStore};
use crate::support::TranscriptEntry;

/// Calls made on one UTC day. This is what a [`UsageStore`] keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    Allowed { count: u32, alert: bool },
    /// `first` is set only on the first refused call of the day.
    Exhausted { count: u32, first: bool },
}

struct MeterState {
    usage: DailyUsage,
    refused: bool,
}

/// Counts calls per UTC day. The counter resets on the first call of a new day.
pub struct UsageMeter {
    quota: ResponderQuota,
    state: Mutex<MeterState>,
}

impl UsageMeter {
    pub fn new(quota: ResponderQuota) -> Self {
        let usage = DailyUsage { date: Utc::now().date_naive(), count: 0 };
        Self { quota, state: Mutex::new(MeterState { usage, refused: false }) }
    }

    /// Continue from a saved counter, e.g. after a restart.
    pub fn restore(&self, saved: DailyUsage) {
        *self.lock() = MeterState { usage: saved, refused: false };
    }

    pub fn snapshot(&self) -> DailyUsage {
        self.lock().usage
    }

    pub fn record(&self, today: NaiveDate) -> Usage {
        let mut state = self.lock();
        if state.usage.date != today {
            info!(from = %state.usage.date, to = %today, "new day, resetting responder usage");
            *state = MeterState { usage: DailyUsage { date: today, count: 0 }, refused: false };
        }
        let count = state.usage.count;
        if count >= self.quota.daily_limit {
            let first = !state.refused;
            state.refused = true;
            return Usage::Exhausted { count, first };
        }
        state.usage.count += 1;
        let count = state.usage.count;
        Usage::Allowed { count, alert: count == self.quota.alert_threshold }
    }

    pub fn count(&self) -> u32 {
        self.lock().usage.count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MeterState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Wraps a responder with the daily quota and operator alerts.
pub struct QuotaResponder<R, A> {
    inner: R,
    alerts: A,
    meter: UsageMeter,
    store: Option<Box<dyn UsageStore>>,
}

impl<R: Responder, A: AlertPort> QuotaResponder<R, A> {
    pub fn new(inner: R, alerts: A, quota: ResponderQuota) -> Self {
        Self { inner, alerts, meter: UsageMeter::new(quota), store: None }
    }

    /// Load the saved counter from `store` and keep it updated from now on.
    pub async fn with_store<U: UsageStore + 'static>(mut self, store: U) -> Result<Self> {
        if let Some(saved) = store.load().await? {
            info!(date = %saved.date, count = saved.count, "restored responder usage");
            self.meter.restore(saved);
        }
        self.store = Some(Box::new(store));
        Ok(self)
    }

    pub fn meter(&self) -> &UsageMeter {
        &self.meter
    }

    async fn alert(&self, text: String) {
        if let Err(e) = self.alerts.notify(&text).await {
            warn!("failed to deliver operator alert: {}", e);
        }
    }

    async fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.meter.snapshot()).await {
                warn!("failed to save responder usage: {:#}", e);
            }
        }
    }
}

#[async_trait]
impl<R: Responder, A: AlertPort> Responder for QuotaResponder<R, A> {
    async fn respond(&self, transcript: &[TranscriptEntry]) -> Result<String> {
        match self.meter.record(Utc::now().date_naive()) {
            Usage::Exhausted { count, first } => {
                warn!(count, "responder daily limit reached");
                if first {
                    self.alert(format!("Responder daily limit of {} calls reached, refusing until tomorrow.", count))
                        .await;
                }
                Err(anyhow!("daily responder limit of {} calls reached", count))
            }
            Usage::Allowed { count, alert } => {
                self.persist().await;
                if alert {
                    self.alert(format!("Responder usage reached {} calls today.", count)).await;
                }
                match self.inner.respond(transcript).await {
                    Ok(reply) => Ok(reply),
                    Err(e) => {
                        self.alert(format!("Responder call failed: {}", e)).await;
                        Err(e)
                    }
                }
            }
        }
    }
}
