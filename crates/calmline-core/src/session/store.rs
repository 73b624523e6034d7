use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::context::Session;

pub type SessionSlot = Arc<Mutex<Option<Session>>>;

/// Per-user session storage.
///
/// Each user owns a slot behind its own async mutex, so handling one user's
/// event never waits on another user. The outer map lock is only held long
/// enough to find or create a slot.
#[derive(Default)]
pub struct SessionStore {
    slots: RwLock<HashMap<String, SessionSlot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `user_id`, created on first use. Slots are never replaced
    /// while referenced, so two holders of a user's slot share one mutex.
    pub fn slot(&self, user_id: &str) -> SessionSlot {
        if let Some(slot) = self.read_map().get(user_id) {
            return slot.clone();
        }
        let mut map = self.write_map();
        map.entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Lock a user's slot for a read-modify-write sequence.
    pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<Option<Session>> {
        self.slot(user_id).lock_owned().await
    }

    pub async fn get(&self, user_id: &str) -> Option<Session> {
        self.lock(user_id).await.clone()
    }

    pub async fn put(&self, user_id: &str, session: Session) -> Option<Session> {
        self.lock(user_id).await.replace(session)
    }

    pub async fn clear(&self, user_id: &str) -> Option<Session> {
        self.lock(user_id).await.take()
    }

    /// Number of users with a session. Waits for slots that are locked right now.
    pub async fn active_count(&self) -> usize {
        let slots: Vec<SessionSlot> = self.read_map().values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Remove sessions idle for longer than `max_idle` and drop unused empty
    /// slots. Slots that are locked right now are skipped.
    pub fn sweep_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> Vec<Session> {
        let mut expired = Vec::new();
        let mut map = self.write_map();
        map.retain(|_, slot| {
            let referenced = Arc::strong_count(slot) > 1;
            let Ok(mut guard) = slot.try_lock() else {
                return true;
            };
            if let Some(session) = guard.as_ref() {
                let idle = (now - session.last_activity).to_std().unwrap_or_default();
                if idle > max_idle {
                    expired.extend(guard.take());
                }
            }
            guard.is_some() || referenced
        });
        expired
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionSlot>> {
        self.slots.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SessionSlot>> {
        self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
