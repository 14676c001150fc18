use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::models::Fixture;

/// One alertable match state: a fixture at a given signed goal differential.
/// A goal changes the differential and therefore the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub fixture_id: String,
    pub goal_diff: i32,
}

impl CooldownKey {
    pub fn for_fixture(fixture: &Fixture) -> Self {
        CooldownKey {
            fixture_id: fixture.id.clone(),
            goal_diff: fixture.goal_diff(),
        }
    }
}

/// Last alert time per match state, shared by every scan path.
///
/// Entries are never removed; an old entry simply fails the recency check.
#[derive(Clone, Default)]
pub struct CooldownStore {
    inner: Arc<Mutex<HashMap<CooldownKey, DateTime<Utc>>>>,
}

impl CooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true and records `now` if `key` was not alerted within `window`.
    /// The check and the write happen under one lock, so two concurrent
    /// cycles cannot both pass for the same key.
    pub async fn check_and_record(&self, key: CooldownKey, now: DateTime<Utc>, window: Duration) -> bool {
        let mut inner = self.inner.lock().await;
        if let Some(last) = inner.get(&key) {
            if now - *last < window {
                return false;
            }
        }
        inner.insert(key, now);
        true
    }

    #[cfg(test)]
    pub async fn last_alert(&self, key: &CooldownKey) -> Option<DateTime<Utc>> {
        self.inner.lock().await.get(key).copied()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
