//! TTL cache shared by every enrichment source.
//!
//! Each source (news, pregame, player impact, team form) gets its own
//! `EnrichmentCache` with a success TTL and a shorter negative TTL. A lookup
//! that hits a fresh entry does no I/O. A miss or stale entry runs the fetch
//! closure once; successes are cached for `ttl`, while errors and empty
//! answers are cached for `negative_ttl` so a failing upstream is retried at a
//! bounded rate.
//!
//! Lookups never fail: the caller always gets a [`SourceOutcome`], and
//! anything other than `Available` means "use the neutral value".

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Result of one enrichment lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome<T> {
    /// The source answered with data.
    Available(T),
    /// The fetch failed or timed out.
    Degraded(String),
    /// The source answered but had nothing for this key.
    Unavailable,
}

impl<T> SourceOutcome<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            SourceOutcome::Available(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            SourceOutcome::Available(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SourceOutcome::Available(_))
    }
}

/// Success and negative lifetimes for one source.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    pub ttl: Duration,
    pub negative_ttl: Duration,
}

impl TtlPolicy {
    pub fn new(ttl: Duration, negative_ttl: Duration) -> Self {
        TtlPolicy { ttl, negative_ttl }
    }
}

/// A cached lookup result with its fetch time and lifetime.
#[derive(Debug, Clone)]
pub struct CachedEntry<T> {
    pub outcome: SourceOutcome<T>,
    pub fetched_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl<T> CachedEntry<T> {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at > self.ttl
    }
}

/// Thread-safe, keyed TTL cache for one enrichment source.
#[derive(Clone)]
pub struct EnrichmentCache<T> {
    source: String,
    policy: TtlPolicy,
    inner: Arc<RwLock<HashMap<String, CachedEntry<T>>>>,
}

impl<T: Clone + Send + Sync> EnrichmentCache<T> {
    pub fn new(source: impl Into<String>, policy: TtlPolicy) -> Self {
        EnrichmentCache {
            source: source.into(),
            policy,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Cached value for `key`, fetching through `fetch` when missing or stale.
    pub async fn get<F, Fut>(&self, key: &str, fetch: F) -> SourceOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        self.get_at(key, Utc::now(), fetch).await
    }

    pub async fn get_at<F, Fut>(&self, key: &str, now: DateTime<Utc>, fetch: F) -> SourceOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        if let Some(entry) = self.inner.read().await.get(key) {
            if !entry.is_stale(now) {
                debug!("{} cache hit: {}", self.source, key);
                return entry.outcome.clone();
            }
        }

        let (outcome, ttl) = match fetch().await {
            Ok(Some(value)) => (SourceOutcome::Available(value), self.policy.ttl),
            Ok(None) => (SourceOutcome::Unavailable, self.policy.negative_ttl),
            Err(e) => {
                warn!("{} lookup failed for {}: {:#}", self.source, key, e);
                (
                    SourceOutcome::Degraded(format!("{:#}", e)),
                    self.policy.negative_ttl,
                )
            }
        };

        self.inner.write().await.insert(
            key.to_string(),
            CachedEntry {
                outcome: outcome.clone(),
                fetched_at: now,
                ttl,
            },
        );
        outcome
    }

    /// Drop entries that are already stale. Returns how many were removed.
    pub async fn purge_stale(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.len();
        inner.retain(|_, e| !e.is_stale(now));
        before - inner.len()
    }

    /// Fresh successful entries with their fetch times, for persistence.
    pub async fn available_entries(&self, now: DateTime<Utc>) -> Vec<(String, T, DateTime<Utc>)> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|(_, e)| !e.is_stale(now))
            .filter_map(|(k, e)| {
                e.outcome
                    .value()
                    .map(|v| (k.clone(), v.clone(), e.fetched_at))
            })
            .collect()
    }

    /// Seed the cache with previously fetched values. Entries keep their
    /// original fetch time, so old ones expire on schedule; stale ones are skipped.
    pub async fn restore(&self, entries: Vec<(String, T, DateTime<Utc>)>, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write().await;
        let mut restored = 0;
        for (key, value, fetched_at) in entries {
            let entry = CachedEntry {
                outcome: SourceOutcome::Available(value),
                fetched_at,
                ttl: self.policy.ttl,
            };
            if entry.is_stale(now) {
                continue;
            }
            inner.insert(key, entry);
            restored += 1;
        }
        restored
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
