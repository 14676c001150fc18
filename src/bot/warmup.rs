//! Warm cache: pregame signals persisted to SQLite so a restart does not
//! have to refetch every prediction.
//!
//! Entries keep their original fetch time, so a restored value expires on
//! the same schedule as if the process had never stopped. Anything that
//! cannot be read back (missing table, corrupt payload) is skipped with a
//! warning; the cache simply starts emptier.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::enrichment::EnrichmentCache;
use super::scanner::Scanner;
use crate::db::{Database, WarmEntry};

/// Load persisted entries for `cache`'s source. Never fails.
pub fn read_snapshot<T>(cache: &EnrichmentCache<T>, db: &Database) -> Vec<(String, T, DateTime<Utc>)>
where
    T: DeserializeOwned + Clone + Send + Sync,
{
    let rows = match db.load_warm_entries(cache.source()) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Warm cache for {} unreadable, starting empty: {:#}", cache.source(), e);
            return Vec::new();
        }
    };

    rows.into_iter()
        .filter_map(|row| match serde_json::from_str::<T>(&row.payload) {
            Ok(value) => Some((row.key, value, row.fetched_at)),
            Err(e) => {
                warn!("Dropping undecodable warm entry {}/{}: {}", row.source, row.key, e);
                None
            }
        })
        .collect()
}

/// Seed `cache` from the database. Returns how many fresh entries were loaded.
pub async fn load_into<T>(cache: &EnrichmentCache<T>, db: &Database) -> usize
where
    T: DeserializeOwned + Clone + Send + Sync,
{
    let now = Utc::now();
    let entries = read_snapshot(cache, db);
    let loaded = cache.restore(entries, now).await;
    info!("Warm cache: restored {} {} entr(ies)", loaded, cache.source());
    loaded
}

/// Replace the persisted snapshot of `cache` with its fresh entries.
pub async fn persist<T>(cache: &EnrichmentCache<T>, db: &Database) -> Result<usize>
where
    T: Serialize + Clone + Send + Sync,
{
    let snapshot = cache.available_entries(Utc::now()).await;
    let rows = snapshot
        .into_iter()
        .map(|(key, value, fetched_at)| {
            Ok(WarmEntry {
                source: cache.source().to_string(),
                key,
                payload: serde_json::to_string(&value)?,
                fetched_at,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    db.replace_warm_entries(cache.source(), &rows)?;
    Ok(rows.len())
}

/// Prefetch pregame signals for the current live fixtures, then persist.
pub async fn warm_up(scanner: &Scanner) -> Result<usize> {
    let fixtures = scanner.live_fixtures().await?;
    let lookups = fixtures.iter().map(|f| scanner.pregame_signal(f));
    let available = futures_util::future::join_all(lookups)
        .await
        .into_iter()
        .filter(|o| o.is_available())
        .count();
    debug!("Warm-up: {}/{} pregame signals available", available, fixtures.len());

    match scanner.db() {
        Some(db) => persist(&scanner.caches().pregame, db).await,
        None => Ok(0),
    }
}

/// Periodic warm-up task. Stops when `shutdown` flips.
pub async fn run_warmup_loop(scanner: Arc<Scanner>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    if !scanner.is_enabled() {
        return;
    }
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match warm_up(&scanner).await {
                    Ok(n) => info!("Warm cache refreshed: {} pregame entr(ies) persisted", n),
                    Err(e) => warn!("Warm-up failed: {:#}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::enrichment::{SourceOutcome, TtlPolicy};
    use crate::db::models::PregameSignal;
    use crate::db::temp_db_path;
    use chrono::Duration as ChronoDuration;

    fn cache() -> EnrichmentCache<PregameSignal> {
        EnrichmentCache::new(
            "pregame",
            TtlPolicy::new(ChronoDuration::hours(6), ChronoDuration::minutes(5)),
        )
    }

    fn signal(boost: f64) -> PregameSignal {
        PregameSignal {
            boost,
            context_boost: 0.01,
            rating_home: 0.6,
            rating_away: 0.4,
        }
    }

    #[tokio::test]
    async fn persisted_entries_survive_restart() {
        let path = temp_db_path("warm_roundtrip");
        let db = Database::open(path.to_str().unwrap()).unwrap();

        let before = cache();
        before.get("100", || async { Ok(Some(signal(0.03))) }).await;
        before.get("200", || async { Ok(None) }).await;
        assert_eq!(persist(&before, &db).await.unwrap(), 1);

        let after = cache();
        assert_eq!(load_into(&after, &db).await, 1);
        let out = after
            .get("100", || async { anyhow::bail!("should not refetch") })
            .await;
        assert_eq!(out, SourceOutcome::Available(signal(0.03)));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn corrupt_rows_are_skipped() {
        let path = temp_db_path("warm_corrupt");
        let db = Database::open(path.to_str().unwrap()).unwrap();
        let now = Utc::now();
        db.replace_warm_entries(
            "pregame",
            &[
                WarmEntry {
                    source: "pregame".into(),
                    key: "1".into(),
                    payload: "{not json".into(),
                    fetched_at: now,
                },
                WarmEntry {
                    source: "pregame".into(),
                    key: "2".into(),
                    payload: serde_json::to_string(&signal(0.02)).unwrap(),
                    fetched_at: now,
                },
            ],
        )
        .unwrap();

        let restored = read_snapshot(&cache(), &db);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].0, "2");

        let _ = std::fs::remove_file(&path);
    }
}
