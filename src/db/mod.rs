use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// One persisted warm-cache row.
#[derive(Debug, Clone)]
pub struct WarmEntry {
    pub source: String,
    pub key: String,
    /// JSON-encoded cached value
    pub payload: String,
    pub fetched_at: DateTime<Utc>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Warm cache ───────────────────────────────────────────────────────────

    /// Load every persisted warm-cache entry for a source.
    pub fn load_warm_entries(&self, source: &str) -> Result<Vec<WarmEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source, key, payload, fetched_at FROM warm_cache WHERE source=?1",
        )?;
        let rows = stmt
            .query_map(params![source], |row| {
                Ok(WarmEntry {
                    source: row.get(0)?,
                    key: row.get(1)?,
                    payload: row.get(2)?,
                    fetched_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Replace the persisted snapshot of a source with `entries`.
    pub fn replace_warm_entries(&self, source: &str, entries: &[WarmEntry]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM warm_cache WHERE source=?1", params![source])?;
        for e in entries {
            tx.execute(
                "INSERT INTO warm_cache (source, key, payload, fetched_at)
                 VALUES (?1,?2,?3,?4)",
                params![source, e.key, e.payload, e.fetched_at],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── Alerts ────────────────────────────────────────────────────────────────

    /// Append an emitted alert to the log
    pub fn insert_alert(&self, alert: &Alert) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alerts (
                fixture_id, fixture_name, variant, minute, home_goals, away_goals,
                pressure, p_final, odd, ev, text, created_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                alert.fixture_id,
                alert.fixture_name,
                alert.variant.as_str(),
                alert.minute,
                alert.home_goals,
                alert.away_goals,
                alert.pressure,
                alert.p_final,
                alert.odd,
                alert.ev,
                alert.text,
                alert.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List recent alerts, newest first
    pub fn list_recent_alerts(&self, limit: i64) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, fixture_id, fixture_name, variant, minute, home_goals, away_goals,
                    pressure, p_final, odd, ev, text, created_at
             FROM alerts ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let alerts = stmt
            .query_map(params![limit], map_alert)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(alerts)
    }
}

fn map_alert(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
    let variant: String = row.get(3)?;
    Ok(Alert {
        id: row.get(0)?,
        fixture_id: row.get(1)?,
        fixture_name: row.get(2)?,
        variant: AlertVariant::parse(&variant).unwrap_or(AlertVariant::Full),
        minute: row.get(4)?,
        home_goals: row.get(5)?,
        away_goals: row.get(6)?,
        pressure: row.get(7)?,
        p_final: row.get(8)?,
        odd: row.get(9)?,
        ev: row.get(10)?,
        text: row.get(11)?,
        created_at: row.get(12)?,
    })
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS warm_cache (
    source      TEXT    NOT NULL,
    key         TEXT    NOT NULL,
    payload     TEXT    NOT NULL,
    fetched_at  TEXT    NOT NULL,
    PRIMARY KEY (source, key)
);

CREATE TABLE IF NOT EXISTS alerts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    fixture_id   TEXT    NOT NULL,
    fixture_name TEXT    NOT NULL,
    variant      TEXT    NOT NULL,
    minute       INTEGER NOT NULL,
    home_goals   INTEGER NOT NULL,
    away_goals   INTEGER NOT NULL,
    pressure     REAL    NOT NULL,
    p_final      REAL    NOT NULL,
    odd          REAL    NOT NULL,
    ev           REAL,
    text         TEXT    NOT NULL,
    created_at   TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alerts_created ON alerts(created_at);
CREATE INDEX IF NOT EXISTS idx_alerts_fixture ON alerts(fixture_id);
"#;

#[cfg(test)]
pub(crate) fn temp_db_path(tag: &str) -> std::path::PathBuf {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    std::env::temp_dir().join(format!("livesignal-{}-{}-{}.db", tag, std::process::id(), nanos))
}
