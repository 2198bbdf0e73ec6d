#![deny(warnings)]

//! Persistence layer: SQLite save slots holding JSON snapshots.
//!
//! A save is a named slot; every call to [`save_snapshot`] appends a row so
//! older snapshots stay available. [`load_latest`] returns the newest one.

use anyhow::{Context, Result};
use chrono::Utc;
use sim_runtime::Snapshot;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS saves (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        note TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        save_id INTEGER NOT NULL REFERENCES saves(id) ON DELETE CASCADE,
        version INTEGER NOT NULL,
        taken_at_ms INTEGER NOT NULL,
        payload_json TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS snapshots_by_save ON snapshots (save_id, id)",
];

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/main.db"
}

/// Creates the directory that will hold a file-backed database.
pub fn ensure_db_dir(url: &str) -> Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"));
    let Some(path) = path.filter(|p| !p.contains(":memory:")) else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// One row of [`list_saves`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveSummary {
    pub id: i64,
    pub name: String,
    pub note: Option<String>,
    pub created_at: String,
    pub snapshots: i64,
    pub latest_taken_at_ms: Option<i64>,
}

/// Opens (creating if needed) the database at `url` and applies the schema.
pub async fn init_db(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid sqlite url {url}"))?
        .create_if_missing(true)
        .foreign_keys(true);
    // Every connection to an in-memory database is a separate database.
    let in_memory = url.contains(":memory:");
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 4 })
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .context("applying schema")?;
    }
    info!(url, "database ready");
    Ok(pool)
}

/// Creates a save slot, or returns the id of the existing slot with `name`.
pub async fn create_save(pool: &SqlitePool, name: &str, note: Option<&str>) -> Result<i64> {
    if let Some(id) = find_save(pool, name).await? {
        return Ok(id);
    }
    let id = sqlx::query("INSERT INTO saves (name, note, created_at) VALUES (?1, ?2, ?3)")
        .bind(name)
        .bind(note)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .with_context(|| format!("creating save '{name}'"))?
        .last_insert_rowid();
    info!(save = name, id, "save created");
    Ok(id)
}

pub async fn find_save(pool: &SqlitePool, name: &str) -> Result<Option<i64>> {
    let row = sqlx::query("SELECT id FROM saves WHERE name = ?1")
        .bind(name)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("looking up save '{name}'"))?;
    row.map(|r| r.try_get::<i64, _>("id"))
        .transpose()
        .context("reading save id")
}

/// Appends `snapshot` to the save slot and returns the new snapshot row id.
pub async fn save_snapshot(pool: &SqlitePool, save_id: i64, snapshot: &Snapshot) -> Result<i64> {
    let payload = snapshot.to_json().context("encoding snapshot")?;
    let id = sqlx::query(
        "INSERT INTO snapshots (save_id, version, taken_at_ms, payload_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(save_id)
    .bind(i64::from(snapshot.version))
    .bind(snapshot.taken_at.0)
    .bind(payload)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .with_context(|| format!("writing snapshot for save {save_id}"))?
    .last_insert_rowid();
    debug!(save_id, id, taken_at = %snapshot.taken_at, "snapshot saved");
    Ok(id)
}

/// Newest snapshot of the save slot, if it has any.
pub async fn load_latest(pool: &SqlitePool, save_id: i64) -> Result<Option<Snapshot>> {
    let row = sqlx::query(
        "SELECT payload_json FROM snapshots WHERE save_id = ?1 ORDER BY id DESC LIMIT 1",
    )
    .bind(save_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("reading latest snapshot for save {save_id}"))?;
    let Some(row) = row else {
        return Ok(None);
    };
    let payload: String = row.try_get("payload_json").context("reading payload")?;
    let snapshot = Snapshot::from_json(&payload)
        .with_context(|| format!("decoding snapshot for save {save_id}"))?;
    Ok(Some(snapshot))
}

pub async fn list_saves(pool: &SqlitePool) -> Result<Vec<SaveSummary>> {
    let rows = sqlx::query(
        "SELECT s.id, s.name, s.note, s.created_at,
                COUNT(n.id) AS snapshots, MAX(n.taken_at_ms) AS latest_taken_at_ms
         FROM saves s LEFT JOIN snapshots n ON n.save_id = s.id
         GROUP BY s.id ORDER BY s.id",
    )
    .fetch_all(pool)
    .await
    .context("listing saves")?;
    rows.iter()
        .map(|r| {
            Ok(SaveSummary {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
                note: r.try_get("note")?,
                created_at: r.try_get("created_at")?,
                snapshots: r.try_get("snapshots")?,
                latest_taken_at_ms: r.try_get("latest_taken_at_ms")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .context("reading save rows")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::{Namespace, Skill, Timestamp};
    use sim_runtime::{GameState, SNAPSHOT_VERSION};

    fn snapshot(at: i64, gold: u64) -> Snapshot {
        let mut state = GameState::default();
        state.inventory.add_gold(gold);
        state.inventory.add(Namespace::Village, "grain", 12);
        state.skills.grant(Skill::Gathering, 500);
        Snapshot {
            version: SNAPSHOT_VERSION,
            taken_at: Timestamp(at),
            state,
            rng: None,
        }
    }

    #[test]
    fn url_is_sqlite() {
        assert!(default_sqlite_url().starts_with("sqlite://"));
    }

    #[test]
    fn memory_urls_need_no_directory() {
        assert!(ensure_db_dir("sqlite::memory:").is_ok());
        assert!(ensure_db_dir("sqlite://saves.db").is_ok());
    }

    #[tokio::test]
    async fn latest_snapshot_wins() {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let save = create_save(&pool, "main", Some("test")).await.unwrap();
        assert!(load_latest(&pool, save).await.unwrap().is_none());

        save_snapshot(&pool, save, &snapshot(1_000, 5)).await.unwrap();
        save_snapshot(&pool, save, &snapshot(2_000, 9)).await.unwrap();
        let latest = load_latest(&pool, save).await.unwrap().unwrap();
        assert_eq!(latest, snapshot(2_000, 9));
    }

    #[tokio::test]
    async fn create_save_is_idempotent_by_name() {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let a = create_save(&pool, "main", None).await.unwrap();
        let b = create_save(&pool, "main", Some("again")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(find_save(&pool, "other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn saves_are_listed_with_counts() {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let main = create_save(&pool, "main", Some("first")).await.unwrap();
        create_save(&pool, "empty", None).await.unwrap();
        save_snapshot(&pool, main, &snapshot(1_000, 1)).await.unwrap();
        save_snapshot(&pool, main, &snapshot(4_000, 1)).await.unwrap();

        let saves = list_saves(&pool).await.unwrap();
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[0].name, "main");
        assert_eq!(saves[0].note.as_deref(), Some("first"));
        assert_eq!(saves[0].snapshots, 2);
        assert_eq!(saves[0].latest_taken_at_ms, Some(4_000));
        assert_eq!(saves[1].snapshots, 0);
        assert_eq!(saves[1].latest_taken_at_ms, None);
    }

    #[tokio::test]
    async fn unsupported_version_is_an_error() {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let save = create_save(&pool, "main", None).await.unwrap();
        let mut snap = snapshot(0, 0);
        snap.version = SNAPSHOT_VERSION + 1;
        save_snapshot(&pool, save, &snap).await.unwrap();
        assert!(load_latest(&pool, save).await.is_err());
    }
}
