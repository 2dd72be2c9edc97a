//! Authoritative per-player store.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use miner_core::PlayerId;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::StoreError;

/// One stored snapshot and the authority timestamp it was written with.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteRecord {
    pub game_data: String,
    pub last_updated: DateTime<Utc>,
}

/// A remote store keyed by player. Upserts never replace a record with an
/// older `last_updated`.
pub trait RemoteStore: Send + Sync {
    fn fetch(
        &self,
        player: &PlayerId,
    ) -> impl Future<Output = Result<Option<RemoteRecord>, StoreError>> + Send;

    fn upsert(
        &self,
        player: &PlayerId,
        record: &RemoteRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Open (creating if needed) the SQLite database at `url` and run migrations.
pub async fn init_db(url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!(url, "remote store ready");
    Ok(pool)
}

/// Migrated in-memory database. Held on a single connection that never idles
/// out, since each SQLite memory connection is its own database.
pub async fn init_memory_db() -> Result<SqlitePool, StoreError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

fn stamp(ts: &DateTime<Utc>) -> String {
    // Fixed width and zone so that SQL string comparison orders by time.
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Clone, Debug)]
pub struct SqliteRemote {
    pool: SqlitePool,
}

impl SqliteRemote {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl RemoteStore for SqliteRemote {
    async fn fetch(&self, player: &PlayerId) -> Result<Option<RemoteRecord>, StoreError> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT game_data, last_updated FROM player_saves WHERE player_id = ?",
        )
        .bind(player.as_str())
        .fetch_optional(&self.pool)
        .await?;
        let Some((game_data, updated)) = row else {
            return Ok(None);
        };
        let last_updated = DateTime::parse_from_rfc3339(&updated)
            .map_err(|e| StoreError::Timestamp(format!("{updated}: {e}")))?
            .with_timezone(&Utc);
        Ok(Some(RemoteRecord {
            game_data,
            last_updated,
        }))
    }

    async fn upsert(&self, player: &PlayerId, record: &RemoteRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO player_saves (player_id, game_data, last_updated) VALUES (?, ?, ?) \
             ON CONFLICT(player_id) DO UPDATE SET \
             game_data = excluded.game_data, last_updated = excluded.last_updated \
             WHERE excluded.last_updated >= player_saves.last_updated",
        )
        .bind(player.as_str())
        .bind(record.game_data.as_str())
        .bind(stamp(&record.last_updated))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            debug!(player = %player, "remote kept newer record");
        }
        Ok(())
    }
}

/// In-process remote with a failure switch, for tests and offline runs.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    records: Mutex<HashMap<PlayerId, RemoteRecord>>,
    offline: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn get(&self, player: &PlayerId) -> Option<RemoteRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.get(player).cloned()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("remote offline".into()))
        } else {
            Ok(())
        }
    }
}

impl RemoteStore for MemoryRemote {
    async fn fetch(&self, player: &PlayerId) -> Result<Option<RemoteRecord>, StoreError> {
        self.check()?;
        Ok(self.get(player))
    }

    async fn upsert(&self, player: &PlayerId, record: &RemoteRecord) -> Result<(), StoreError> {
        self.check()?;
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let newer = records
            .get(player)
            .is_some_and(|existing| existing.last_updated > record.last_updated);
        if !newer {
            records.insert(player.clone(), record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miner_core::millis_to_datetime;

    fn record(data: &str, at: DateTime<Utc>) -> RemoteRecord {
        RemoteRecord {
            game_data: data.into(),
            last_updated: at,
        }
    }

    #[tokio::test]
    async fn sqlite_upsert_and_fetch() {
        let remote = SqliteRemote::new(init_memory_db().await.unwrap());
        let p = PlayerId::new("p1");
        assert!(remote.fetch(&p).await.unwrap().is_none());
        let t0 = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.250Z")
            .unwrap()
            .with_timezone(&Utc);
        remote.upsert(&p, &record("{\"v\":1}", t0)).await.unwrap();
        let got = remote.fetch(&p).await.unwrap().unwrap();
        assert_eq!(got, record("{\"v\":1}", t0));

        let later = millis_to_datetime(t0.timestamp_millis() + 30_000);
        remote.upsert(&p, &record("{\"v\":2}", later)).await.unwrap();
        assert_eq!(remote.fetch(&p).await.unwrap().unwrap().game_data, "{\"v\":2}");
    }

    #[tokio::test]
    async fn sqlite_refuses_older_write() {
        let remote = SqliteRemote::new(init_memory_db().await.unwrap());
        let p = PlayerId::new("p2");
        let t0 = millis_to_datetime(1_700_000_000_000);
        remote.upsert(&p, &record("new", t0)).await.unwrap();
        let stale = millis_to_datetime(1_700_000_000_000 - 300_000);
        remote.upsert(&p, &record("stale", stale)).await.unwrap();
        assert_eq!(remote.fetch(&p).await.unwrap().unwrap().game_data, "new");
    }

    #[tokio::test]
    async fn memory_remote_offline_switch() {
        let remote = MemoryRemote::new();
        let p = PlayerId::new("p3");
        remote.set_offline(true);
        assert!(matches!(
            remote.fetch(&p).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(remote.upsert(&p, &record("x", Utc::now())).await.is_err());
        remote.set_offline(false);
        remote.upsert(&p, &record("x", Utc::now())).await.unwrap();
        assert_eq!(remote.get(&p).unwrap().game_data, "x");
    }
}
