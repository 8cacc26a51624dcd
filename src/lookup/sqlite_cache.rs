//! Durable cache backend on SQLite.
//! Same contract as the in-memory store: values are stored as JSON, expiry is
//! checked on read, and a periodic cleanup task drops stale rows.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::CacheStore;
use crate::error::CacheError;

/// SQLite-backed TTL cache.
pub struct SqliteCache<V> {
    conn: Arc<Mutex<Connection>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> SqliteCache<V> {
    /// Open (or create) the cache database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(db_path)
            .map_err(|e| backend("failed to open SQLite cache", e))?;
        let cache = Self::with_connection(conn)?;
        info!(path = %db_path.display(), "SQLite cache opened");
        Ok(cache)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn =
            Connection::open_in_memory().map_err(|e| backend("failed to open SQLite cache", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| backend("PRAGMA failed", e))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                cache_key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_expires
                ON cache_entries(expires_at);",
        )
        .map_err(|e| backend("create table failed", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            _value: PhantomData,
        })
    }

    /// Remove expired rows. Returns how many were deleted.
    pub fn purge_expired(&self) -> usize {
        let conn = self.conn.lock();
        match conn.execute(
            "DELETE FROM cache_entries WHERE expires_at <= ?1",
            params![now_unix_ms()],
        ) {
            Ok(count) => {
                if count > 0 {
                    info!(removed = count, "SQLite cache cleanup");
                }
                count
            }
            Err(e) => {
                warn!(error = %e, "SQLite cache cleanup failed");
                0
            }
        }
    }

    /// Run a blocking closure against the connection off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .map_err(|e| CacheError::Backend(format!("cache task failed: {e}")))?
    }
}

impl<V> SqliteCache<V>
where
    V: Send + Sync + 'static,
{
    /// Purge expired rows every `every` until `shutdown` fires or the cache
    /// is dropped. Each pass runs on the blocking pool.
    pub fn spawn_cleanup(
        self: &Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.cancelled() => break,
                }
                let Some(cache) = weak.upgrade() else { break };
                if let Err(e) = tokio::task::spawn_blocking(move || cache.purge_expired()).await {
                    warn!(error = %e, "SQLite cache cleanup task failed");
                }
            }
            debug!("SQLite cache cleanup stopped");
        })
    }
}

#[async_trait]
impl<V> CacheStore<V> for SqliteCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let key = key.to_string();
        let raw: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT value FROM cache_entries WHERE cache_key = ?1 AND expires_at > ?2",
                    params![key, now_unix_ms()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| backend("cache read failed", e))
            })
            .await?;

        match raw {
            Some(json) => {
                debug!("SQLite cache hit");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &V, ttl: Duration) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        let key = key.to_string();
        let expires_at = now_unix_ms().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache_entries (cache_key, value, expires_at)
                 VALUES (?1, ?2, ?3)",
                params![key, json, expires_at],
            )
            .map(|_| ())
            .map_err(|e| backend("cache insert failed", e))
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM cache_entries WHERE cache_key = ?1", params![key])
                .map(|_| ())
                .map_err(|e| backend("cache delete failed", e))
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT 1 FROM cache_entries WHERE cache_key = ?1 AND expires_at > ?2",
                params![key, now_unix_ms()],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
            .map_err(|e| backend("cache read failed", e))
        })
        .await
    }
}

fn backend(context: &str, e: rusqlite::Error) -> CacheError {
    CacheError::Backend(format!("{context}: {e}"))
}

/// Current time as Unix timestamp (milliseconds).
fn now_unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
