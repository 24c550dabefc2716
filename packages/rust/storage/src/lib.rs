//! Embedded libSQL TTL cache store.
//!
//! The [`CacheStore`] persists `key → payload` rows with an absolute
//! per-entry expiry. Expired rows are purged when read.
//!
//! **Access rules:**
//! - Every operation opens its own connection and runs as one independent unit;
//!   no lock is held across operations.
//! - Database calls run on tokio's blocking pool so a slow disk never stalls
//!   the async fan-out driving network requests.

mod migrations;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use leadscout_shared::{CacheEntry, LeadscoutError, Result};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Handle to the persistent TTL cache. Cheap to clone.
#[derive(Clone)]
pub struct CacheStore {
    db: Arc<Database>,
    path: PathBuf,
    default_ttl: Duration,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("path", &self.path)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl CacheStore {
    /// Open or create the cache database at `path` and apply migrations.
    pub async fn open(path: &Path, default_ttl: Duration) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadscoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let store = Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
            default_ttl,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// TTL used by [`CacheStore::set`] when none is given.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Run `op` on a fresh connection inside the blocking pool.
    async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Connection) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>>,
    {
        let conn = self.db.connect().map_err(storage_err)?;
        let handle = tokio::runtime::Handle::current();

        tokio::task::spawn_blocking(move || {
            handle.block_on(async move {
                conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
                    .map_err(storage_err)?;
                op(conn).await
            })
        })
        .await
        .map_err(|e| LeadscoutError::Storage(format!("cache worker failed: {e}")))?
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        self.run(|conn| async move {
            let current_version = schema_version(&conn).await;

            for migration in migrations::all_migrations() {
                if migration.version > current_version {
                    info!(
                        version = migration.version,
                        description = migration.description,
                        "applying cache migration"
                    );
                    conn.execute_batch(migration.sql).await.map_err(|e| {
                        LeadscoutError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
                }
            }
            Ok(())
        })
        .await
    }

    /// Current schema version, or 0 before any migration ran.
    pub async fn schema_version(&self) -> Result<u32> {
        self.run(|conn| async move { Ok(schema_version(&conn).await) })
            .await
    }

    // -----------------------------------------------------------------------
    // Cache operations
    // -----------------------------------------------------------------------

    /// Fetch a live payload. An expired row is deleted and reported as a miss.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.payload))
    }

    /// Fetch the full entry for `key`, purging it if expired.
    pub async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let key = key.to_string();
        self.run(move |conn| async move {
            let mut rows = conn
                .query(
                    "SELECT payload, expires_at FROM cache WHERE key = ?1",
                    params![key.as_str()],
                )
                .await
                .map_err(storage_err)?;

            let row = match rows.next().await.map_err(storage_err)? {
                Some(row) => row,
                None => return Ok(None),
            };
            let payload: String = row.get(0).map_err(storage_err)?;
            let expires_at: i64 = row.get(1).map_err(storage_err)?;
            drop(rows);

            if now_millis() > expires_at {
                // Only delete the exact row we saw; a concurrent set may have refreshed it.
                conn.execute(
                    "DELETE FROM cache WHERE key = ?1 AND expires_at = ?2",
                    params![key.as_str(), expires_at],
                )
                .await
                .map_err(storage_err)?;
                debug!(key = %key, "cache entry expired, purged");
                return Ok(None);
            }

            Ok(Some(CacheEntry {
                key,
                payload,
                expires_at: millis_to_datetime(expires_at)?,
            }))
        })
        .await
    }

    /// Upsert `payload` under `key`, expiring `ttl` (or the default TTL) from now.
    pub async fn set(&self, key: &str, payload: &str, ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_millis().saturating_add(ttl_ms);
        let key = key.to_string();
        let payload = payload.to_string();

        self.run(move |conn| async move {
            conn.execute(
                "INSERT INTO cache (key, payload, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   payload = excluded.payload,
                   expires_at = excluded.expires_at",
                params![key.as_str(), payload.as_str(), expires_at],
            )
            .await
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    /// Remove `key` if present.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.run(move |conn| async move {
            conn.execute("DELETE FROM cache WHERE key = ?1", params![key.as_str()])
                .await
                .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    /// Delete every expired row. Returns the number of rows removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.run(|conn| async move {
            let removed = conn
                .execute(
                    "DELETE FROM cache WHERE expires_at < ?1",
                    params![now_millis()],
                )
                .await
                .map_err(storage_err)?;
            Ok(removed)
        })
        .await
    }

    /// Number of stored rows, live or expired.
    pub async fn len(&self) -> Result<u64> {
        self.run(|conn| async move {
            let mut rows = conn
                .query("SELECT COUNT(*) FROM cache", params![])
                .await
                .map_err(storage_err)?;
            match rows.next().await.map_err(storage_err)? {
                Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
                None => Ok(0),
            }
        })
        .await
    }

    /// Whether the store holds no rows.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Get the current schema version, or 0 if no migrations have been applied.
async fn schema_version(conn: &Connection) -> u32 {
    let result = conn
        .query("SELECT MAX(version) FROM schema_migrations", params![])
        .await;

    match result {
        Ok(mut rows) => {
            if let Ok(Some(row)) = rows.next().await {
                row.get::<u32>(0).unwrap_or(0)
            } else {
                0
            }
        }
        Err(_) => 0, // Table doesn't exist yet
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| LeadscoutError::Storage(format!("invalid expires_at: {ms}")))
}

fn storage_err(e: libsql::Error) -> LeadscoutError {
    LeadscoutError::Storage(e.to_string())
}
