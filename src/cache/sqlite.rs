//! SQLite 响应缓存：表 response_cache(key, value, created_at)
//!
//! value 为 CacheEntry 的 JSON；读时发现过期则删除该行并返回未命中。同步连接放在 spawn_blocking 中使用。

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::cache::{CacheEntry, CacheError, ResponseCache};

pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
    ttl: Duration,
}

fn backend_err(e: impl std::fmt::Display) -> CacheError {
    CacheError::Backend(e.to_string())
}

impl SqliteCache {
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, CacheError> {
        let conn = Connection::open(path.as_ref()).map_err(backend_err)?;
        Self::with_connection(conn, ttl)
    }

    pub fn open_in_memory(ttl: Duration) -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(backend_err)?;
        Self::with_connection(conn, ttl)
    }

    fn with_connection(conn: Connection, ttl: Duration) -> Result<Self, CacheError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS response_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(backend_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl,
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| backend_err("connection mutex poisoned"))?;
            f(&guard)
        })
        .await
        .map_err(backend_err)?
    }

    #[cfg(test)]
    pub(crate) async fn set_created_at(&self, key: &str, created_at: i64) -> Result<(), CacheError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE response_cache SET created_at = ?1 WHERE key = ?2",
                params![created_at, key],
            )
            .map_err(backend_err)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ResponseCache for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let key = key.to_string();
        let ttl_secs = self.ttl.as_secs() as i64;
        let now = chrono::Utc::now().timestamp();

        let row = self
            .with_conn(move |conn| {
                let row: Option<(String, i64)> = conn
                    .query_row(
                        "SELECT value, created_at FROM response_cache WHERE key = ?1",
                        params![key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()
                    .map_err(backend_err)?;
                match row {
                    Some((_, created_at)) if now - created_at >= ttl_secs => {
                        conn.execute("DELETE FROM response_cache WHERE key = ?1", params![key])
                            .map_err(backend_err)?;
                        tracing::debug!("[Cache] expired sqlite entry removed");
                        Ok(None)
                    }
                    Some((value, _)) => Ok(Some(value)),
                    None => Ok(None),
                }
            })
            .await?;

        match row {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let key = key.to_string();
        let value = serde_json::to_string(entry)?;
        let now = chrono::Utc::now().timestamp();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO response_cache (key, value, created_at) VALUES (?1, ?2, ?3)",
                params![key, value, now],
            )
            .map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
