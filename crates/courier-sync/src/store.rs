use crate::entry::{EntryStatus, OfflineEntry};
use async_trait::async_trait;
use courier_core::{CourierError, CourierResult};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Durable key-value store for offline entries.
///
/// Implementations must preserve insertion order in [`OfflineStore::list`] and
/// [`OfflineStore::list_by_status`] — sync passes rely on it — and must
/// survive process restarts (the in-memory backend is for tests only).
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Persist a new entry.
    async fn put(&self, entry: &OfflineEntry) -> CourierResult<()>;

    /// Look up an entry by ID.
    async fn get(&self, id: Uuid) -> CourierResult<Option<OfflineEntry>>;

    /// Overwrite an existing entry.
    async fn update(&self, entry: &OfflineEntry) -> CourierResult<()>;

    /// Delete an entry. Returns whether it existed.
    async fn delete(&self, id: Uuid) -> CourierResult<bool>;

    /// All entries, in insertion order.
    async fn list(&self) -> CourierResult<Vec<OfflineEntry>>;

    /// Entries with the given status, in insertion order.
    async fn list_by_status(&self, status: EntryStatus) -> CourierResult<Vec<OfflineEntry>>;
}

/// In-memory store. Does not survive restarts; test and fallback use only.
#[derive(Default)]
pub struct MemoryOfflineStore {
    entries: RwLock<Vec<OfflineEntry>>,
}

impl MemoryOfflineStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfflineStore for MemoryOfflineStore {
    async fn put(&self, entry: &OfflineEntry) -> CourierResult<()> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.id == entry.id) {
            return Err(CourierError::Storage(format!(
                "entry {} already exists",
                entry.id
            )));
        }
        entries.push(entry.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CourierResult<Option<OfflineEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().find(|e| e.id == id).cloned())
    }

    async fn update(&self, entry: &OfflineEntry) -> CourierResult<()> {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(slot) => {
                *slot = entry.clone();
                Ok(())
            }
            None => Err(CourierError::Storage(format!(
                "entry {} not found for update",
                entry.id
            ))),
        }
    }

    async fn delete(&self, id: Uuid) -> CourierResult<bool> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() < before)
    }

    async fn list(&self) -> CourierResult<Vec<OfflineEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.clone())
    }

    async fn list_by_status(&self, status: EntryStatus) -> CourierResult<Vec<OfflineEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| e.status == status).cloned().collect())
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteOfflineStore;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use std::path::Path;
    use tokio::sync::Mutex;

    /// SQLite-backed store. Entries survive process restarts; insertion order
    /// is preserved via rowid.
    pub struct SqliteOfflineStore {
        conn: Mutex<rusqlite::Connection>,
    }

    impl SqliteOfflineStore {
        /// Open (or create) the database at `path` and run migrations.
        pub fn open(path: impl AsRef<Path>) -> CourierResult<Self> {
            let conn = rusqlite::Connection::open(path)
                .map_err(|e| CourierError::Storage(format!("failed to open database: {e}")))?;
            Self::migrate(&conn)?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        /// Open an in-memory database (tests).
        pub fn open_in_memory() -> CourierResult<Self> {
            let conn = rusqlite::Connection::open_in_memory()
                .map_err(|e| CourierError::Storage(format!("failed to open database: {e}")))?;
            Self::migrate(&conn)?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        fn migrate(conn: &rusqlite::Connection) -> CourierResult<()> {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS offline_entries (
                     id          TEXT PRIMARY KEY,
                     entry_type  TEXT NOT NULL,
                     payload     TEXT NOT NULL,
                     priority    TEXT NOT NULL,
                     status      TEXT NOT NULL,
                     retry_count INTEGER NOT NULL,
                     max_retries INTEGER NOT NULL,
                     created_at  TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_offline_entries_status
                     ON offline_entries (status);",
            )
            .map_err(|e| CourierError::Storage(format!("migration failed: {e}")))
        }

        fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<OfflineEntry> {
            fn bad_text<E: std::error::Error + Send + Sync + 'static>(
                err: E,
            ) -> rusqlite::Error {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            }

            let id: String = row.get("id")?;
            let entry_type: String = row.get("entry_type")?;
            let payload: String = row.get("payload")?;
            let priority: String = row.get("priority")?;
            let status: String = row.get("status")?;
            let retry_count: u32 = row.get("retry_count")?;
            let max_retries: u32 = row.get("max_retries")?;
            let created_at: String = row.get("created_at")?;

            Ok(OfflineEntry {
                id: Uuid::parse_str(&id).map_err(bad_text)?,
                entry_type,
                payload: serde_json::from_str(&payload).map_err(bad_text)?,
                priority: priority
                    .parse()
                    .map_err(|e: String| bad_text(std::io::Error::other(e)))?,
                status: status
                    .parse()
                    .map_err(|e: String| bad_text(std::io::Error::other(e)))?,
                retry_count,
                max_retries,
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map_err(bad_text)?
                    .with_timezone(&chrono::Utc),
            })
        }
    }

    #[async_trait]
    impl OfflineStore for SqliteOfflineStore {
        async fn put(&self, entry: &OfflineEntry) -> CourierResult<()> {
            let conn = self.conn.lock().await;
            conn.execute(
                "INSERT INTO offline_entries
                     (id, entry_type, payload, priority, status, retry_count, max_retries, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    entry.id.to_string(),
                    entry.entry_type,
                    entry.payload.to_string(),
                    entry.priority.to_string(),
                    entry.status.to_string(),
                    entry.retry_count,
                    entry.max_retries,
                    entry.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| CourierError::Storage(format!("insert failed: {e}")))?;
            Ok(())
        }

        async fn get(&self, id: Uuid) -> CourierResult<Option<OfflineEntry>> {
            let conn = self.conn.lock().await;
            let mut stmt = conn
                .prepare("SELECT * FROM offline_entries WHERE id = ?1")
                .map_err(|e| CourierError::Storage(e.to_string()))?;
            let mut rows = stmt
                .query_map(rusqlite::params![id.to_string()], Self::row_to_entry)
                .map_err(|e| CourierError::Storage(e.to_string()))?;
            match rows.next() {
                Some(row) => Ok(Some(
                    row.map_err(|e| CourierError::Storage(e.to_string()))?,
                )),
                None => Ok(None),
            }
        }

        async fn update(&self, entry: &OfflineEntry) -> CourierResult<()> {
            let conn = self.conn.lock().await;
            let changed = conn
                .execute(
                    "UPDATE offline_entries
                     SET entry_type = ?2, payload = ?3, priority = ?4, status = ?5,
                         retry_count = ?6, max_retries = ?7
                     WHERE id = ?1",
                    rusqlite::params![
                        entry.id.to_string(),
                        entry.entry_type,
                        entry.payload.to_string(),
                        entry.priority.to_string(),
                        entry.status.to_string(),
                        entry.retry_count,
                        entry.max_retries,
                    ],
                )
                .map_err(|e| CourierError::Storage(format!("update failed: {e}")))?;
            if changed == 0 {
                return Err(CourierError::Storage(format!(
                    "entry {} not found for update",
                    entry.id
                )));
            }
            Ok(())
        }

        async fn delete(&self, id: Uuid) -> CourierResult<bool> {
            let conn = self.conn.lock().await;
            let changed = conn
                .execute(
                    "DELETE FROM offline_entries WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(|e| CourierError::Storage(format!("delete failed: {e}")))?;
            Ok(changed > 0)
        }

        async fn list(&self) -> CourierResult<Vec<OfflineEntry>> {
            let conn = self.conn.lock().await;
            let mut stmt = conn
                .prepare("SELECT * FROM offline_entries ORDER BY rowid")
                .map_err(|e| CourierError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], Self::row_to_entry)
                .map_err(|e| CourierError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| CourierError::Storage(e.to_string()))
        }

        async fn list_by_status(&self, status: EntryStatus) -> CourierResult<Vec<OfflineEntry>> {
            let conn = self.conn.lock().await;
            let mut stmt = conn
                .prepare("SELECT * FROM offline_entries WHERE status = ?1 ORDER BY rowid")
                .map_err(|e| CourierError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![status.to_string()], Self::row_to_entry)
                .map_err(|e| CourierError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| CourierError::Storage(e.to_string()))
        }
    }
}
