//! Record Store: durable per-source persistence of raw ingested items.
//!
//! One SQLite table per source, keyed by the natural id. Writes are
//! insert-or-replace so re-ingestion overwrites (last write wins). Each store
//! owns its connection; concurrent writers open their own.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::PipelineError;
use crate::ingest::types::{RawItem, Source};

pub trait RecordStore {
    /// Insert or replace `item` keyed by its id.
    fn upsert(&self, item: &RawItem) -> Result<(), PipelineError>;
    fn exists(&self, source: Source, id: &str) -> Result<bool, PipelineError>;
    /// All stored items of `source`, oldest first (ties broken by id).
    fn load(&self, source: Source) -> Result<Vec<RawItem>, PipelineError>;
    fn count(&self, source: Source) -> Result<usize, PipelineError>;
}

pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "record store opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, PipelineError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PipelineError> {
        for source in Source::ALL {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    title TEXT,
                    author TEXT,
                    body TEXT,
                    description TEXT,
                    content TEXT,
                    published_at TEXT NOT NULL,
                    raw_json TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_published ON {table}(published_at);",
                table = source.table()
            ))?;
        }
        Ok(Self { conn })
    }

    fn write(&self, item: &RawItem) -> Result<(), PipelineError> {
        let raw = serde_json::to_string(&item.raw_payload)?;
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (id, title, author, body, description, content, published_at, raw_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                item.source.table()
            ),
            params![
                item.id,
                item.title,
                item.author,
                item.body,
                item.description,
                item.content,
                item.published_at.to_rfc3339(),
                raw,
            ],
        )?;
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore {
    fn upsert(&self, item: &RawItem) -> Result<(), PipelineError> {
        if item.id.trim().is_empty() {
            return Err(PipelineError::StorageWriteFailed {
                kind: item.source,
                id: item.id.clone(),
                reason: "empty id".to_string(),
            });
        }
        self.write(item)
            .map_err(|e| PipelineError::StorageWriteFailed {
                kind: item.source,
                id: item.id.clone(),
                reason: e.to_string(),
            })
    }

    fn exists(&self, source: Source, id: &str) -> Result<bool, PipelineError> {
        let hit: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ?1", source.table()),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    fn load(&self, source: Source) -> Result<Vec<RawItem>, PipelineError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, title, author, body, description, content, published_at, raw_json
             FROM {} ORDER BY published_at, id",
            source.table()
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, title, author, body, description, content, published, raw) = row?;
            let published_at = DateTime::parse_from_rfc3339(&published)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| PipelineError::Decode {
                    service: source.table().to_string(),
                    detail: format!("item {id}: bad published_at '{published}': {e}"),
                })?;
            out.push(RawItem {
                id,
                source,
                title,
                body,
                description,
                content,
                author,
                published_at,
                raw_payload: serde_json::from_str(&raw)?,
            });
        }
        Ok(out)
    }

    fn count(&self, source: Source) -> Result<usize, PipelineError> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", source.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as usize)
    }
}
