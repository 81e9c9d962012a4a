//! Document catalog and chat log on libsql
//!
//! A single connection is held behind an async mutex. That keeps `:memory:`
//! databases alive for the lifetime of the catalog and serializes chat-log
//! appends coming from concurrent requests.

use crate::types::{AppError, ChatRecord, Document, DocumentPage, KbStats, Pagination, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

/// Default number of documents per page.
pub const DEFAULT_PAGE_SIZE: u32 = 5;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 50;

/// Append-only sink for answered questions.
#[async_trait]
pub trait ChatLog: Send + Sync {
    async fn append_chat(&self, record: &ChatRecord) -> Result<()>;
}

pub struct CatalogDb {
    // keeps the database handle alive alongside its connection
    _db: Database,
    conn: Mutex<Connection>,
}

fn db_err(context: &str) -> impl Fn(libsql::Error) -> AppError + '_ {
    move |e| AppError::Database(format!("{}: {}", context, e))
}

impl CatalogDb {
    /// Open (or create) the catalog at `path`; `":memory:"` keeps it in RAM.
    pub async fn open(path: &str) -> Result<Self> {
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        AppError::Database(format!(
                            "Failed to create catalog directory {:?}: {}",
                            parent, e
                        ))
                    })?;
                }
            }
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(db_err("Failed to open catalog"))?;
        let conn = db.connect().map_err(db_err("Failed to get connection"))?;

        let catalog = Self {
            _db: db,
            conn: Mutex::new(conn),
        };
        catalog.initialize_schema().await?;

        Ok(catalog)
    }

    /// In-memory catalog, mostly for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::open(":memory:").await
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                storage_path TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                segment_count INTEGER NOT NULL,
                vector_count INTEGER NOT NULL,
                uploaded_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(db_err("Failed to create documents table"))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                mode TEXT NOT NULL,
                sources TEXT,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(db_err("Failed to create chat_history table"))?;

        Ok(())
    }

    // Document operations
    pub async fn add_document(&self, document: &Document) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO documents
                (id, display_name, storage_path, size_bytes, segment_count, vector_count, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                document.id.as_str(),
                document.display_name.as_str(),
                document.storage_path.as_str(),
                document.size_bytes as i64,
                document.segment_count as i64,
                document.vector_count as i64,
                document.uploaded_at.timestamp_millis(),
            ),
        )
        .await
        .map_err(db_err("Failed to add document"))?;

        debug!(document_id = %document.id, "Catalog record added");
        Ok(())
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock().await;

        let mut rows = conn
            .query(
                "SELECT id, display_name, storage_path, size_bytes, segment_count, vector_count, uploaded_at
                 FROM documents WHERE id = ?",
                [id],
            )
            .await
            .map_err(db_err("Failed to query document"))?;

        match rows.next().await.map_err(db_err("Failed to read row"))? {
            Some(row) => Ok(Some(document_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// List documents newest first. Out-of-range paging values fall back to defaults.
    pub async fn list_documents(&self, page: u32, page_size: u32) -> Result<DocumentPage> {
        let page = page.max(1);
        let page_size = if (1..=MAX_PAGE_SIZE).contains(&page_size) {
            page_size
        } else {
            DEFAULT_PAGE_SIZE
        };

        let conn = self.conn.lock().await;

        let total = query_count(&conn, "SELECT COUNT(*) FROM documents").await?;

        let offset = (page as i64 - 1) * page_size as i64;
        let mut rows = conn
            .query(
                "SELECT id, display_name, storage_path, size_bytes, segment_count, vector_count, uploaded_at
                 FROM documents ORDER BY uploaded_at DESC, rowid DESC LIMIT ? OFFSET ?",
                (page_size as i64, offset),
            )
            .await
            .map_err(db_err("Failed to list documents"))?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err("Failed to read row"))? {
            documents.push(document_from_row(&row)?);
        }

        let total_pages = total.div_ceil(page_size as u64);
        Ok(DocumentPage {
            documents,
            pagination: Pagination {
                page,
                page_size,
                total,
                total_pages,
                has_next: (page as u64) < total_pages,
                has_prev: page > 1,
            },
        })
    }

    /// Returns `true` when a row was removed.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let affected = conn
            .execute("DELETE FROM documents WHERE id = ?", [id])
            .await
            .map_err(db_err("Failed to delete document"))?;
        Ok(affected > 0)
    }

    pub async fn clear_documents(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM documents", ())
            .await
            .map_err(db_err("Failed to clear documents"))
    }

    pub async fn clear_chat_history(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM chat_history", ())
            .await
            .map_err(db_err("Failed to clear chat history"))
    }

    pub async fn stats(&self) -> Result<KbStats> {
        let conn = self.conn.lock().await;

        let mut rows = conn
            .query(
                "SELECT COUNT(*), COALESCE(SUM(segment_count), 0), COALESCE(SUM(vector_count), 0)
                 FROM documents",
                (),
            )
            .await
            .map_err(db_err("Failed to query stats"))?;

        let (total_documents, total_chunks, total_vectors) =
            match rows.next().await.map_err(db_err("Failed to read row"))? {
                Some(row) => (
                    get_u64(&row, 0)?,
                    get_u64(&row, 1)?,
                    get_u64(&row, 2)?,
                ),
                None => (0, 0, 0),
            };

        let total_chats = query_count(&conn, "SELECT COUNT(*) FROM chat_history").await?;

        Ok(KbStats {
            total_documents,
            total_chunks,
            total_vectors,
            total_chats,
            indexed_points: None,
        })
    }
}

#[async_trait]
impl ChatLog for CatalogDb {
    async fn append_chat(&self, record: &ChatRecord) -> Result<()> {
        let sources = serde_json::to_string(&record.sources)
            .map_err(|e| AppError::Internal(format!("Failed to encode sources: {}", e)))?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chat_history (question, answer, mode, sources, created_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                record.question.as_str(),
                record.answer.as_str(),
                record.mode.as_str(),
                sources,
                record.created_at.timestamp_millis(),
            ),
        )
        .await
        .map_err(db_err("Failed to append chat record"))?;

        Ok(())
    }
}

async fn query_count(conn: &Connection, sql: &str) -> Result<u64> {
    let mut rows = conn.query(sql, ()).await.map_err(db_err("Failed to count"))?;
    match rows.next().await.map_err(db_err("Failed to read row"))? {
        Some(row) => get_u64(&row, 0),
        None => Ok(0),
    }
}

fn get_u64(row: &libsql::Row, idx: i32) -> Result<u64> {
    let value: i64 = row.get(idx).map_err(db_err("Failed to read column"))?;
    Ok(value.max(0) as u64)
}

fn document_from_row(row: &libsql::Row) -> Result<Document> {
    let uploaded_ms: i64 = row.get(6).map_err(db_err("Failed to read column"))?;
    Ok(Document {
        id: row.get(0).map_err(db_err("Failed to read column"))?,
        display_name: row.get(1).map_err(db_err("Failed to read column"))?,
        storage_path: row.get(2).map_err(db_err("Failed to read column"))?,
        size_bytes: get_u64(row, 3)?,
        segment_count: get_u64(row, 4)? as usize,
        vector_count: get_u64(row, 5)? as usize,
        uploaded_at: DateTime::<Utc>::from_timestamp_millis(uploaded_ms).unwrap_or_default(),
    })
}
