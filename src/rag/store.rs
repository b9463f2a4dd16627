//! SQLite file holding every chunk, its embedding and the index metadata.
//!
//! Embeddings are stored as little-endian `f32` blobs. Rows keep their
//! insertion order through SQLite's `rowid`, which is what the in-memory
//! index uses to break score ties.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use super::IndexError;
use crate::ingest::DocumentChunk;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub built_at: String,
}

pub struct IndexStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl IndexStore {
    /// Creates a fresh, empty database at `db_path`, replacing any file there.
    pub async fn create(db_path: &Path) -> Result<Self, IndexError> {
        if db_path.exists() {
            tokio::fs::remove_file(db_path)
                .await
                .map_err(|e| IndexError::Storage(e.to_string()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(storage)?;

        let store = Self {
            pool,
            db_path: db_path.to_path_buf(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Opens an existing database read-only.
    pub async fn open(db_path: &Path) -> Result<Self, IndexError> {
        if !db_path.is_file() {
            return Err(IndexError::Missing(db_path.to_path_buf()));
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(storage)?;

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), IndexError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT NOT NULL UNIQUE,
                source_file TEXT NOT NULL,
                page INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    /// Writes every entry and the metadata in a single transaction.
    pub async fn write_all(
        &self,
        entries: &[(DocumentChunk, Vec<f32>)],
        meta: &IndexMeta,
    ) -> Result<(), IndexError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        for (chunk, embedding) in entries {
            sqlx::query(
                "INSERT INTO chunks (chunk_id, source_file, page, start_offset, chunk_index, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&chunk.id)
            .bind(&chunk.source_file)
            .bind(chunk.page as i64)
            .bind(chunk.start_offset as i64)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.text)
            .bind(serialize_embedding(embedding))
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        let meta_rows = [
            ("embedding_model", meta.embedding_model.clone()),
            ("dimension", meta.dimension.to_string()),
            ("chunk_count", meta.chunk_count.to_string()),
            ("built_at", meta.built_at.clone()),
        ];
        for (key, value) in meta_rows {
            sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    pub async fn read_meta(&self) -> Result<IndexMeta, IndexError> {
        let rows = sqlx::query("SELECT key, value FROM index_meta")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        let lookup = |name: &str| -> Result<String, IndexError> {
            rows.iter()
                .find(|row| row.get::<String, _>("key") == name)
                .map(|row| row.get::<String, _>("value"))
                .ok_or_else(|| IndexError::Corrupt(format!("missing '{}' metadata", name)))
        };

        Ok(IndexMeta {
            embedding_model: lookup("embedding_model")?,
            dimension: parse_meta("dimension", &lookup("dimension")?)?,
            chunk_count: parse_meta("chunk_count", &lookup("chunk_count")?)?,
            built_at: lookup("built_at")?,
        })
    }

    /// Every chunk with its embedding, in insertion order.
    pub async fn read_all(&self) -> Result<Vec<(DocumentChunk, Vec<f32>)>, IndexError> {
        let rows = sqlx::query(
            "SELECT chunk_id, source_file, page, start_offset, chunk_index, content, embedding
             FROM chunks
             ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows
            .iter()
            .map(|row| {
                let chunk = DocumentChunk {
                    id: row.get("chunk_id"),
                    source_file: row.get("source_file"),
                    page: row.get::<i64, _>("page") as usize,
                    start_offset: row.get::<i64, _>("start_offset") as usize,
                    chunk_index: row.get::<i64, _>("chunk_index") as usize,
                    text: row.get("content"),
                };
                let blob: Vec<u8> = row.get("embedding");
                (chunk, deserialize_embedding(&blob))
            })
            .collect())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn storage(err: sqlx::Error) -> IndexError {
    IndexError::Storage(err.to_string())
}

fn parse_meta<T: FromStr>(name: &str, value: &str) -> Result<T, IndexError> {
    value
        .parse()
        .map_err(|_| IndexError::Corrupt(format!("invalid '{}' metadata: {}", name, value)))
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> DocumentChunk {
        DocumentChunk {
            id: id.to_string(),
            source_file: "guide.pdf".to_string(),
            page: 1,
            start_offset: 0,
            chunk_index: 0,
            text: text.to_string(),
        }
    }

    fn meta(count: usize) -> IndexMeta {
        IndexMeta {
            embedding_model: "hashing-3".to_string(),
            dimension: 3,
            chunk_count: count,
            built_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn write_then_read_preserves_order_and_vectors() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("index.db");

        let store = IndexStore::create(&db_path).await.unwrap();
        let entries = vec![
            (chunk("z#p1-0", "last id, first row"), vec![1.0, 0.0, -0.5]),
            (chunk("a#p1-0", "first id, second row"), vec![0.25, 0.5, 0.75]),
        ];
        store.write_all(&entries, &meta(2)).await.unwrap();
        store.close().await;

        let store = IndexStore::open(&db_path).await.unwrap();
        assert_eq!(store.read_meta().await.unwrap(), meta(2));
        let read = store.read_all().await.unwrap();
        assert_eq!(read, entries);
    }

    #[tokio::test]
    async fn create_replaces_previous_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("index.db");

        let store = IndexStore::create(&db_path).await.unwrap();
        store
            .write_all(&[(chunk("old#p1-0", "old"), vec![1.0, 0.0, 0.0])], &meta(1))
            .await
            .unwrap();
        store.close().await;

        let store = IndexStore::create(&db_path).await.unwrap();
        store.write_all(&[], &meta(0)).await.unwrap();
        store.close().await;

        let store = IndexStore::open(&db_path).await.unwrap();
        assert!(store.read_all().await.unwrap().is_empty());
        assert_eq!(store.read_meta().await.unwrap().chunk_count, 0);
    }

    #[tokio::test]
    async fn open_reports_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let result = IndexStore::open(&tmp.path().join("absent.db")).await;
        assert!(matches!(result, Err(IndexError::Missing(_))));
    }
}
