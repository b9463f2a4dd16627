use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use super::store::{IndexMeta, IndexStore};
use super::IndexError;
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;
use crate::embedding::Embedder;
use crate::ingest::DocumentChunk;

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub chunk_count: usize,
    pub dimension: usize,
    pub embedding_model: String,
    pub db_path: PathBuf,
    pub dump_path: PathBuf,
}

/// Embeds chunks and writes a fresh index, replacing the previous one.
pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    db_path: PathBuf,
    dump_path: PathBuf,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, paths: &AppPaths, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
            db_path: paths.index_db_path(),
            dump_path: paths.processed_dump_path(),
        }
    }

    pub async fn build(&self, chunks: Vec<DocumentChunk>) -> Result<BuildReport, ApiError> {
        let mut entries = Vec::with_capacity(chunks.len());
        let total_batches = chunks.len().div_ceil(self.batch_size);

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(ApiError::Upstream(format!(
                    "Embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            tracing::debug!("Embedded batch {}/{}", batch_no + 1, total_batches);
            entries.extend(batch.iter().cloned().zip(vectors));
        }

        let dimension = entries.first().map(|(_, v)| v.len()).unwrap_or(0);
        if let Some((chunk, _)) = entries.iter().find(|(_, v)| v.len() != dimension) {
            return Err(ApiError::Upstream(format!(
                "Embedder returned inconsistent dimensions (chunk {})",
                chunk.id
            )));
        }

        let meta = IndexMeta {
            embedding_model: self.embedder.model_id(),
            dimension,
            chunk_count: entries.len(),
            built_at: Utc::now().to_rfc3339(),
        };

        if let Some(parent) = self.db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ApiError::internal)?;
        }

        // written aside and renamed so a failed build leaves the old index intact
        let staging = self.db_path.with_extension("db.building");
        let store = IndexStore::create(&staging).await.map_err(index_error)?;
        store.write_all(&entries, &meta).await.map_err(index_error)?;
        store.close().await;
        tokio::fs::rename(&staging, &self.db_path)
            .await
            .map_err(ApiError::internal)?;

        tokio::fs::write(&self.dump_path, render_dump(&entries))
            .await
            .map_err(ApiError::internal)?;

        tracing::info!(
            "Index written to {} ({} chunks, model {})",
            self.db_path.display(),
            meta.chunk_count,
            meta.embedding_model
        );

        Ok(BuildReport {
            chunk_count: meta.chunk_count,
            dimension,
            embedding_model: meta.embedding_model,
            db_path: self.db_path.clone(),
            dump_path: self.dump_path.clone(),
        })
    }
}

fn index_error(err: IndexError) -> ApiError {
    ApiError::Internal(err.to_string())
}

fn render_dump(entries: &[(DocumentChunk, Vec<f32>)]) -> String {
    let mut out = String::new();
    for (chunk, _) in entries {
        let _ = writeln!(
            out,
            "=== {} | source: {} | page: {} | chunk: {} | offset: {} ===",
            chunk.id, chunk.source_file, chunk.page, chunk.chunk_index, chunk.start_offset
        );
        let _ = writeln!(out, "{}\n", chunk.text);
    }
    out
}
