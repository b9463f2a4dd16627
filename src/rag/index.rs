//! In-memory exact k-NN over L2-normalized rows.

use std::path::Path;

use ndarray::{Array1, Array2};

use super::store::{IndexMeta, IndexStore};
use super::{IndexError, RetrievedChunk};
use crate::ingest::DocumentChunk;

/// Immutable after construction; shared behind an `Arc` at serve time.
#[derive(Debug)]
pub struct VectorIndex {
    chunks: Vec<DocumentChunk>,
    /// One normalized embedding per row, in chunk order.
    matrix: Array2<f32>,
    model_id: String,
    built_at: Option<String>,
}

impl VectorIndex {
    pub fn empty(model_id: impl Into<String>) -> Self {
        Self {
            chunks: Vec::new(),
            matrix: Array2::zeros((0, 0)),
            model_id: model_id.into(),
            built_at: None,
        }
    }

    pub fn from_entries(
        entries: Vec<(DocumentChunk, Vec<f32>)>,
        model_id: impl Into<String>,
    ) -> Result<Self, IndexError> {
        let dimension = entries.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut chunks = Vec::with_capacity(entries.len());
        let mut flat = Vec::with_capacity(entries.len() * dimension);

        for (chunk, vector) in entries {
            if vector.len() != dimension {
                return Err(IndexError::Corrupt(format!(
                    "chunk {} has dimension {}, expected {}",
                    chunk.id,
                    vector.len(),
                    dimension
                )));
            }
            flat.extend(normalized(&vector));
            chunks.push(chunk);
        }

        let matrix = Array2::from_shape_vec((chunks.len(), dimension), flat)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;

        Ok(Self {
            chunks,
            matrix,
            model_id: model_id.into(),
            built_at: None,
        })
    }

    /// Loads the persisted index, refusing one built with another embedder.
    pub async fn load(db_path: &Path, expected_model: &str) -> Result<Self, IndexError> {
        let store = IndexStore::open(db_path).await?;
        let meta = store.read_meta().await?;
        if meta.embedding_model != expected_model {
            store.close().await;
            return Err(IndexError::ModelMismatch {
                found: meta.embedding_model,
                expected: expected_model.to_string(),
            });
        }

        let entries = store.read_all().await?;
        store.close().await;
        check_meta(&meta, &entries)?;

        let mut index = Self::from_entries(entries, meta.embedding_model)?;
        index.built_at = Some(meta.built_at);
        tracing::info!(
            "Loaded vector index with {} chunks (dimension {})",
            index.len(),
            index.dimension()
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn built_at(&self) -> Option<&str> {
        self.built_at.as_deref()
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    /// Top `k` chunks by cosine similarity, best first. Equal scores keep
    /// insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension() {
            return Err(IndexError::Corrupt(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.dimension()
            )));
        }

        let query = Array1::from_vec(normalized(query));
        let scores = self.matrix.dot(&query);

        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        // stable sort keeps insertion order among equal scores
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(row, score)| RetrievedChunk {
                chunk: self.chunks[row].clone(),
                score,
            })
            .collect())
    }
}

fn check_meta(meta: &IndexMeta, entries: &[(DocumentChunk, Vec<f32>)]) -> Result<(), IndexError> {
    if meta.chunk_count != entries.len() {
        return Err(IndexError::Corrupt(format!(
            "metadata lists {} chunks but {} are stored",
            meta.chunk_count,
            entries.len()
        )));
    }
    if let Some((_, vector)) = entries.first() {
        if vector.len() != meta.dimension {
            return Err(IndexError::Corrupt(format!(
                "metadata dimension {} does not match stored vectors ({})",
                meta.dimension,
                vector.len()
            )));
        }
    }
    Ok(())
}

fn normalized(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}
