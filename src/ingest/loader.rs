use std::path::{Path, PathBuf};

use crate::core::errors::ApiError;

use super::splitter::TextSplitter;
use super::{DocumentChunk, PageText};

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub pages: Vec<PageText>,
    pub files_loaded: usize,
    pub skipped: Vec<SkippedFile>,
    /// True when the directory did not exist and was created empty.
    pub created_dir: bool,
}

/// Reads every PDF in a directory and turns it into chunks.
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    splitter: TextSplitter,
}

impl DocumentLoader {
    pub fn new(splitter: TextSplitter) -> Self {
        Self { splitter }
    }

    pub fn splitter(&self) -> &TextSplitter {
        &self.splitter
    }

    /// Extracts page text from every `*.pdf` in `dir`, in file-name order.
    ///
    /// Unreadable files are recorded in [`LoadReport::skipped`] and the batch
    /// carries on.
    pub async fn load_pages(&self, dir: &Path) -> Result<LoadReport, ApiError> {
        let mut report = LoadReport::default();

        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                ApiError::Internal(format!(
                    "Failed to create document directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            tracing::warn!(
                "Document directory {} did not exist and was created; add PDF files to it",
                dir.display()
            );
            report.created_dir = true;
            return Ok(report);
        }

        for path in list_pdf_files(dir).await? {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());

            match extract_pages(path.clone()).await {
                Ok(pages) => {
                    tracing::info!("Loaded {} ({} pages)", file_name, pages.len());
                    report.files_loaded += 1;
                    report
                        .pages
                        .extend(pages.into_iter().enumerate().map(|(i, text)| PageText {
                            source_file: file_name.clone(),
                            page: i + 1,
                            text,
                        }));
                }
                Err(reason) => {
                    tracing::warn!("Skipping {}: {}", path.display(), reason);
                    report.skipped.push(SkippedFile { path, reason });
                }
            }
        }

        Ok(report)
    }

    pub async fn load_chunks(
        &self,
        dir: &Path,
    ) -> Result<(Vec<DocumentChunk>, LoadReport), ApiError> {
        let report = self.load_pages(dir).await?;
        let chunks = self.splitter.split_pages(&report.pages);
        tracing::info!(
            "Split {} pages from {} files into {} chunks",
            report.pages.len(),
            report.files_loaded,
            chunks.len()
        );
        Ok((chunks, report))
    }
}

async fn list_pdf_files(dir: &Path) -> Result<Vec<PathBuf>, ApiError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        ApiError::Internal(format!("Failed to read directory {}: {}", dir.display(), e))
    })?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(ApiError::internal)? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if is_pdf && path.is_file() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Runs the extractor on the blocking pool; a panic inside it surfaces as a
/// join error instead of taking the process down.
async fn extract_pages(path: PathBuf) -> Result<Vec<String>, String> {
    let joined =
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&path)).await;

    match joined {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(err)) => Err(format!("PDF extraction failed: {}", err)),
        Err(err) if err.is_panic() => Err("PDF extractor panicked".to_string()),
        Err(err) => Err(format!("PDF extraction task failed: {}", err)),
    }
}
