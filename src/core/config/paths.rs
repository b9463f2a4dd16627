use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    /// Directory scanned for source PDFs.
    pub data_dir: PathBuf,
    /// Directory holding the persisted vector index.
    pub index_dir: PathBuf,
    pub log_dir: PathBuf,
    pub eval_dir: PathBuf,
    /// Downloaded local embedding models.
    pub model_cache_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let data_dir = discover_data_dir(&project_root);
        Self::with_data_dir(project_root, data_dir)
    }

    /// Lays out every derived directory under `data_dir`.
    pub fn with_data_dir(project_root: PathBuf, data_dir: PathBuf) -> Self {
        let index_dir = data_dir.join("index");
        let log_dir = project_root.join("logs");
        let eval_dir = project_root.join("evaluation_results");
        let model_cache_dir = env::var("ASSISTANT_MODEL_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| project_root.join(".fastembed_cache"));

        let _ = fs::create_dir_all(&log_dir);

        AppPaths {
            project_root,
            data_dir,
            index_dir,
            log_dir,
            eval_dir,
            model_cache_dir,
        }
    }

    pub fn override_data_dir(mut self, data_dir: PathBuf) -> Self {
        if self.index_dir == self.data_dir.join("index") {
            self.index_dir = data_dir.join("index");
        }
        self.data_dir = data_dir;
        self
    }

    pub fn override_index_dir(mut self, index_dir: PathBuf) -> Self {
        self.index_dir = index_dir;
        self
    }

    pub fn index_db_path(&self) -> PathBuf {
        self.index_dir.join("index.db")
    }

    pub fn processed_dump_path(&self) -> PathBuf {
        self.index_dir.join("processed_documents.txt")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("ASSISTANT_ROOT") {
        return PathBuf::from(root);
    }

    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn discover_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = env::var("ASSISTANT_DATA_DIR") {
        return PathBuf::from(dir);
    }

    project_root.join("data")
}
