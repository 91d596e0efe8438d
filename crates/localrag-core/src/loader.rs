use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::Document;

/// Reads every `.txt` file under a directory into a `Document`.
/// The document source is the file's path relative to the root.
#[derive(Debug, Default, Clone)]
pub struct DocumentLoader {
    limit: Option<usize>,
}

impl DocumentLoader {
    pub fn new() -> Self { Self::default() }

    /// Only load the first `limit` files (sorted by path).
    pub fn with_limit(limit: usize) -> Self { Self { limit: Some(limit) } }

    pub fn load_directory(&self, root: &Path) -> Result<Vec<Document>> {
        if !root.is_dir() {
            return Err(Error::NotFound(format!("data directory {}", root.display())));
        }
        let mut files = list_txt_files(root);
        if files.is_empty() {
            tracing::warn!(dir = %root.display(), "no .txt files found");
            return Ok(vec![]);
        }
        if let Some(limit) = self.limit {
            if files.len() > limit {
                files.truncate(limit);
                tracing::info!(limit, "limited to first files");
            }
        }

        let mut docs = Vec::with_capacity(files.len());
        for (i, path) in files.iter().enumerate() {
            tracing::debug!(file = %path.display(), "reading {}/{}", i + 1, files.len());
            let content = read_file_content(path)?;
            docs.push(Document::new(content, source_name(path, root)));
        }
        tracing::info!(files = docs.len(), dir = %root.display(), "loaded documents");
        Ok(docs)
    }
}

fn read_file_content(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(path)?).to_string()),
    }
}

fn source_name(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("txt"))
        .map(|e| e.path().to_path_buf())
        .collect();
    txt_files.sort();
    txt_files
}
