use parking_lot::RwLock;
use std::path::Path;

use localrag_core::config::DistanceMetric;
use localrag_core::error::{Error, Result};
use localrag_core::types::{Chunk, QueryResult, SearchOutcome};

use crate::metric::score;
use crate::store::{self, IndexManifest, FORMAT_VERSION, MANIFEST_FILE};

/// Flat in-memory vector index. Every chunk shares the dimensionality fixed
/// at construction; search scores all of them.
pub struct VectorIndex {
    model_id: String,
    dim: usize,
    metric: DistanceMetric,
    chunks: RwLock<Vec<Chunk>>,
}

impl VectorIndex {
    pub fn new(model_id: impl Into<String>, dim: usize, metric: DistanceMetric) -> Result<Self> {
        if dim == 0 {
            return Err(Error::Validation("index dimension must be greater than zero".into()));
        }
        Ok(Self { model_id: model_id.into(), dim, metric, chunks: RwLock::new(Vec::new()) })
    }

    pub fn model_id(&self) -> &str { &self.model_id }
    pub fn dim(&self) -> usize { self.dim }
    pub fn metric(&self) -> DistanceMetric { self.metric }
    pub fn len(&self) -> usize { self.chunks.read().len() }
    pub fn is_empty(&self) -> bool { self.chunks.read().is_empty() }

    /// Append chunks. The whole batch is rejected if any vector has the wrong size.
    pub fn add(&self, chunks: Vec<Chunk>) -> Result<usize> {
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != self.dim) {
            return Err(Error::Validation(format!(
                "chunk {} has {} dims, index expects {}",
                bad.id,
                bad.embedding.len(),
                self.dim
            )));
        }
        let added = chunks.len();
        let mut guard = self.chunks.write();
        guard.extend(chunks);
        tracing::debug!(added, total = guard.len(), "chunks added to index");
        Ok(added)
    }

    /// Top-`k` chunks scoring at least `threshold`, best first. Ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize, threshold: f32) -> Result<SearchOutcome> {
        if k == 0 {
            return Err(Error::Validation("k must be greater than zero".into()));
        }
        if query.len() != self.dim {
            return Err(Error::Validation(format!("query has {} dims, index expects {}", query.len(), self.dim)));
        }
        let guard = self.chunks.read();
        let mut hits: Vec<(usize, f32)> = guard
            .iter()
            .enumerate()
            .map(|(i, c)| (i, score(self.metric, query, &c.embedding)))
            .filter(|(_, s)| *s >= threshold)
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(k);
        let results = hits
            .into_iter()
            .map(|(i, s)| QueryResult { chunk: guard[i].clone(), score: s })
            .collect();
        Ok(SearchOutcome::from_results(results))
    }

    pub fn clear(&self) {
        let mut guard = self.chunks.write();
        if !guard.is_empty() {
            tracing::info!(dropped = guard.len(), "index cleared");
        }
        guard.clear();
    }

    pub fn manifest(&self) -> IndexManifest {
        IndexManifest {
            embedding_model: self.model_id.clone(),
            dim: self.dim,
            metric: self.metric,
            chunk_count: self.len(),
            format_version: FORMAT_VERSION,
        }
    }

    /// Persist into `dir` (created if missing): the Lance chunk table plus `index.json`.
    pub async fn save(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        let snapshot: Vec<Chunk> = self.chunks.read().clone();
        store::write_chunks(dir, &snapshot, self.dim).await.map_err(Error::operation)?;
        let manifest = IndexManifest { chunk_count: snapshot.len(), ..self.manifest() };
        store::write_manifest(dir, &manifest).await.map_err(Error::operation)?;
        tracing::info!(dir = %dir.display(), chunks = manifest.chunk_count, "index saved");
        Ok(())
    }

    pub async fn load(dir: &Path) -> Result<Self> {
        if !dir.join(MANIFEST_FILE).is_file() {
            return Err(Error::NotFound(format!("no saved index at {}", dir.display())));
        }
        let manifest = store::read_manifest(dir).await.map_err(Error::operation)?;
        if manifest.format_version > FORMAT_VERSION {
            return Err(Error::InvalidConfig(format!(
                "index format {} is newer than supported {}",
                manifest.format_version, FORMAT_VERSION
            )));
        }
        let index = Self::new(manifest.embedding_model.clone(), manifest.dim, manifest.metric)?;
        let rows = store::read_chunks(dir, manifest.dim).await.map_err(Error::operation)?;
        if rows.len() != manifest.chunk_count {
            tracing::warn!(expected = manifest.chunk_count, found = rows.len(), "chunk count differs from manifest");
        }
        index.add(rows.into_iter().map(|(_, c)| c).collect())?;
        tracing::info!(dir = %dir.display(), chunks = index.len(), model = %index.model_id, "index loaded");
        Ok(index)
    }

    /// `load`, then insist the saved vectors came from `model_id` with `dim` dimensions.
    pub async fn load_compatible(dir: &Path, model_id: &str, dim: usize) -> Result<Self> {
        let index = Self::load(dir).await?;
        if index.model_id != model_id || index.dim != dim {
            return Err(Error::InvalidConfig(format!(
                "saved index was built with {} ({} dims); embedder is {} ({} dims)",
                index.model_id, index.dim, model_id, dim
            )));
        }
        Ok(index)
    }
}
