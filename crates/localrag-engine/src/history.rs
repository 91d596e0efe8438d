use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use localrag_core::config::{DistanceMetric, HistorySettings};
use localrag_core::error::{Error, Result};
use localrag_core::traits::Embedder;
use localrag_core::types::{ChatRole, Chunk, ChunkMeta};
use localrag_vector::VectorIndex;

const HISTORY_FILE: &str = "history.json";
const TURN_SOURCE: &str = "history";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

struct HeldTurn {
    seq: usize,
    turn: Turn,
    embedding: Vec<f32>,
}

#[derive(Default)]
struct Turns {
    held: VecDeque<HeldTurn>,
    next_seq: usize,
}

/// Bounded per-session turn history with similarity recall.
///
/// Turns live in a deque capped at `max_history`; a flat [`VectorIndex`]
/// mirrors the deque so recall only ever sees turns still held.
pub struct MessageHistory {
    embedder: Arc<dyn Embedder>,
    settings: HistorySettings,
    turns: Mutex<Turns>,
    index: VectorIndex,
}

impl MessageHistory {
    pub fn new(embedder: Arc<dyn Embedder>, settings: HistorySettings) -> Result<Self> {
        settings.validate()?;
        let index = VectorIndex::new(embedder.model_id(), embedder.dim(), DistanceMetric::Cosine)?;
        Ok(Self { embedder, settings, turns: Mutex::new(Turns::default()), index })
    }

    pub fn settings(&self) -> &HistorySettings { &self.settings }
    pub fn len(&self) -> usize { self.turns.lock().held.len() }
    pub fn is_empty(&self) -> bool { self.turns.lock().held.is_empty() }

    pub fn add_message(&self, role: ChatRole, content: impl Into<String>) -> Result<()> {
        self.push(Turn { role, content: content.into(), timestamp: Utc::now() })
    }

    fn push(&self, turn: Turn) -> Result<()> {
        let embedding = self.embedder.embed_one(&turn.content).map_err(Error::retrieval)?;
        let mut turns = self.turns.lock();
        let seq = turns.next_seq;
        turns.next_seq += 1;
        turns.held.push_back(HeldTurn { seq, turn, embedding });
        let mut evicted = false;
        while turns.held.len() > self.settings.max_history {
            turns.held.pop_front();
            evicted = true;
        }
        if evicted {
            self.index.clear();
            self.index.add(turns.held.iter().map(as_chunk).collect())?;
        } else if let Some(held) = turns.held.back() {
            self.index.add(vec![as_chunk(held)])?;
        }
        tracing::debug!(held = turns.held.len(), evicted, "turn recorded");
        Ok(())
    }

    /// Held turns similar to `query`, oldest first.
    pub fn get_relevant_history(&self, query: &str, k: usize) -> Result<Vec<Turn>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed_one(query).map_err(Error::retrieval)?;
        self.relevant_to(&query, k)
    }

    /// Like [`get_relevant_history`](Self::get_relevant_history) for an already embedded query.
    pub fn relevant_to(&self, query: &[f32], k: usize) -> Result<Vec<Turn>> {
        let turns = self.turns.lock();
        let k = k.min(turns.held.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut seqs: Vec<usize> = self
            .index
            .search(query, k, self.settings.similarity_threshold)?
            .into_results()
            .into_iter()
            .map(|r| r.chunk.metadata.chunk_index)
            .collect();
        seqs.sort_unstable();
        Ok(turns.held.iter().filter(|h| seqs.binary_search(&h.seq).is_ok()).map(|h| h.turn.clone()).collect())
    }

    pub fn get_recent_history(&self, n: usize) -> Vec<Turn> {
        let turns = self.turns.lock();
        let skip = turns.held.len().saturating_sub(n);
        turns.held.iter().skip(skip).map(|h| h.turn.clone()).collect()
    }

    pub fn clear(&self) {
        let mut turns = self.turns.lock();
        turns.held.clear();
        self.index.clear();
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        let turns = self.get_recent_history(self.settings.max_history);
        tokio::fs::write(dir.join(HISTORY_FILE), serde_json::to_vec_pretty(&turns)?).await?;
        tracing::debug!(dir = %dir.display(), turns = turns.len(), "history saved");
        Ok(())
    }

    /// Rebuild from `dir/history.json`, re-embedding every turn with `embedder`.
    pub async fn load(dir: &Path, embedder: Arc<dyn Embedder>, settings: HistorySettings) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("no saved history at {}", dir.display())));
        }
        let history = Self::new(embedder, settings)?;
        let turns: Vec<Turn> = match tokio::fs::read(dir.join(HISTORY_FILE)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        for turn in turns {
            history.push(turn)?;
        }
        Ok(history)
    }
}

fn as_chunk(held: &HeldTurn) -> Chunk {
    Chunk {
        id: format!("{}:{}", TURN_SOURCE, held.seq),
        content: held.turn.content.clone(),
        embedding: held.embedding.clone(),
        metadata: ChunkMeta { source: TURN_SOURCE.to_string(), chunk_index: held.seq, start_offset: 0 },
    }
}
