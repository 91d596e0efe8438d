//! Domain types shared by the index, the caches and the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

pub type ChunkId = String;

/// Durable user facts extracted from conversation turns (e.g. `name`).
pub type Facts = BTreeMap<String, String>;

/// Ingestion input. Consumed by the chunker, never stored whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub source: String,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self { content: content.into(), source: source.into() }
    }
}

/// Position of a chunk within its parent document.
///
/// - `source`: where the document came from (file name, URL, ...)
/// - `chunk_index`: ordinal of the chunk within the document
/// - `start_offset`: character offset of the chunk's first character
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    pub source: String,
    pub chunk_index: usize,
    pub start_offset: usize,
}

/// The unit of indexing and retrieval. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMeta,
}

/// A chunk paired with its normalized similarity score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub chunk: Chunk,
    pub score: f32,
}

/// Outcome of a similarity search. `Empty` is an ordinary answer, not a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(Vec<QueryResult>),
    Empty,
}

impl SearchOutcome {
    pub fn from_results(results: Vec<QueryResult>) -> Self {
        if results.is_empty() { Self::Empty } else { Self::Found(results) }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Found(results) => results.len(),
            Self::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool { matches!(self, Self::Empty) }

    pub fn into_results(self) -> Vec<QueryResult> {
        match self {
            Self::Found(results) => results,
            Self::Empty => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    NoResults,
    Error,
    Redirect,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub documents_retrieved: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_facts: Option<Facts>,
}

/// Answer to one question. This is both the wire shape and the cache payload;
/// a cache overwrite replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub question: String,
    pub answer: String,
    pub sources: Vec<String>,
    pub metadata: ResponseMetadata,
    pub confidence: f32,
    pub processing_time_ms: f64,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn is_success(&self) -> bool { self.status == ResponseStatus::Success }
}

/// Cumulative engine counters. Owned by one engine; reset on `clear()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_documents: u64,
    pub total_chunks: u64,
    pub total_queries: u64,
    pub cache_hits: u64,
    pub avg_response_time_ms: f64,
}

impl Stats {
    pub fn record_ingest(&mut self, documents: usize, chunks: usize) {
        self.total_documents += documents as u64;
        self.total_chunks += chunks as u64;
    }

    /// Count one computed query and fold its latency into the running mean.
    pub fn record_query(&mut self, elapsed_ms: f64) {
        self.total_queries += 1;
        let n = self.total_queries as f64;
        self.avg_response_time_ms = (self.avg_response_time_ms * (n - 1.0) + elapsed_ms) / n;
    }

    pub fn record_cache_hit(&mut self) { self.cache_hits += 1; }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self { Self { role: ChatRole::System, content: content.into() } }
    pub fn user(content: impl Into<String>) -> Self { Self { role: ChatRole::User, content: content.into() } }
}

pub const DEFAULT_K: usize = 3;
pub const DEFAULT_SESSION: &str = "default";

/// A validated question. Construction rejects `k == 0` and blank questions
/// so the query path itself never has to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQueryRequest", rename_all = "camelCase")]
pub struct QueryRequest {
    question: String,
    k: usize,
    include_sources: bool,
    session_id: String,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, k: usize) -> Result<Self> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(Error::Validation("question must not be blank".into()));
        }
        if k == 0 {
            return Err(Error::Validation("k must be greater than zero".into()));
        }
        Ok(Self { question, k, include_sources: true, session_id: DEFAULT_SESSION.to_string() })
    }

    pub fn with_sources(mut self, include_sources: bool) -> Self {
        self.include_sources = include_sources;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn question(&self) -> &str { &self.question }
    pub fn k(&self) -> usize { self.k }
    pub fn include_sources(&self) -> bool { self.include_sources }
    pub fn session_id(&self) -> &str { &self.session_id }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQueryRequest {
    question: String,
    #[serde(default = "default_k")]
    k: usize,
    #[serde(default = "default_include_sources")]
    include_sources: bool,
    #[serde(default)]
    session_id: Option<String>,
}

fn default_k() -> usize { DEFAULT_K }
fn default_include_sources() -> bool { true }

impl TryFrom<RawQueryRequest> for QueryRequest {
    type Error = Error;

    fn try_from(raw: RawQueryRequest) -> Result<Self> {
        let request = QueryRequest::new(raw.question, raw.k)?.with_sources(raw.include_sources);
        Ok(match raw.session_id {
            Some(session) => request.with_session(session),
            None => request,
        })
    }
}
