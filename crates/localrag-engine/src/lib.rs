mod context;
mod history;
mod renderer;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use localrag_cache::{fingerprint, CacheSettingsExt, ConversationMemory, ResponseCache};
use localrag_core::chunker::{chunk_document, ChunkerConfig};
use localrag_core::config::EngineConfig;
use localrag_core::error::{Error, Result};
use localrag_core::traits::{Embedder, Generator, PassthroughRenderer, ResponseRenderer};
use localrag_core::types::{
    ChatMessage, ChatRole, Chunk, Document, Facts, QueryRequest, QueryResult, Response, ResponseMetadata, ResponseStatus,
    SearchOutcome, Stats,
};
use localrag_vector::VectorIndex;

pub use context::{build_context, build_user_message};
pub use history::{MessageHistory, Turn};
pub use renderer::RedirectRenderer;

const EMBED_BATCH: usize = 32;
const CONFIG_FILE: &str = "config.json";
const STATS_FILE: &str = "stats.json";
const INDEX_DIR: &str = "index";

pub const NO_RESULTS_ANSWER: &str = "I could not find information about that in the indexed documents.";
pub const ERROR_ANSWER: &str = "Sorry, something went wrong while answering your question. Please try again.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
}

#[derive(Default)]
struct EngineState {
    stats: Stats,
}

/// Chunk, embed and index documents; answer questions from them through a
/// cache, conversation memory and a generator.
pub struct RetrievalEngine {
    config: EngineConfig,
    chunker: ChunkerConfig,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    renderer: Arc<dyn ResponseRenderer>,
    index: VectorIndex,
    cache: ResponseCache,
    memory: ConversationMemory,
    histories: Mutex<HashMap<String, Arc<MessageHistory>>>,
    state: Mutex<EngineState>,
    ingest_lock: tokio::sync::Mutex<()>,
}

impl RetrievalEngine {
    pub fn initialize(config: EngineConfig, embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Result<Self> {
        config.validate()?;
        check_embedder(&config, embedder.as_ref())?;
        let index = VectorIndex::new(embedder.model_id(), embedder.dim(), config.metric)?;
        Self::assemble(config, embedder, generator, index, Stats::default())
    }

    fn assemble(
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        index: VectorIndex,
        stats: Stats,
    ) -> Result<Self> {
        let chunker = config.chunker()?;
        let backend = config.cache.build()?;
        tracing::info!(
            model = %config.embeddings_model,
            generator = generator.model_id(),
            chunk_size = chunker.size(),
            chunk_overlap = chunker.overlap(),
            chunks = index.len(),
            "retrieval engine initialized"
        );
        Ok(Self {
            chunker,
            embedder,
            generator,
            renderer: Arc::new(PassthroughRenderer),
            index,
            cache: ResponseCache::new(backend.clone()),
            memory: ConversationMemory::new(backend),
            histories: Mutex::new(HashMap::new()),
            state: Mutex::new(EngineState { stats }),
            ingest_lock: tokio::sync::Mutex::new(()),
            config,
        })
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ResponseRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &EngineConfig { &self.config }
    pub fn stats(&self) -> Stats { self.state.lock().stats.clone() }
    pub fn chunk_count(&self) -> usize { self.index.len() }
    pub fn memory(&self) -> &ConversationMemory { &self.memory }
    pub async fn ping_cache(&self) -> bool { self.cache.ping().await }

    /// Turn history of `session`, created empty on first use.
    pub fn history(&self, session: &str) -> Result<Arc<MessageHistory>> {
        let mut histories = self.histories.lock();
        if let Some(history) = histories.get(session) {
            return Ok(history.clone());
        }
        let history = Arc::new(MessageHistory::new(self.embedder.clone(), self.config.history.clone())?);
        histories.insert(session.to_string(), history.clone());
        Ok(history)
    }

    /// Run the embedder on the blocking pool; model inference does not yield.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let embedder = self.embedder.clone();
        let expected = texts.len();
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(Error::retrieval)?
            .map_err(Error::retrieval)?;
        if vectors.len() != expected {
            return Err(Error::retrieval(format!("embedder returned {} vectors for {} texts", vectors.len(), expected)));
        }
        Ok(vectors)
    }

    pub async fn add_documents(&self, docs: &[Document]) -> Result<IngestReport> {
        let _guard = self.ingest_lock.lock().await;
        let pieces: Vec<_> = docs.iter().flat_map(|d| chunk_document(d, &self.chunker)).collect();

        let mut chunks = Vec::with_capacity(pieces.len());
        for batch in pieces.chunks(EMBED_BATCH) {
            let vectors = self.embed(batch.iter().map(|p| p.content.clone()).collect()).await?;
            chunks.extend(batch.iter().zip(vectors).map(|(p, embedding)| Chunk {
                id: p.id(),
                content: p.content.clone(),
                embedding,
                metadata: p.metadata.clone(),
            }));
        }

        let report = IngestReport { documents: docs.len(), chunks: chunks.len() };
        self.index.add(chunks)?;
        self.state.lock().stats.record_ingest(report.documents, report.chunks);
        tracing::info!(documents = report.documents, chunks = report.chunks, total = self.index.len(), "documents indexed");
        Ok(report)
    }

    /// Answer a question. Never fails: problems come back as an `error` response.
    ///
    /// Cached answers are shared across sessions, so only answers built from
    /// documents alone are cached, always with their full source list.
    pub async fn query(&self, request: &QueryRequest) -> Response {
        let started = Instant::now();
        let facts = self.memory.observe(request.session_id(), request.question()).await;

        let fp = fingerprint(request.question());
        if let Some(mut cached) = self.cache.get(&fp).await {
            self.state.lock().stats.record_cache_hit();
            tracing::debug!(fingerprint = %fp, "cache hit");
            cached.metadata.user_facts = facts;
            return shape_sources(cached, request);
        }

        let (response, personal) = match self.answer(request, facts, started).await {
            Ok(answered) => answered,
            Err(e) => {
                tracing::error!(question = request.question(), error = %e, "query failed");
                (self.error_response(request, &e, started), false)
            }
        };
        let response = self.renderer.render(response);
        if response.is_success() {
            if personal {
                tracing::debug!(fingerprint = %fp, "session-specific answer; not cached");
            } else {
                self.cache.set(&fp, &response).await;
            }
            self.record_turns(request, &response.answer).await;
        }
        self.state.lock().stats.record_query(response.processing_time_ms);
        shape_sources(response, request)
    }

    /// The computed response, and whether its prompt carried session-specific context.
    async fn answer(&self, request: &QueryRequest, facts: Option<Facts>, started: Instant) -> Result<(Response, bool)> {
        let query_vec = self
            .embed(vec![request.question().to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::retrieval("embedder returned no vector"))?;
        let results = match self.index.search(&query_vec, request.k(), self.config.similarity_threshold)? {
            SearchOutcome::Found(results) => results,
            SearchOutcome::Empty => {
                tracing::debug!(question = request.question(), "no chunk above threshold");
                return Ok((self.no_results_response(request, facts, started), false));
            }
        };

        let earlier = self.history(request.session_id())?.relevant_to(&query_vec, self.config.history.relevant_k)?;
        let personal = facts.as_ref().is_some_and(|f| !f.is_empty()) || !earlier.is_empty();
        let messages = [
            ChatMessage::system(self.config.system_prompt.clone()),
            ChatMessage::user(build_user_message(request.question(), &build_context(facts.as_ref(), &earlier, &results))),
        ];
        let answer = self.generator.generate(&messages).await.map_err(Error::retrieval)?;

        let confidence = (results.len() as f32 / self.config.max_documents as f32).min(1.0);
        let response = Response {
            question: request.question().to_string(),
            answer,
            sources: unique_sources(&results),
            metadata: self.metadata(results.len(), facts),
            confidence,
            processing_time_ms: elapsed_ms(started),
            status: ResponseStatus::Success,
            error: None,
        };
        Ok((response, personal))
    }

    /// Remember the exchange in the session history. Failures only cost recall.
    async fn record_turns(&self, request: &QueryRequest, answer: &str) {
        let history = match self.history(request.session_id()) {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(session = request.session_id(), error = %e, "history unavailable");
                return;
            }
        };
        let (question, answer) = (request.question().to_string(), answer.to_string());
        let recorded = tokio::task::spawn_blocking(move || {
            history.add_message(ChatRole::User, question)?;
            history.add_message(ChatRole::Assistant, answer)
        })
        .await
        .map_err(Error::retrieval)
        .and_then(|r| r);
        if let Err(e) = recorded {
            tracing::warn!(session = request.session_id(), error = %e, "turns not recorded");
        }
    }

    fn metadata(&self, documents_retrieved: usize, user_facts: Option<Facts>) -> ResponseMetadata {
        ResponseMetadata {
            documents_retrieved,
            model_id: Some(self.generator.model_id().to_string()),
            embedding_model: Some(self.embedder.model_id().to_string()),
            user_facts,
        }
    }

    fn no_results_response(&self, request: &QueryRequest, facts: Option<Facts>, started: Instant) -> Response {
        Response {
            question: request.question().to_string(),
            answer: NO_RESULTS_ANSWER.to_string(),
            sources: Vec::new(),
            metadata: self.metadata(0, facts),
            confidence: 0.0,
            processing_time_ms: elapsed_ms(started),
            status: ResponseStatus::NoResults,
            error: None,
        }
    }

    fn error_response(&self, request: &QueryRequest, error: &Error, started: Instant) -> Response {
        Response {
            question: request.question().to_string(),
            answer: ERROR_ANSWER.to_string(),
            sources: Vec::new(),
            metadata: self.metadata(0, None),
            confidence: 0.0,
            processing_time_ms: elapsed_ms(started),
            status: ResponseStatus::Error,
            error: Some(error.to_string()),
        }
    }

    /// Drop indexed chunks, cached responses and counters. Conversation facts survive.
    pub async fn clear(&self) {
        let _guard = self.ingest_lock.lock().await;
        self.index.clear();
        self.cache.clear().await;
        self.state.lock().stats = Stats::default();
        tracing::info!("engine cleared");
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        let _guard = self.ingest_lock.lock().await;
        tokio::fs::create_dir_all(dir).await?;
        self.index.save(&dir.join(INDEX_DIR)).await?;
        tokio::fs::write(dir.join(CONFIG_FILE), serde_json::to_vec_pretty(&self.config)?).await?;
        self.write_stats(dir).await?;
        tracing::info!(dir = %dir.display(), chunks = self.index.len(), "engine saved");
        Ok(())
    }

    /// Rewrite only `stats.json` in an engine directory written by [`save`](Self::save).
    pub async fn save_stats(&self, dir: &Path) -> Result<()> {
        if !dir.join(CONFIG_FILE).is_file() {
            return Err(Error::NotFound(format!("no saved engine at {}", dir.display())));
        }
        self.write_stats(dir).await
    }

    async fn write_stats(&self, dir: &Path) -> Result<()> {
        let stats = self.stats();
        tokio::fs::write(dir.join(STATS_FILE), serde_json::to_vec_pretty(&stats)?).await?;
        Ok(())
    }

    pub async fn load(dir: &Path, embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.is_file() {
            return Err(Error::NotFound(format!("no saved engine at {}", dir.display())));
        }
        let config: EngineConfig = serde_json::from_slice(&tokio::fs::read(&config_path).await?)?;
        config.validate()?;
        check_embedder(&config, embedder.as_ref())?;
        let index = VectorIndex::load_compatible(&dir.join(INDEX_DIR), embedder.model_id(), embedder.dim()).await?;
        let stats = match tokio::fs::read(dir.join(STATS_FILE)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Stats::default(),
            Err(e) => return Err(e.into()),
        };
        Self::assemble(config, embedder, generator, index, stats)
    }
}

fn check_embedder(config: &EngineConfig, embedder: &dyn Embedder) -> Result<()> {
    if embedder.model_id() != config.embeddings_model {
        return Err(Error::InvalidConfig(format!(
            "embeddings_model is {} but the embedder reports {}",
            config.embeddings_model,
            embedder.model_id()
        )));
    }
    Ok(())
}

fn shape_sources(mut response: Response, request: &QueryRequest) -> Response {
    if !request.include_sources() {
        response.sources.clear();
    }
    response
}

fn unique_sources(results: &[QueryResult]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for r in results {
        if !sources.contains(&r.chunk.metadata.source) {
            sources.push(r.chunk.metadata.source.clone());
        }
    }
    sources
}

fn elapsed_ms(started: Instant) -> f64 { started.elapsed().as_secs_f64() * 1000.0 }
