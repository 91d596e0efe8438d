use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};

use localrag_core::config::{expand_path, resolve_with_base, CacheSettings, Config, EngineConfig};
use localrag_core::error::Error;
use localrag_core::loader::DocumentLoader;
use localrag_core::traits::{Embedder, Generator};
use localrag_core::types::{ChatMessage, QueryRequest};
use localrag_embed::{get_default_embedder, use_fake_embeddings};
use localrag_engine::RetrievalEngine;
use localrag_llm::{ChatCompletionsGenerator, LlmSettings};

const USAGE: &str = "<ingest [dir] [--limit N] | query \"<question>\" [k] [--session ID] [--no-sources] | stats | clear | ping>";

/// Stand-in for commands that never generate answers.
struct NoGenerator;

#[async_trait]
impl Generator for NoGenerator {
    fn model_id(&self) -> &str { "none" }
    async fn generate(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
        Err(anyhow!("no generator configured for this command"))
    }
}

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() { eprintln!("Usage: {} {}", prog, USAGE); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

/// Value following `--name`, removing both from `args`.
fn take_flag(args: &mut Vec<String>, name: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == name)?;
    args.remove(pos);
    (pos < args.len()).then(|| args.remove(pos))
}

fn take_switch(args: &mut Vec<String>, name: &str) -> bool {
    match args.iter().position(|a| a == name) {
        Some(pos) => { args.remove(pos); true }
        None => false,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).with_writer(std::io::stderr).init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let (cmd, args) = parse_args();
    tokio::runtime::Runtime::new()?.block_on(run(&config, &cmd, args))
}

async fn run(config: &Config, cmd: &str, mut args: Vec<String>) -> anyhow::Result<()> {
    // Relative data paths hang off `data.root`.
    let root = expand_path(config.get::<String>("data.root").unwrap_or_else(|_| ".".to_string()));
    let engine_dir = resolve_with_base(&root, config.get::<String>("data.engine_dir").unwrap_or_else(|_| "data/engine".to_string()));
    let embedder: Arc<dyn Embedder> = Arc::from(get_default_embedder()?);
    let mut engine_cfg = config.engine()?;
    if let CacheSettings::File(file) = &mut engine_cfg.cache {
        file.directory_path = resolve_with_base(&root, file.directory_path.to_string_lossy());
    }
    if use_fake_embeddings() {
        engine_cfg.embeddings_model = embedder.model_id().to_string();
    }

    match cmd {
        "ingest" => {
            let limit = take_flag(&mut args, "--limit").map(|v| v.parse::<usize>()).transpose()?;
            let data_dir = args.first().map(PathBuf::from).unwrap_or_else(|| {
                resolve_with_base(&root, config.get::<String>("data.raw_txt_dir").unwrap_or_else(|_| "data/txt".to_string()))
            });
            println!("Ingesting from {}", data_dir.display());
            let loader = limit.map_or_else(DocumentLoader::new, DocumentLoader::with_limit);
            let docs = loader.load_directory(&data_dir)?;

            let engine = open_engine(&engine_dir, engine_cfg, embedder, Arc::new(NoGenerator)).await?;
            let pb = ProgressBar::new(docs.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}")?
                    .progress_chars("#>-"),
            );
            let mut chunks = 0usize;
            for doc in &docs {
                pb.set_message(doc.source.clone());
                chunks += engine.add_documents(std::slice::from_ref(doc)).await?.chunks;
                pb.inc(1);
            }
            pb.finish_with_message("done");
            engine.save(&engine_dir).await?;
            println!("✅ Ingest complete ({} documents, {} chunks, {} total)", docs.len(), chunks, engine.chunk_count());
        }
        "query" => {
            let session = take_flag(&mut args, "--session");
            let no_sources = take_switch(&mut args, "--no-sources");
            let question = args.first().cloned().unwrap_or_else(|| {
                eprintln!("Usage: localrag query \"<question>\" [k] [--session ID] [--no-sources]"); std::process::exit(1)
            });
            let k = args.get(1).map(|v| v.parse::<usize>()).transpose()?.unwrap_or(engine_cfg.max_documents);

            let llm: LlmSettings = config.get("llm").unwrap_or_default();
            let generator = Arc::new(ChatCompletionsGenerator::from_env(llm)?);
            let engine = open_engine(&engine_dir, engine_cfg, embedder, generator).await?;

            let mut request = QueryRequest::new(question, k)?.with_sources(!no_sources);
            if let Some(session) = session {
                request = request.with_session(session);
            }
            let response = engine.query(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if let Err(e) = engine.save_stats(&engine_dir).await {
                tracing::debug!(error = %e, "stats not persisted");
            }
        }
        "stats" => {
            let engine = open_engine(&engine_dir, engine_cfg, embedder, Arc::new(NoGenerator)).await?;
            println!("{}", serde_json::to_string_pretty(&engine.stats())?);
        }
        "clear" => {
            let engine = open_engine(&engine_dir, engine_cfg, embedder, Arc::new(NoGenerator)).await?;
            engine.clear().await;
            engine.save(&engine_dir).await?;
            println!("✅ Cleared {}", engine_dir.display());
        }
        "ping" => {
            let engine = open_engine(&engine_dir, engine_cfg, embedder, Arc::new(NoGenerator)).await?;
            if engine.ping_cache().await {
                println!("cache: ok");
            } else {
                println!("cache: unavailable");
                std::process::exit(2);
            }
        }
        _ => { eprintln!("Unknown command: {}\nUsage: localrag {}", cmd, USAGE); std::process::exit(1); }
    }
    Ok(())
}

/// Load the saved engine at `dir`, or start an empty one from `config`.
async fn open_engine(
    dir: &Path,
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
) -> anyhow::Result<RetrievalEngine> {
    match RetrievalEngine::load(dir, embedder.clone(), generator.clone()).await {
        Ok(engine) => Ok(engine),
        Err(Error::NotFound(_)) => {
            tracing::info!(dir = %dir.display(), "no saved engine, starting empty");
            Ok(RetrievalEngine::initialize(config, embedder, generator)?)
        }
        Err(e) => Err(e.into()),
    }
}
