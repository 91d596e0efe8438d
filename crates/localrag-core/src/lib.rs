pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use chunker::{chunk_document, chunk_text, ChunkerConfig, TextChunk};
pub use config::{CacheSettings, Config, DistanceMetric, EngineConfig, HistorySettings};
pub use error::{Error, Result};
pub use loader::DocumentLoader;
pub use traits::{Embedder, Generator, PassthroughRenderer, ResponseRenderer};
pub use types::*;
