use async_trait::async_trait;

use crate::types::{ChatMessage, Response};

pub trait Embedder: Send + Sync {
    /// Stable identifier of the model behind this embedder (e.g. `BAAI/bge-m3`).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;
    async fn generate(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;
}

/// Post-processing hook applied to a computed answer before it is cached and
/// returned. Persona styling lives behind this seam.
pub trait ResponseRenderer: Send + Sync {
    fn render(&self, response: Response) -> Response;
}

pub struct PassthroughRenderer;

impl ResponseRenderer for PassthroughRenderer {
    fn render(&self, response: Response) -> Response { response }
}
