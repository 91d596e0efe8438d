use localrag_core::types::Response;

use crate::backend::SharedBackend;

pub const RESPONSE_NAMESPACE: &str = "response:";

/// Fingerprint -> `Response` with TTL. Never fails: backend trouble reads as
/// a miss and writes are dropped.
#[derive(Clone, Default)]
pub struct ResponseCache {
    backend: Option<SharedBackend>,
}

impl ResponseCache {
    pub fn new(backend: Option<SharedBackend>) -> Self { Self { backend } }

    pub fn disabled() -> Self { Self { backend: None } }

    pub fn is_enabled(&self) -> bool { self.backend.is_some() }

    fn key(fingerprint: &str) -> String { format!("{}{}", RESPONSE_NAMESPACE, fingerprint) }

    pub async fn get(&self, fingerprint: &str) -> Option<Response> {
        let backend = self.backend.as_ref()?;
        match backend.get(&Self::key(fingerprint)).await {
            Ok(Some(raw)) => match serde_json::from_str::<Response>(&raw) {
                Ok(response) => Some(response),
                Err(e) => {
                    tracing::warn!(backend = backend.name(), fingerprint, error = %e, "undecodable cached response");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(backend = backend.name(), fingerprint, error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, fingerprint: &str, response: &Response) {
        let Some(backend) = self.backend.as_ref() else { return };
        let raw = match serde_json::to_string(response) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(fingerprint, error = %e, "response not serializable; not cached");
                return;
            }
        };
        if let Err(e) = backend.set(&Self::key(fingerprint), &raw, backend.default_ttl()).await {
            tracing::warn!(backend = backend.name(), fingerprint, error = %e, "cache write failed");
        }
    }

    pub async fn delete(&self, fingerprint: &str) {
        let Some(backend) = self.backend.as_ref() else { return };
        if let Err(e) = backend.delete(&Self::key(fingerprint)).await {
            tracing::warn!(backend = backend.name(), fingerprint, error = %e, "cache delete failed");
        }
    }

    /// Drop every cached response. Conversation entries are left alone.
    pub async fn clear(&self) {
        let Some(backend) = self.backend.as_ref() else { return };
        match backend.clear_prefix(RESPONSE_NAMESPACE).await {
            Ok(removed) => tracing::info!(backend = backend.name(), removed, "response cache cleared"),
            Err(e) => tracing::warn!(backend = backend.name(), error = %e, "response cache clear failed"),
        }
    }

    pub async fn ping(&self) -> bool {
        match self.backend.as_ref() {
            Some(backend) => match backend.ping().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(backend = backend.name(), error = %e, "cache ping failed");
                    false
                }
            },
            None => false,
        }
    }
}
