use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use localrag_core::config::CacheSettings;
use localrag_core::error::Result;

use crate::file::FileBackend;
use crate::redis_backend::RedisBackend;

/// Key/value store with expiry. Keys are logical (`response:<fp>`); a backend
/// may add its own namespace prefix.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn default_ttl(&self) -> Duration;

    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Remove every key starting with `prefix`; returns how many went.
    async fn clear_prefix(&self, prefix: &str) -> Result<u64>;
    async fn ping(&self) -> Result<()>;
}

pub type SharedBackend = Arc<dyn CacheBackend>;

pub trait CacheSettingsExt {
    /// Pick the backend once. `Disabled` yields `None`.
    fn build(&self) -> Result<Option<SharedBackend>>;
}

impl CacheSettingsExt for CacheSettings {
    fn build(&self) -> Result<Option<SharedBackend>> {
        match self {
            CacheSettings::Redis(settings) => {
                let backend = RedisBackend::new(settings.clone())?;
                tracing::info!(host = %settings.host, port = settings.port, db = settings.db, "using redis cache");
                Ok(Some(Arc::new(backend)))
            }
            CacheSettings::File(settings) => {
                let backend = FileBackend::new(settings.clone())?;
                tracing::info!(dir = %settings.directory_path.display(), "using file cache");
                Ok(Some(Arc::new(backend)))
            }
            CacheSettings::Disabled => {
                tracing::info!("response cache disabled");
                Ok(None)
            }
        }
    }
}
