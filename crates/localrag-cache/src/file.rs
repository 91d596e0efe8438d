use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use localrag_core::config::FileCacheSettings;
use localrag_core::error::{Error, Result};

use crate::backend::CacheBackend;

const EXT: &str = ".json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    value: String,
    /// Unix millis after which the entry reads as absent.
    expires_at: Option<i64>,
}

/// One JSON file per key under a directory. Writes go to a temp file that is
/// renamed into place, so readers never see half an entry.
pub struct FileBackend {
    dir: PathBuf,
    ttl: Duration,
    tmp_seq: AtomicU64,
}

impl FileBackend {
    pub fn new(settings: FileCacheSettings) -> Result<Self> {
        std::fs::create_dir_all(&settings.directory_path)?;
        Ok(Self { dir: settings.directory_path, ttl: Duration::from_secs(settings.ttl_seconds), tmp_seq: AtomicU64::new(0) })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn path_for(&self, key: &str) -> PathBuf { self.dir.join(format!("{}{}", urlencoding::encode(key), EXT)) }

    fn key_for(file_name: &str) -> Option<String> {
        let encoded = file_name.strip_suffix(EXT)?;
        urlencoding::decode(encoded).ok().map(|k| k.into_owned())
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    fn name(&self) -> &'static str { "file" }

    fn default_ttl(&self) -> Duration { self.ttl }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        if let Some(expires_at) = envelope.expires_at {
            if Utc::now().timestamp_millis() >= expires_at {
                tracing::debug!(key, "file cache entry expired");
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                return Ok(None);
            }
        }
        Ok(Some(envelope.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let envelope = Envelope {
            value: value.to_string(),
            expires_at: Some(Utc::now().timestamp_millis().saturating_add(ttl_ms)),
        };
        let path = self.path_for(key);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".tmp-{}-{}", std::process::id(), seq));
        tokio::fs::write(&tmp, serde_json::to_vec(&envelope)?).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0u64;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(Self::key_for) else { continue };
            if key.starts_with(prefix) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        let meta = tokio::fs::metadata(&self.dir).await?;
        if meta.is_dir() && !meta.permissions().readonly() {
            Ok(())
        } else {
            Err(Error::BackendUnavailable(format!("{} is not a writable directory", self.dir.display())))
        }
    }
}
