use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, RedisResult};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use localrag_core::config::RedisSettings;
use localrag_core::error::{Error, Result};

use crate::backend::CacheBackend;

const SCAN_BATCH: usize = 200;

/// Redis-backed cache. Connects on first use; every command is bounded by
/// `op_timeout_ms` and retried with capped exponential backoff. A failed
/// connect makes every operation fail fast until `reconnect_cooldown_ms` passes.
pub struct RedisBackend {
    client: Client,
    conn: OnceCell<ConnectionManager>,
    failed_at: Mutex<Option<Instant>>,
    settings: RedisSettings,
}

impl RedisBackend {
    pub fn new(settings: RedisSettings) -> Result<Self> {
        let client = Client::open(connection_url(&settings).as_str())
            .map_err(|e| Error::InvalidConfig(format!("redis {}:{}: {}", settings.host, settings.port, e)))?;
        Ok(Self { client, conn: OnceCell::new(), failed_at: Mutex::new(None), settings })
    }

    fn full_key(&self, key: &str) -> String { format!("{}{}", self.settings.key_prefix, key) }

    fn op_timeout(&self) -> Duration { Duration::from_millis(self.settings.op_timeout_ms) }

    fn cooldown(&self) -> Duration { Duration::from_millis(self.settings.reconnect_cooldown_ms) }

    async fn connection(&self) -> Result<ConnectionManager> {
        if let Some(conn) = self.conn.get() {
            return Ok(conn.clone());
        }
        if let Some(failed_at) = *self.failed_at.lock() {
            if failed_at.elapsed() < self.cooldown() {
                return Err(Error::BackendUnavailable(format!(
                    "redis {}:{} unreachable, next connect attempt in {:?}",
                    self.settings.host,
                    self.settings.port,
                    self.cooldown().saturating_sub(failed_at.elapsed())
                )));
            }
        }
        // The manager must not run its own backoff inside our timeout.
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(0)
            .set_connection_timeout(self.op_timeout())
            .set_response_timeout(self.op_timeout());
        let conn = self
            .conn
            .get_or_try_init(|| async {
                match tokio::time::timeout(self.op_timeout(), ConnectionManager::new_with_config(self.client.clone(), config)).await {
                    Ok(Ok(conn)) => {
                        tracing::debug!(host = %self.settings.host, port = self.settings.port, "redis connected");
                        Ok(conn)
                    }
                    Ok(Err(e)) => Err(Error::BackendUnavailable(format!("redis connect: {}", e))),
                    Err(_) => Err(Error::BackendUnavailable("redis connect timed out".into())),
                }
            })
            .await;
        match conn {
            Ok(conn) => {
                *self.failed_at.lock() = None;
                Ok(conn.clone())
            }
            Err(e) => {
                tracing::warn!(host = %self.settings.host, port = self.settings.port, error = %e, "redis unreachable");
                *self.failed_at.lock() = Some(Instant::now());
                Err(e)
            }
        }
    }

    /// Run `op` until it succeeds or the retry budget is spent. Connect
    /// failures are not retried here; the cooldown decides when to try again.
    async fn with_retry<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let retry = &self.settings.retry;
        let mut delay = Duration::from_millis(retry.initial_delay_ms);
        let max_delay = Duration::from_millis(retry.max_delay_ms);
        let mut attempt = 0u32;
        loop {
            let conn = self.connection().await?;
            let outcome = match tokio::time::timeout(self.op_timeout(), op(conn)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => format!("{}", e),
                Err(_) => format!("timed out after {:?}", self.op_timeout()),
            };
            if attempt >= retry.max_retries {
                return Err(Error::BackendUnavailable(format!("redis {} failed after {} attempts: {}", what, attempt + 1, outcome)));
            }
            attempt += 1;
            tracing::debug!(op = what, attempt, error = %outcome, "redis retry");
            tokio::time::sleep(delay).await;
            delay = delay.mul_f64(retry.backoff_factor.max(1.0)).min(max_delay);
        }
    }
}

fn connection_url(settings: &RedisSettings) -> String {
    match &settings.password {
        Some(pw) if !pw.is_empty() => format!(
            "redis://:{}@{}:{}/{}",
            urlencoding::encode(pw),
            settings.host,
            settings.port,
            settings.db
        ),
        _ => format!("redis://{}:{}/{}", settings.host, settings.port, settings.db),
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str { "redis" }

    fn default_ttl(&self) -> Duration { Duration::from_secs(self.settings.ttl_seconds) }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = self.full_key(key);
        self.with_retry("GET", |mut conn| {
            let key = key.clone();
            async move {
                let value: Option<String> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
                Ok::<_, redis::RedisError>(value)
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let key = self.full_key(key);
        let secs = ttl.as_secs().max(1);
        self.with_retry("SET", |mut conn| {
            let (key, value) = (key.clone(), value.to_string());
            async move {
                let _: () = redis::cmd("SET").arg(&key).arg(&value).arg("EX").arg(secs).query_async(&mut conn).await?;
                Ok::<_, redis::RedisError>(())
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = self.full_key(key);
        self.with_retry("DEL", |mut conn| {
            let key = key.clone();
            async move {
                let _: i64 = redis::cmd("DEL").arg(&key).query_async(&mut conn).await?;
                Ok::<_, redis::RedisError>(())
            }
        })
        .await
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64> {
        let pattern = format!("{}*", self.full_key(prefix));
        let mut cursor: u64 = 0;
        let mut removed = 0u64;
        loop {
            let (next, keys): (u64, Vec<String>) = self
                .with_retry("SCAN", |mut conn| {
                    let pattern = pattern.clone();
                    async move {
                        redis::cmd("SCAN").arg(cursor).arg("MATCH").arg(&pattern).arg("COUNT").arg(SCAN_BATCH).query_async(&mut conn).await
                    }
                })
                .await?;
            if !keys.is_empty() {
                let n: u64 = self
                    .with_retry("DEL", |mut conn| {
                        let keys = keys.clone();
                        async move { redis::cmd("DEL").arg(&keys).query_async(&mut conn).await }
                    })
                    .await?;
                removed += n;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        tracing::debug!(pattern = %pattern, removed, "redis prefix cleared");
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        let reply: String = self
            .with_retry("PING", |mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        if reply == "PONG" { Ok(()) } else { Err(Error::BackendUnavailable(format!("unexpected PING reply {}", reply))) }
    }
}
