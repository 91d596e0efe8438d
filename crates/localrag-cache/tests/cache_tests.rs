use std::sync::Arc;
use std::time::{Duration, Instant};

use localrag_cache::{
    extract_facts, fingerprint, normalize_question, CacheBackend, CacheSettingsExt, ConversationMemory, FileBackend,
    RedisBackend, ResponseCache,
};
use localrag_core::config::{CacheSettings, FileCacheSettings, RedisSettings, RetrySettings};
use localrag_core::types::{Response, ResponseMetadata, ResponseStatus};
use localrag_core::Error;
use tempfile::TempDir;

fn file_backend(tmp: &TempDir) -> FileBackend {
    FileBackend::new(FileCacheSettings { directory_path: tmp.path().join("cache"), ttl_seconds: 3600 }).expect("file backend")
}

fn unreachable_redis() -> RedisSettings {
    // Port 1 is never a Redis server; connections are refused immediately.
    RedisSettings {
        host: "127.0.0.1".into(),
        port: 1,
        op_timeout_ms: 300,
        retry: RetrySettings { max_retries: 1, initial_delay_ms: 10, max_delay_ms: 20, backoff_factor: 2.0 },
        ..RedisSettings::default()
    }
}

fn sample_response(question: &str) -> Response {
    Response {
        question: question.to_string(),
        answer: "Paris.".to_string(),
        sources: vec!["geo.txt".to_string()],
        metadata: ResponseMetadata { documents_retrieved: 1, ..ResponseMetadata::default() },
        confidence: 0.33,
        processing_time_ms: 12.5,
        status: ResponseStatus::Success,
        error: None,
    }
}

#[test]
fn fingerprint_ignores_case_and_spacing() {
    assert_eq!(normalize_question("  What   is\tRust? "), "what is rust?");
    let a = fingerprint("What is the capital of France?");
    let b = fingerprint("  what is the   CAPITAL of france?");
    assert_eq!(a, b);
    assert_eq!(a.len(), 32);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, fingerprint("What is the capital of Spain?"));
}

#[tokio::test]
async fn file_backend_set_get_delete() {
    let tmp = TempDir::new().expect("tmp");
    let backend = file_backend(&tmp);
    assert_eq!(backend.get("response:abc").await.expect("get"), None);
    backend.set("response:abc", "{\"x\":1}", Duration::from_secs(60)).await.expect("set");
    assert_eq!(backend.get("response:abc").await.expect("get").as_deref(), Some("{\"x\":1}"));
    backend.delete("response:abc").await.expect("delete");
    backend.delete("response:abc").await.expect("second delete is fine");
    assert_eq!(backend.get("response:abc").await.expect("get"), None);
    backend.ping().await.expect("ping");
}

#[tokio::test]
async fn file_backend_expired_entries_read_as_absent() {
    let tmp = TempDir::new().expect("tmp");
    let backend = file_backend(&tmp);
    backend.set("response:old", "stale", Duration::from_millis(0)).await.expect("set");
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(backend.get("response:old").await.expect("get"), None);
    let leftovers = std::fs::read_dir(backend.dir()).expect("read dir").count();
    assert_eq!(leftovers, 0, "expired entry is deleted on read");
}

#[tokio::test]
async fn clear_prefix_only_touches_its_namespace() {
    let tmp = TempDir::new().expect("tmp");
    let backend = file_backend(&tmp);
    let ttl = Duration::from_secs(60);
    backend.set("response:a", "1", ttl).await.expect("set");
    backend.set("response:b", "2", ttl).await.expect("set");
    backend.set("conversation:default", "{}", ttl).await.expect("set");
    assert_eq!(backend.clear_prefix("response:").await.expect("clear"), 2);
    assert_eq!(backend.get("conversation:default").await.expect("get").as_deref(), Some("{}"));
}

#[tokio::test]
async fn response_cache_round_trip_and_clear() {
    let tmp = TempDir::new().expect("tmp");
    let settings = CacheSettings::File(FileCacheSettings { directory_path: tmp.path().join("c"), ttl_seconds: 60 });
    let cache = ResponseCache::new(settings.build().expect("build"));
    let fp = fingerprint("What is the capital of France?");
    assert!(cache.get(&fp).await.is_none());
    cache.set(&fp, &sample_response("What is the capital of France?")).await;
    let hit = cache.get(&fp).await.expect("cached");
    assert_eq!(hit.answer, "Paris.");
    assert_eq!(hit.sources, vec!["geo.txt"]);
    assert!(cache.ping().await);

    cache.clear().await;
    cache.clear().await;
    assert!(cache.get(&fp).await.is_none());
}

#[tokio::test]
async fn corrupt_entries_are_a_miss() {
    let tmp = TempDir::new().expect("tmp");
    let backend = Arc::new(file_backend(&tmp));
    backend.set("response:bad", "not json", Duration::from_secs(60)).await.expect("set");
    let cache = ResponseCache::new(Some(backend));
    assert!(cache.get("bad").await.is_none());
}

#[tokio::test]
async fn disabled_cache_never_hits() {
    let cache = ResponseCache::new(CacheSettings::Disabled.build().expect("build"));
    assert!(!cache.is_enabled());
    cache.set("fp", &sample_response("q")).await;
    assert!(cache.get("fp").await.is_none());
    assert!(!cache.ping().await);
}

#[tokio::test]
async fn unreachable_redis_degrades_to_miss() {
    let backend = RedisBackend::new(unreachable_redis()).expect("client");
    assert!(backend.get("response:x").await.is_err(), "backend reports the outage");

    let cache = ResponseCache::new(CacheSettings::Redis(unreachable_redis()).build().expect("build"));
    let fp = fingerprint("anything");
    cache.set(&fp, &sample_response("anything")).await;
    assert!(cache.get(&fp).await.is_none());
    cache.clear().await;
    assert!(!cache.ping().await);
}

#[tokio::test]
async fn refused_redis_fails_fast_with_default_retry_settings() {
    let settings = RedisSettings { host: "127.0.0.1".into(), port: 1, ..RedisSettings::default() };
    let backend = RedisBackend::new(settings.clone()).expect("client");
    let started = Instant::now();
    assert!(backend.get("conversation:default").await.is_err());
    assert!(backend.get("response:x").await.is_err());
    assert!(backend.set("response:x", "v", Duration::from_secs(60)).await.is_err());
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_millis(settings.op_timeout_ms), "three operations took {:?}", elapsed);

    // Inside the cooldown nothing is attempted at all.
    let started = Instant::now();
    let err = backend.ping().await.unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)));
    assert!(started.elapsed() < Duration::from_millis(50));
}

#[tokio::test]
async fn reconnects_after_the_cooldown() {
    let settings = RedisSettings { reconnect_cooldown_ms: 20, ..unreachable_redis() };
    let backend = RedisBackend::new(settings).expect("client");
    let first = backend.ping().await.unwrap_err().to_string();
    tokio::time::sleep(Duration::from_millis(40)).await;
    let second = backend.ping().await.unwrap_err().to_string();
    assert!(!second.contains("next connect attempt"), "cooldown expired, so a fresh connect was tried: {} / {}", first, second);
}

#[test]
fn extracts_names_locations_and_ages() {
    let facts = extract_facts("Hi, my name is Ana Souza. I live in Lisbon and I am 34 years old").expect("facts");
    assert_eq!(facts.get("name").map(String::as_str), Some("Ana Souza"));
    assert_eq!(facts.get("location").map(String::as_str), Some("Lisbon"));
    assert_eq!(facts.get("age").map(String::as_str), Some("34"));

    let pt = extract_facts("Olá, meu nome é João").expect("facts");
    assert_eq!(pt.get("name").map(String::as_str), Some("João"));
    let pt = extract_facts("Eu moro em Recife, tenho 20 anos").expect("facts");
    assert_eq!(pt.get("location").map(String::as_str), Some("Recife"));
    assert_eq!(pt.get("age").map(String::as_str), Some("20"));

    assert!(extract_facts("What is the capital of France?").is_none());
}

#[tokio::test]
async fn memory_merges_facts_per_session() {
    let tmp = TempDir::new().expect("tmp");
    let memory = ConversationMemory::new(Some(Arc::new(file_backend(&tmp))));
    memory.observe("s1", "call me Bob").await;
    let facts = memory.observe("s1", "I live in Porto").await.expect("facts");
    assert_eq!(facts.get("name").map(String::as_str), Some("Bob"));
    assert_eq!(facts.get("location").map(String::as_str), Some("Porto"));

    assert!(memory.get_facts("s2").await.is_none(), "sessions are isolated");

    // A fresh memory over the same backend sees the stored facts.
    let reopened = ConversationMemory::new(Some(Arc::new(file_backend(&tmp))));
    assert_eq!(reopened.get_facts("s1").await, Some(facts));

    memory.clear_session("s1").await;
    assert!(memory.get_facts("s1").await.is_none());
}

#[tokio::test]
async fn memory_falls_back_to_local_copy_when_backend_is_down() {
    let memory = ConversationMemory::new(CacheSettings::Redis(unreachable_redis()).build().expect("build"));
    memory.observe("default", "my name is Carla").await;
    let facts = memory.get_facts("default").await.expect("local facts");
    assert_eq!(facts.get("name").map(String::as_str), Some("Carla"));

    let local_only = ConversationMemory::new(None);
    let facts = local_only.observe("default", "me chamo Rui").await.expect("facts");
    assert_eq!(facts.get("name").map(String::as_str), Some("Rui"));
}
