//! Response and conversation caching over Redis or local files.
//!
//! Backends implement [`CacheBackend`] and report every failure. The typed
//! facades ([`ResponseCache`], [`ConversationMemory`]) never fail: a broken
//! backend reads as a miss and writes are dropped with a warning.
pub mod backend;
pub mod conversation;
pub mod file;
pub mod fingerprint;
pub mod redis_backend;
pub mod response;

pub use backend::{CacheBackend, CacheSettingsExt, SharedBackend};
pub use conversation::{extract_facts, ConversationMemory};
pub use file::FileBackend;
pub use fingerprint::{fingerprint, normalize_question};
pub use redis_backend::RedisBackend;
pub use response::ResponseCache;
