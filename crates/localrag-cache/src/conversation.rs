use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use localrag_core::types::Facts;

use crate::backend::SharedBackend;

pub const CONVERSATION_NAMESPACE: &str = "conversation:";

const FACT_PATTERNS: [(&str, &str); 4] = [
    ("name", r"(?i)\b(?:my name is|call me|i'm called|i am called|meu nome é|me chamo)\s+([^.,!?;\n]+)"),
    ("location", r"(?i)\b(?:i live in|eu moro em)\s+([^.,!?;\n]+)"),
    ("age", r"(?i)\b(?:i am|i'm)\s+(\d{1,3})\s+years?\s+old\b"),
    ("age", r"(?i)\btenho\s+(\d{1,3})\s+anos\b"),
];

/// A captured value ends where a new clause starts ("Lisbon and I work ...").
const CLAUSE_BREAK: &str = r"(?i)\s+(?:and|but|e|mas)\s+";

fn clause_break() -> Option<&'static Regex> {
    static BREAK: OnceLock<Option<Regex>> = OnceLock::new();
    BREAK.get_or_init(|| Regex::new(CLAUSE_BREAK).ok()).as_ref()
}

fn first_clause(value: &str) -> &str {
    match clause_break().and_then(|re| re.find(value)) {
        Some(m) => &value[..m.start()],
        None => value,
    }
}

fn fact_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        FACT_PATTERNS
            .iter()
            .filter_map(|(fact, pattern)| match Regex::new(pattern) {
                Ok(re) => Some((*fact, re)),
                Err(e) => {
                    tracing::error!(fact, error = %e, "invalid fact pattern");
                    None
                }
            })
            .collect()
    })
}

/// Pull durable user facts (name, location, age) out of one utterance.
pub fn extract_facts(text: &str) -> Option<Facts> {
    let mut facts = Facts::new();
    for (fact, re) in fact_patterns() {
        if facts.contains_key(*fact) {
            continue;
        }
        if let Some(value) = re.captures(text).and_then(|c| c.get(1)) {
            let value = first_clause(value.as_str()).trim();
            if !value.is_empty() {
                facts.insert((*fact).to_string(), value.to_string());
            }
        }
    }
    if facts.is_empty() { None } else { Some(facts) }
}

/// Per-session user facts. The backend copy is preferred; the in-process
/// copy answers when the backend misses or fails.
pub struct ConversationMemory {
    backend: Option<SharedBackend>,
    local: RwLock<HashMap<String, Facts>>,
}

impl ConversationMemory {
    pub fn new(backend: Option<SharedBackend>) -> Self { Self { backend, local: RwLock::new(HashMap::new()) } }

    fn key(session: &str) -> String { format!("{}{}", CONVERSATION_NAMESPACE, session) }

    pub async fn get_facts(&self, session: &str) -> Option<Facts> {
        if let Some(backend) = &self.backend {
            match backend.get(&Self::key(session)).await {
                Ok(Some(raw)) => match serde_json::from_str::<Facts>(&raw) {
                    Ok(facts) => {
                        self.local.write().insert(session.to_string(), facts.clone());
                        return Some(facts);
                    }
                    Err(e) => tracing::warn!(session, error = %e, "undecodable conversation facts"),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!(session, error = %e, "conversation read failed; using local copy"),
            }
        }
        self.local.read().get(session).cloned()
    }

    /// Merge `facts` into what is already known for the session and store the result.
    pub async fn record_facts(&self, session: &str, facts: Facts) -> Facts {
        let mut merged = self.get_facts(session).await.unwrap_or_default();
        merged.extend(facts);
        self.local.write().insert(session.to_string(), merged.clone());
        if let Some(backend) = &self.backend {
            match serde_json::to_string(&merged) {
                Ok(raw) => {
                    if let Err(e) = backend.set(&Self::key(session), &raw, backend.default_ttl()).await {
                        tracing::warn!(session, error = %e, "conversation write failed; kept locally");
                    }
                }
                Err(e) => tracing::warn!(session, error = %e, "facts not serializable"),
            }
        }
        tracing::debug!(session, facts = merged.len(), "conversation facts recorded");
        merged
    }

    /// Extract facts from `text`, record any, and return everything known for the session.
    pub async fn observe(&self, session: &str, text: &str) -> Option<Facts> {
        match extract_facts(text) {
            Some(facts) => Some(self.record_facts(session, facts).await),
            None => self.get_facts(session).await,
        }
    }

    pub async fn clear_session(&self, session: &str) {
        self.local.write().remove(session);
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.delete(&Self::key(session)).await {
                tracing::warn!(session, error = %e, "conversation delete failed");
            }
        }
    }
}
