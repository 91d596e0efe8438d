use localrag_core::types::{ChatRole, Facts, QueryResult};

use crate::history::Turn;

/// Prompt context: known user facts, then relevant earlier turns, then the
/// retrieved chunks best first.
pub fn build_context(facts: Option<&Facts>, earlier: &[Turn], results: &[QueryResult]) -> String {
    let mut out = String::new();
    if let Some(facts) = facts.filter(|f| !f.is_empty()) {
        out.push_str("User information:\n");
        for (key, value) in facts {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        out.push('\n');
    }
    if !earlier.is_empty() {
        out.push_str("Previous conversation:\n");
        for turn in earlier {
            out.push_str(&format!("{}: {}\n", role_label(turn.role), turn.content));
        }
        out.push('\n');
    }
    let documents: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("Document {} (Source: {}):\n{}", i + 1, r.chunk.metadata.source, r.chunk.content))
        .collect();
    out.push_str(&documents.join("\n\n"));
    out
}

fn role_label(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

pub fn build_user_message(question: &str, context: &str) -> String {
    format!("Context:\n{}\n\nQuestion: {}", context, question)
}
