/// Trim, lower-case and collapse internal whitespace.
pub fn normalize_question(question: &str) -> String {
    question.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Cache key for a question: first 128 bits of the BLAKE3 hash of the normalized text, as hex.
pub fn fingerprint(question: &str) -> String {
    let normalized = normalize_question(question);
    let hex = blake3::hash(normalized.as_bytes()).to_hex();
    hex.as_str()[..32].to_string()
}
