use localrag_cache::fingerprint;
use localrag_core::traits::ResponseRenderer;
use localrag_core::types::{Response, ResponseStatus};

const DEFAULT_REDIRECTS: [&str; 3] = [
    "I don't have that in my documents yet. Could you ask about something they cover?",
    "That's outside what I can answer from my sources. Try rephrasing, or ask about another topic.",
    "I couldn't find anything on that. Is there something else I can help you look up?",
];

/// Turns `no_results` answers into a redirect reply. The reply is picked by
/// question fingerprint, so the same question always gets the same one.
pub struct RedirectRenderer {
    replies: Vec<String>,
}

impl RedirectRenderer {
    pub fn new(replies: Vec<String>) -> Self { Self { replies } }

    fn pick(&self, question: &str) -> Option<&str> {
        if self.replies.is_empty() {
            return None;
        }
        let fp = fingerprint(question);
        let n = u64::from_str_radix(&fp[..16], 16).unwrap_or(0);
        let idx = (n % self.replies.len() as u64) as usize;
        self.replies.get(idx).map(String::as_str)
    }
}

impl Default for RedirectRenderer {
    fn default() -> Self { Self::new(DEFAULT_REDIRECTS.iter().map(|s| s.to_string()).collect()) }
}

impl ResponseRenderer for RedirectRenderer {
    fn render(&self, mut response: Response) -> Response {
        if response.status != ResponseStatus::NoResults {
            return response;
        }
        if let Some(reply) = self.pick(&response.question) {
            response.answer = reply.to_string();
            response.status = ResponseStatus::Redirect;
        }
        response
    }
}
