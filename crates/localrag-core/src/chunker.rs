use crate::error::{Error, Result};
use crate::types::{ChunkMeta, Document};

/// Breakpoints tried, best first, when a window has to be cut.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", "! ", "? "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    size: usize,
    overlap: usize,
}

impl ChunkerConfig {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Validation("chunk_size must be greater than zero".into()));
        }
        if overlap >= size {
            return Err(Error::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize { self.size }
    pub fn overlap(&self) -> usize { self.overlap }
}

/// One window of a document, ready to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    pub metadata: ChunkMeta,
}

impl TextChunk {
    pub fn id(&self) -> String { format!("{}:{}", self.metadata.source, self.metadata.chunk_index) }
}

/// Split `text` into windows of at most `size` chars.
///
/// Every window after the first starts `overlap` chars before the end of the
/// previous one, so `chunks[0] + chunks[1][overlap..] + ...` is the input.
/// Returns `(start_offset, content)` pairs; offsets are in chars.
pub fn chunk_text(text: &str, config: &ChunkerConfig) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut start = 0;
    loop {
        let window_end = (start + config.size).min(len);
        if window_end == len {
            out.push((start, chars[start..len].iter().collect()));
            break;
        }
        // Cut no earlier than the back half, and always past the overlap so the next window advances.
        let floor = start + (config.size / 2).max(config.overlap + 1);
        let end = find_breakpoint(&chars, floor, window_end);
        out.push((start, chars[start..end].iter().collect()));
        start = end - config.overlap;
    }
    out
}

fn find_breakpoint(chars: &[char], floor: usize, window_end: usize) -> usize {
    for sep in SEPARATORS {
        let sep: Vec<char> = sep.chars().collect();
        let mut end = window_end;
        while end >= floor && end >= sep.len() {
            if chars[end - sep.len()..end] == sep[..] {
                return end;
            }
            end -= 1;
        }
    }
    let mut end = window_end;
    while end >= floor && end > 0 {
        if chars[end - 1].is_whitespace() {
            return end;
        }
        end -= 1;
    }
    window_end
}

pub fn chunk_document(doc: &Document, config: &ChunkerConfig) -> Vec<TextChunk> {
    chunk_text(&doc.content, config)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, (start_offset, content))| TextChunk {
            content,
            metadata: ChunkMeta { source: doc.source.clone(), chunk_index, start_offset },
        })
        .collect()
}
