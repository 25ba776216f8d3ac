//! Token-budgeted text chunker (C7).
//!
//! Generalized from the teacher's fixed-step word-count sliding window into
//! the paragraph → sentence → word fallback this spec requires: walk
//! paragraphs in document order, accumulate into the current chunk until the
//! next paragraph would exceed the hard maximum, emit, and seed the next
//! chunk with the overlap tail. A paragraph longer than the hard maximum is
//! split at sentence boundaries; an over-long sentence is split at word
//! boundaries. Each emitted chunk is given a page number/range via
//! [`PageIndex`], the side-channel the text extractor (C6) produces.

use serde::{Deserialize, Serialize};

use crate::types::PageRange;

/// Target chunk size in tokens (recommended default, §4.7).
pub const DEFAULT_TARGET_TOKENS: usize = 400;
/// Hard token ceiling a single chunk must never exceed.
pub const DEFAULT_MAX_TOKENS: usize = 600;
/// Token overlap carried from the tail of one chunk into the next.
pub const DEFAULT_OVERLAP_TOKENS: usize = 50;

/// Characters per token, used as the tokenizer approximation for Spanish
/// text (§4.7 step 1): exact tokenizer parity with the embedding model
/// family is not required, only a consistent approximation.
const CHARS_PER_TOKEN: f32 = 4.0;

fn estimate_tokens(text: &str) -> usize {
    ((text.chars().count() as f32) / CHARS_PER_TOKEN).ceil() as usize
}

/// Maps byte offsets in cleaned text to source page numbers, produced by
/// the text extractor (C6) alongside the text it extracted.
#[derive(Debug, Clone, Default)]
pub struct PageIndex {
    /// `boundaries[i]` is the byte offset where page `i + 1` (1-based)
    /// begins in the cleaned text. Sorted ascending.
    boundaries: Vec<usize>,
}

impl PageIndex {
    /// Build from the byte offset each page break occurs at, in order.
    pub fn new(page_start_offsets: Vec<usize>) -> Self {
        Self {
            boundaries: page_start_offsets,
        }
    }

    /// 1-based page number containing byte offset `pos`.
    pub fn page_at(&self, pos: usize) -> u32 {
        let mut page = 1u32;
        for &boundary in &self.boundaries {
            if pos >= boundary {
                page += 1;
            } else {
                break;
            }
        }
        page
    }

    /// Page number (if the span sits on one page) or range (if it crosses a
    /// page boundary) covering byte span `[start, end)`.
    pub fn range_for(&self, start: usize, end: usize) -> (Option<u32>, Option<PageRange>) {
        let first = self.page_at(start);
        let last = self.page_at(end.saturating_sub(1).max(start));
        if first == last {
            (Some(first), None)
        } else {
            (None, Some(PageRange { start: first, end: last }))
        }
    }
}

/// Chunking parameters for one ingestion run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Target chunk size in tokens.
    pub target_tokens: usize,
    /// Hard maximum tokens per chunk; never exceeded.
    pub max_tokens: usize,
    /// Token overlap carried into the next chunk.
    pub overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_tokens: DEFAULT_TARGET_TOKENS,
            max_tokens: DEFAULT_MAX_TOKENS,
            overlap_tokens: DEFAULT_OVERLAP_TOKENS,
        }
    }
}

/// One emitted chunk, prior to quality scoring/keyword extraction (C8) and
/// embedding (C1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDraft {
    /// 0-based, dense chunk index within the document.
    pub index: usize,
    /// Chunk content.
    pub content: String,
    /// Start byte offset in the cleaned text.
    pub start_offset: usize,
    /// End byte offset in the cleaned text (exclusive).
    pub end_offset: usize,
    /// Approximate token count.
    pub token_count: usize,
    /// Page number, if the chunk sits entirely on one page.
    pub page_number: Option<u32>,
    /// Page range, if the chunk crosses a page boundary.
    pub page_range: Option<PageRange>,
}

/// Paragraph → sentence → word fallback chunker.
#[derive(Debug, Clone)]
pub struct TextChunker {
    config: ChunkerConfig,
}

impl TextChunker {
    /// Construct with explicit parameters.
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk `text`, attaching page metadata from `pages`. Chunks are
    /// emitted in document order; their offset spans cover the input text
    /// in order, with `overlap_tokens` worth of repeated content between
    /// consecutive chunks — no content is dropped.
    pub fn chunk(&self, text: &str, pages: &PageIndex) -> Vec<ChunkDraft> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let units = self.split_into_units(text);
        let mut drafts = Vec::new();
        let mut current = String::new();
        let mut current_start: Option<usize> = None;
        let mut current_end = 0usize;

        let mut flush = |drafts: &mut Vec<ChunkDraft>, current: &mut String, start: &mut Option<usize>, end: usize| {
            if current.trim().is_empty() {
                current.clear();
                *start = None;
                return;
            }
            let s = start.unwrap_or(0);
            let (page_number, page_range) = pages.range_for(s, end);
            drafts.push(ChunkDraft {
                index: drafts.len(),
                content: current.trim().to_string(),
                start_offset: s,
                end_offset: end,
                token_count: estimate_tokens(current),
                page_number,
                page_range,
            });
            current.clear();
            *start = None;
        };

        for unit in &units {
            let unit_tokens = estimate_tokens(&unit.text);
            let projected = estimate_tokens(&current) + unit_tokens;

            if !current.is_empty() && projected > self.config.max_tokens {
                flush(&mut drafts, &mut current, &mut current_start, current_end);
                current = self.overlap_tail(&drafts);
                current_start = drafts.last().map(|d| {
                    d.end_offset.saturating_sub(current.len())
                });
            }

            if current.is_empty() {
                current_start = Some(unit.start);
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&unit.text);
            current_end = unit.end;

            if estimate_tokens(&current) >= self.config.target_tokens {
                flush(&mut drafts, &mut current, &mut current_start, current_end);
                current = self.overlap_tail(&drafts);
                current_start = drafts.last().map(|d| d.end_offset.saturating_sub(current.len()));
            }
        }

        if !current.trim().is_empty() {
            flush(&mut drafts, &mut current, &mut current_start, current_end);
        }

        drafts
    }

    /// Build the overlap seed carried from the previous chunk's tail.
    fn overlap_tail(&self, drafts: &[ChunkDraft]) -> String {
        let Some(prev) = drafts.last() else {
            return String::new();
        };
        if self.config.overlap_tokens == 0 {
            return String::new();
        }
        let words: Vec<&str> = prev.content.split_whitespace().collect();
        let overlap_words = (self.config.overlap_tokens as f32 * CHARS_PER_TOKEN
            / average_word_len(&words))
        .round() as usize;
        let take = overlap_words.min(words.len());
        if take == 0 {
            return String::new();
        }
        words[words.len() - take..].join(" ")
    }

    /// Split `text` into paragraph units, recursively breaking any unit
    /// longer than the hard maximum at sentence then word boundaries
    /// (§4.7 step 4).
    fn split_into_units(&self, text: &str) -> Vec<Unit> {
        let mut units = Vec::new();
        let mut offset = 0usize;
        for paragraph in text.split("\n\n") {
            let start = offset;
            let end = start + paragraph.len();
            offset = end + 2; // account for the "\n\n" separator consumed by split
            if paragraph.trim().is_empty() {
                continue;
            }
            if estimate_tokens(paragraph) <= self.config.max_tokens {
                units.push(Unit {
                    text: paragraph.trim().to_string(),
                    start,
                    end,
                });
            } else {
                units.extend(self.split_sentences(paragraph, start));
            }
        }
        units
    }

    fn split_sentences(&self, text: &str, base_offset: usize) -> Vec<Unit> {
        let mut units = Vec::new();
        let mut offset = base_offset;
        for sentence in split_on_sentence_boundaries(text) {
            let start = offset;
            let end = start + sentence.len();
            offset = end;
            if sentence.trim().is_empty() {
                continue;
            }
            if estimate_tokens(&sentence) <= self.config.max_tokens {
                units.push(Unit {
                    text: sentence.trim().to_string(),
                    start,
                    end,
                });
            } else {
                units.extend(self.split_words(&sentence, start));
            }
        }
        units
    }

    fn split_words(&self, text: &str, base_offset: usize) -> Vec<Unit> {
        let max_chars = (self.config.max_tokens as f32 * CHARS_PER_TOKEN) as usize;
        let mut units = Vec::new();
        let mut current = String::new();
        let mut start = base_offset;
        let mut offset = base_offset;

        for word in text.split_whitespace() {
            if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
                let end = offset;
                units.push(Unit {
                    text: std::mem::take(&mut current),
                    start,
                    end,
                });
                start = offset;
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            offset += word.len() + 1;
        }
        if !current.trim().is_empty() {
            units.push(Unit {
                text: current,
                start,
                end: offset,
            });
        }
        units
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

struct Unit {
    text: String,
    start: usize,
    end: usize,
}

fn average_word_len(words: &[&str]) -> f32 {
    if words.is_empty() {
        return CHARS_PER_TOKEN;
    }
    let total: usize = words.iter().map(|w| w.len() + 1).sum();
    (total as f32 / words.len() as f32).max(1.0)
}

/// Split on `.`/`?`/`!` followed by whitespace, keeping the terminator.
fn split_on_sentence_boundaries(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '?' | '!') {
            if matches!(chars.peek(), Some(' ') | Some('\n') | None) {
                sentences.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = TextChunker::default();
        let chunks = chunker.chunk("", &PageIndex::default());
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunker = TextChunker::default();
        let chunks = chunker.chunk("El plan propone mejorar la educación pública.", &PageIndex::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn long_text_splits_into_multiple_chunks_respecting_max() {
        let config = ChunkerConfig {
            target_tokens: 20,
            max_tokens: 30,
            overlap_tokens: 5,
        };
        let chunker = TextChunker::new(config);
        let paragraph = "educación salud seguridad economía empleo infraestructura ".repeat(30);
        let chunks = chunker.chunk(&paragraph, &PageIndex::default());
        assert!(chunks.len() > 1, "expected multiple chunks, got {}", chunks.len());
        for chunk in &chunks {
            assert!(
                chunk.token_count <= config.max_tokens + config.overlap_tokens + 5,
                "chunk {} exceeded budget: {} tokens",
                chunk.index,
                chunk.token_count
            );
        }
    }

    #[test]
    fn chunks_cover_text_in_order() {
        let chunker = TextChunker::default();
        let text = "Primer párrafo con contenido relevante.\n\nSegundo párrafo con más contenido relevante y extenso.";
        let chunks = chunker.chunk(text, &PageIndex::default());
        for w in chunks.windows(2) {
            assert!(w[0].start_offset <= w[1].start_offset);
        }
    }

    #[test]
    fn page_index_attaches_single_page_number() {
        let pages = PageIndex::new(vec![50, 100]);
        let (num, range) = pages.range_for(0, 10);
        assert_eq!(num, Some(1));
        assert_eq!(range, None);
    }

    #[test]
    fn page_index_attaches_range_across_boundary() {
        let pages = PageIndex::new(vec![50, 100]);
        let (num, range) = pages.range_for(40, 60);
        assert_eq!(num, None);
        assert_eq!(range, Some(PageRange { start: 1, end: 2 }));
    }

    #[test]
    fn oversized_paragraph_falls_back_to_sentence_split() {
        let config = ChunkerConfig {
            target_tokens: 10,
            max_tokens: 15,
            overlap_tokens: 0,
        };
        let chunker = TextChunker::new(config);
        let text = "Esta es una oración corta. Esta es otra oración corta también. Y una tercera oración más.";
        let chunks = chunker.chunk(text, &PageIndex::default());
        assert!(chunks.len() >= 2);
    }
}
