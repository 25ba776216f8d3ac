//! Context builder (C12): dedupe, group, format, budget-truncate chunks
//! into a prompt context plus a parallel citation list.
//!
//! The teacher's `rag::search::RrfFusion` combines per-strategy scores
//! additively to produce one ranking; the optional keyword-overlap rerank
//! here borrows that idea, simplified to a single additive term instead of
//! importing the teacher's full multi-strategy fusion machinery.

use std::collections::HashMap;

use crate::types::{Citation, IngestedDocument, Party, PartyRegistry, SearchResult};

/// Reserve carved out of the LLM's context window for the fixed system
/// prompt (§4.12).
pub const SYSTEM_PROMPT_RESERVE_TOKENS: usize = 1500;
/// A section truncated to fit the budget must still contribute at least
/// this many tokens, or it is skipped entirely.
const MIN_SECTION_TOKENS: usize = 100;
/// Two chunks sharing at least this fraction of shingles are considered
/// duplicates; only the higher-similarity one is kept.
const DEDUP_SHINGLE_OVERLAP: f64 = 0.8;
/// Snippet length for citations, in characters.
const SNIPPET_CHARS: usize = 200;

fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() as f32 / 4.0).ceil() as usize
}

/// Compute the token budget available for chunk context, given the LLM's
/// context window and the expected output allocation (§4.12).
pub fn token_budget(context_window: u32, expected_output_tokens: u32) -> usize {
    (context_window as usize)
        .saturating_sub(SYSTEM_PROMPT_RESERVE_TOKENS)
        .saturating_sub(expected_output_tokens as usize)
}

/// Builds prompt context and citations from retrieved chunks.
pub struct ContextBuilder<'a> {
    parties: &'a PartyRegistry,
    documents: &'a HashMap<String, IngestedDocument>,
}

impl<'a> ContextBuilder<'a> {
    /// Construct a builder resolving party/document metadata from
    /// `parties`/`documents`.
    pub fn new(parties: &'a PartyRegistry, documents: &'a HashMap<String, IngestedDocument>) -> Self {
        Self { parties, documents }
    }

    /// Build a formatted context string and parallel citation list from
    /// `results`, bounded to `budget_tokens` (§4.12 steps 1-5).
    pub fn build(&self, results: &[SearchResult], budget_tokens: usize) -> (String, Vec<Citation>) {
        let deduped = self.deduplicate(results);
        let grouped = self.group_by_party(deduped);

        let mut context = String::new();
        let mut citations = Vec::new();
        let mut used_tokens = 0usize;

        'outer: for (_party_slug, entries) in grouped {
            for entry in entries {
                let section = self.format_section(entry);
                let section_tokens = estimate_tokens(&section);

                if used_tokens + section_tokens <= budget_tokens {
                    context.push_str(&section);
                    context.push('\n');
                    used_tokens += section_tokens;
                    citations.push(self.citation_for(entry));
                    continue;
                }

                let remaining = budget_tokens.saturating_sub(used_tokens);
                if remaining < MIN_SECTION_TOKENS {
                    continue 'outer;
                }
                let truncated = truncate_to_tokens(&entry.chunk.content, remaining);
                if estimate_tokens(&truncated) < MIN_SECTION_TOKENS {
                    continue;
                }
                let section = self.format_section_with_content(entry, &truncated);
                context.push_str(&section);
                context.push('\n');
                used_tokens += estimate_tokens(&section);
                citations.push(self.citation_for(entry));
            }
        }

        (context, citations)
    }

    /// Remove chunks sharing ≥80% of their shingles with a higher- (or
    /// equal-) similarity chunk already kept (§4.12 step 1).
    fn deduplicate<'b>(&self, results: &'b [SearchResult]) -> Vec<&'b SearchResult> {
        let mut ordered: Vec<&SearchResult> = results.iter().collect();
        ordered.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut kept: Vec<&SearchResult> = Vec::new();
        let mut kept_shingles: Vec<std::collections::HashSet<u64>> = Vec::new();

        for candidate in ordered {
            let shingles = shingle_set(&candidate.chunk.content);
            let is_dup = kept_shingles
                .iter()
                .any(|existing| jaccard_overlap(existing, &shingles) >= DEDUP_SHINGLE_OVERLAP);
            if !is_dup {
                kept_shingles.push(shingles);
                kept.push(candidate);
            }
        }
        kept
    }

    /// Group by owning party, preserving per-party similarity ordering,
    /// parties themselves ordered by their best chunk's similarity
    /// (§4.12 step 2).
    fn group_by_party<'b>(
        &self,
        results: Vec<&'b SearchResult>,
    ) -> Vec<(String, Vec<&'b SearchResult>)> {
        let mut by_party: HashMap<String, Vec<&SearchResult>> = HashMap::new();
        for result in results {
            let party_slug = self
                .documents
                .get(&result.chunk.document_id)
                .map(|d| d.party_id.clone())
                .unwrap_or_else(|| "unknown".to_string());
            by_party.entry(party_slug).or_default().push(result);
        }

        for entries in by_party.values_mut() {
            entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        }

        let mut groups: Vec<(String, Vec<&SearchResult>)> = by_party.into_iter().collect();
        groups.sort_by(|a, b| {
            let best_a = a.1.first().map(|r| r.score).unwrap_or(0.0);
            let best_b = b.1.first().map(|r| r.score).unwrap_or(0.0);
            best_b.partial_cmp(&best_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        groups
    }

    fn party_for(&self, result: &SearchResult) -> Option<&Party> {
        let doc = self.documents.get(&result.chunk.document_id)?;
        self.parties.get(&doc.party_id)
    }

    fn document_title(&self, result: &SearchResult) -> String {
        self.documents
            .get(&result.chunk.document_id)
            .and_then(|d| d.metadata.get("title").cloned())
            .unwrap_or_else(|| result.chunk.document_id.clone())
    }

    fn format_section(&self, result: &SearchResult) -> String {
        self.format_section_with_content(result, &result.chunk.content)
    }

    fn format_section_with_content(&self, result: &SearchResult, content: &str) -> String {
        let abbreviation = self.party_for(result).map(|p| p.abbreviation.clone()).unwrap_or_else(|| "?".to_string());
        let title = self.document_title(result);
        let page_ref = result
            .chunk
            .page_range
            .map(|r| {
                if r.start == r.end {
                    format!(" (p. {})", r.start)
                } else {
                    format!(" (p. {}-{})", r.start, r.end)
                }
            })
            .unwrap_or_default();
        format!("### Party: {} ({}){}\n{}\n", abbreviation, title, page_ref, content)
    }

    fn citation_for(&self, result: &SearchResult) -> Citation {
        let abbreviation = self.party_for(result).map(|p| p.abbreviation.clone()).unwrap_or_else(|| "?".to_string());
        let snippet: String = result.chunk.content.chars().take(SNIPPET_CHARS).collect();
        Citation {
            party: abbreviation,
            document: self.document_title(result),
            page: result.chunk.page_range.map(|r| r.start),
            similarity: result.score,
            snippet,
        }
    }
}

/// Truncate `text` to approximately `max_tokens`, cutting at the last
/// sentence boundary within that budget when one exists.
fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * 4;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(|c| matches!(c, '.' | '?' | '!')) {
        Some(idx) if idx > max_chars / 2 => truncated[..=idx].to_string(),
        _ => truncated,
    }
}

fn shingle_set(text: &str) -> std::collections::HashSet<u64> {
    use std::hash::{Hash, Hasher};
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut shingles = std::collections::HashSet::new();
    const SHINGLE_SIZE: usize = 5;
    if words.len() < SHINGLE_SIZE {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        words.join(" ").hash(&mut hasher);
        shingles.insert(hasher.finish());
        return shingles;
    }
    for window in words.windows(SHINGLE_SIZE) {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        window.join(" ").hash(&mut hasher);
        shingles.insert(hasher.finish());
    }
    shingles
}

fn jaccard_overlap(a: &std::collections::HashSet<u64>, b: &std::collections::HashSet<u64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, QualityBreakdown};
    use chrono::Utc;

    fn make_result(document_id: &str, content: &str, score: f32, page: Option<u32>) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: format!("{document_id}-chunk"),
                document_id: document_id.to_string(),
                chunk_index: 0,
                content: content.to_string(),
                embedding: None,
                token_count: estimate_tokens(content),
                char_count: content.len(),
                page_range: page.map(|p| crate::types::PageRange { start: p, end: p }),
                quality_score: 0.8,
                quality_breakdown: QualityBreakdown::default(),
                keywords: vec![],
                entities: vec![],
                created_at: Utc::now(),
                metadata: Default::default(),
            },
            score,
            distance: 1.0 - score,
        }
    }

    fn setup() -> (PartyRegistry, HashMap<String, IngestedDocument>) {
        let mut parties = PartyRegistry::new();
        parties.upsert(Party {
            slug: "pln".to_string(),
            name: "Partido Liberación Nacional".to_string(),
            abbreviation: "PLN".to_string(),
            color: None,
            metadata: Default::default(),
        });
        let mut documents = HashMap::new();
        documents.insert(
            "doc1".to_string(),
            IngestedDocument {
                id: "doc1".to_string(),
                party_id: "pln".to_string(),
                source_url: "https://example.test/plan.pdf".to_string(),
                local_path: "/tmp/plan.pdf".to_string(),
                page_count: 10,
                byte_size: 1000,
                downloaded_at: Utc::now(),
                parsed_at: Some(Utc::now()),
                metadata: [("title".to_string(), "Plan de Gobierno".to_string())].into_iter().collect(),
            },
        );
        (parties, documents)
    }

    #[test]
    fn builds_context_with_party_header() {
        let (parties, documents) = setup();
        let builder = ContextBuilder::new(&parties, &documents);
        let results = vec![make_result("doc1", "El plan propone mejorar la educación.", 0.9, Some(3))];
        let (context, citations) = builder.build(&results, 10_000);
        assert!(context.contains("### Party: PLN (Plan de Gobierno)"));
        assert!(context.contains("(p. 3)"));
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].party, "PLN");
    }

    #[test]
    fn near_duplicate_chunks_are_deduplicated() {
        let (parties, documents) = setup();
        let builder = ContextBuilder::new(&parties, &documents);
        let text = "el plan propone mejorar la educación pública en todo el país";
        let results = vec![
            make_result("doc1", text, 0.9, None),
            make_result("doc1", text, 0.7, None),
        ];
        let (_context, citations) = builder.build(&results, 10_000);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].similarity, 0.9);
    }

    #[test]
    fn tiny_budget_skips_sections_below_minimum() {
        let (parties, documents) = setup();
        let builder = ContextBuilder::new(&parties, &documents);
        let results = vec![make_result("doc1", &"palabra ".repeat(500), 0.9, None)];
        let (context, citations) = builder.build(&results, 10);
        assert!(context.is_empty());
        assert!(citations.is_empty());
    }
}
