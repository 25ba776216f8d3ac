//! Chunk quality scoring and keyword/entity extraction (C8).
//!
//! No direct teacher counterpart; built in the idiom of `rag::search`'s
//! `Bm25Index` term-frequency bookkeeping (tokenize, count, rank) plus a
//! `regex`-based extraction pass in the style of the text-cleaning stage.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::types::QualityBreakdown;

/// Chunks scoring below this overall quality are dropped from embedding
/// and storage (§4.8).
pub const DROP_THRESHOLD: f32 = 0.2;

/// Weight of the length-fit component in the overall score.
const WEIGHT_LENGTH: f32 = 0.3;
/// Weight of the cleanliness (inverse special-char ratio) component.
const WEIGHT_CLEANLINESS: f32 = 0.3;
/// Weight of the has-keywords boolean component.
const WEIGHT_KEYWORDS: f32 = 0.2;
/// Weight of the readability component.
const WEIGHT_READABILITY: f32 = 0.2;

/// Curated domain keyword list for the has-keywords signal (§4.8).
const DOMAIN_KEYWORDS: &[&str] = &[
    "educación",
    "salud",
    "seguridad",
    "economía",
    "empleo",
    "infraestructura",
    "vivienda",
    "ambiente",
    "turismo",
    "agricultura",
    "transporte",
    "energía",
    "impuestos",
    "corrupción",
    "pobreza",
    "desarrollo",
    "tecnología",
    "digitalización",
    "exportación",
    "inversión",
];

/// Spanish stop words excluded from keyword extraction.
const STOP_WORDS: &[&str] = &[
    "el", "la", "los", "las", "un", "una", "unos", "unas", "de", "del", "a", "en", "y", "o",
    "que", "con", "por", "para", "se", "su", "sus", "es", "son", "al", "lo", "como", "más",
    "pero", "no", "sí", "ya", "muy", "este", "esta", "estos", "estas", "ese", "esa", "esos",
    "esas", "entre", "sin", "sobre", "también", "cuando", "donde", "cual", "cuales", "fue",
    "ser", "han", "ha", "hay", "desde", "hasta", "porque", "todo", "toda", "todos", "todas",
    "nos", "le", "les", "uno", "dos", "si",
];

static KEYWORD_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}]+").expect("valid regex"));

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[A-ZÁÉÍÓÚÑ][\wÁÉÍÓÚÑáéíóúñ]*(?:\s+[A-ZÁÉÍÓÚÑ][\wÁÉÍÓÚÑáéíóúñ]*)+|[A-Z]{2,})\b")
        .expect("valid regex")
});

/// Score one chunk's content, returning the per-metric breakdown (all four
/// signals §4.8 names: length, cleanliness, has-keywords, readability).
pub fn score(content: &str, target_tokens: usize) -> QualityBreakdown {
    QualityBreakdown {
        cleanliness: cleanliness_score(content),
        readability: readability_score(content),
        length_fit: length_score(content, target_tokens),
        has_keywords: has_domain_keyword(content),
    }
}

/// Overall weighted quality in [0, 1] (§4.8).
pub fn overall_quality(content: &str, target_tokens: usize) -> f32 {
    let breakdown = score(content, target_tokens);
    let keywords = if breakdown.has_keywords { 1.0 } else { 0.0 };

    (breakdown.length_fit * WEIGHT_LENGTH
        + breakdown.cleanliness * WEIGHT_CLEANLINESS
        + keywords * WEIGHT_KEYWORDS
        + breakdown.readability * WEIGHT_READABILITY)
        .clamp(0.0, 1.0)
}

/// Whether `content` should be dropped from embedding/storage.
pub fn should_drop(content: &str, target_tokens: usize) -> bool {
    overall_quality(content, target_tokens) < DROP_THRESHOLD
}

/// Length score: Gaussian-like around `target_tokens`, 0 at length 0.
fn length_score(content: &str, target_tokens: usize) -> f32 {
    let tokens = (content.chars().count() as f32 / 4.0).max(0.0);
    if tokens == 0.0 || target_tokens == 0 {
        return 0.0;
    }
    let ratio = tokens / target_tokens as f32;
    let deviation = (ratio - 1.0).abs();
    (1.0 - deviation).clamp(0.0, 1.0)
}

/// Cleanliness: 1 minus the fraction of characters that are not a letter,
/// digit, whitespace, or common punctuation (extraction-artifact signal).
fn cleanliness_score(content: &str) -> f32 {
    if content.is_empty() {
        return 0.0;
    }
    let total = content.chars().count();
    let noisy = content
        .chars()
        .filter(|c| {
            !(c.is_alphanumeric()
                || c.is_whitespace()
                || ".,;:!?¿¡()-\"'%/".contains(*c))
        })
        .count();
    1.0 - (noisy as f32 / total as f32)
}

/// Whether `content` mentions at least one curated domain keyword.
fn has_domain_keyword(content: &str) -> bool {
    let lower = content.to_lowercase();
    DOMAIN_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Readability heuristic from average word length and sentence count;
/// penalizes both extremes (very short/choppy or very long/run-on).
fn readability_score(content: &str) -> f32 {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let avg_word_len: f32 =
        words.iter().map(|w| w.chars().count()).sum::<usize>() as f32 / words.len() as f32;
    let sentence_count = content
        .chars()
        .filter(|c| matches!(c, '.' | '?' | '!'))
        .count()
        .max(1);
    let avg_sentence_len = words.len() as f32 / sentence_count as f32;

    // Ideal average word length for Spanish prose is ~5-6 characters;
    // ideal sentence length is ~15-20 words.
    let word_len_score = 1.0 - ((avg_word_len - 5.5).abs() / 5.5).clamp(0.0, 1.0);
    let sentence_len_score = 1.0 - ((avg_sentence_len - 17.5).abs() / 17.5).clamp(0.0, 1.0);

    ((word_len_score + sentence_len_score) / 2.0).clamp(0.0, 1.0)
}

/// Top-N keywords by term frequency, ties broken by preferring longer
/// terms (§4.8).
pub fn extract_keywords(content: &str, top_n: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in KEYWORD_TOKEN_RE.find_iter(&content.to_lowercase()) {
        let word = token.as_str();
        if word.chars().count() < 3 || STOP_WORDS.contains(&word) {
            continue;
        }
        *counts.entry(word.to_string()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.len().cmp(&a.0.len())));
    ranked.into_iter().take(top_n).map(|(term, _)| term).collect()
}

/// Regex-based entity extraction: capitalized multi-word sequences (proper
/// nouns/named entities) and bare acronyms (§4.8).
pub fn extract_entities(content: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut entities = Vec::new();
    for m in ENTITY_RE.find_iter(content) {
        let text = m.as_str().to_string();
        if seen.insert(text.clone()) {
            entities.push(text);
        }
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_scores_zero_overall() {
        assert_eq!(overall_quality("", 400), 0.0);
    }

    #[test]
    fn content_with_domain_keyword_scores_higher_than_without() {
        let with_kw = "El plan de gobierno propone mejorar la educación y la salud pública para todos los ciudadanos del país.";
        let without_kw = "xq2 @#$ zzz 123 !!! ### asdf qwer";
        assert!(overall_quality(with_kw, 400) > overall_quality(without_kw, 400));
    }

    #[test]
    fn breakdown_surfaces_has_keywords_signal() {
        let with_kw = "El plan de gobierno propone mejorar la educación y la salud pública.";
        let without_kw = "xq2 @#$ zzz 123 !!! ### asdf qwer";
        assert!(score(with_kw, 400).has_keywords);
        assert!(!score(without_kw, 400).has_keywords);
    }

    #[test]
    fn very_noisy_content_is_dropped() {
        let noisy = "@#$%^&*()_+{}|:<>?~`[]\\;',./ %%% €€€ ###";
        assert!(should_drop(noisy, 400));
    }

    #[test]
    fn keyword_extraction_excludes_stop_words() {
        let content = "la educación y la salud son la educación y la salud prioridades del gobierno";
        let keywords = extract_keywords(content, 5);
        assert!(keywords.contains(&"educación".to_string()));
        assert!(keywords.contains(&"salud".to_string()));
        assert!(!keywords.contains(&"la".to_string()));
    }

    #[test]
    fn keyword_ties_prefer_longer_terms() {
        let content = "salud salud economía economía";
        let keywords = extract_keywords(content, 1);
        assert_eq!(keywords[0].len() >= "salud".len(), true);
    }

    #[test]
    fn entity_extraction_finds_multiword_proper_nouns() {
        let content = "El Partido Liberación Nacional presentó su plan junto al PLN y al TSE.";
        let entities = extract_entities(content);
        assert!(entities.iter().any(|e| e.contains("Liberación Nacional")));
        assert!(entities.contains(&"PLN".to_string()));
        assert!(entities.contains(&"TSE".to_string()));
    }
}
