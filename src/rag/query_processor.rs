//! Query processor (C10): LLM-based structured query extraction.
//!
//! Asks the LLM to return a compact record — keywords, entities, intent,
//! an expanded paraphrase — decoded via `toon_format::decode_default`,
//! applied here to an [`EnhancedQuery`] payload. A `serde_json` fallback
//! handles fenced JSON blocks; if both fail, the processor degrades
//! gracefully rather than erroring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use toon_format::decode_default;

use crate::llm::{ChatMessage, CompletionOptions, LLMClient};
use crate::types::{EnhancedQuery, QueryIntent};

const SYSTEM_PROMPT: &str = "Extrae de la pregunta del usuario un registro compacto con estos \
campos exactamente: keywords (lista separada por comas), entities (lista de siglas de partidos \
o nombres propios separada por comas), intent (una de: question, comparison, lookup, \
opinion_probe), enhancedQuery (una paráfrasis que expande abreviaturas y agrega sinónimos \
probables). Responde únicamente con el registro, un campo por línea, sin explicaciones.";

/// Tracks cumulative token savings from using TOON over JSON, for
/// observability (§4.10 side effect).
#[derive(Default)]
pub struct TokenSavingsCounter {
    saved: AtomicU64,
}

impl TokenSavingsCounter {
    /// Record `saved` tokens avoided by using the compact format.
    pub fn record(&self, saved: i64) {
        if saved > 0 {
            self.saved.fetch_add(saved as u64, Ordering::Relaxed);
        }
    }

    /// Cumulative tokens saved since process start.
    pub fn total(&self) -> u64 {
        self.saved.load(Ordering::Relaxed)
    }
}

/// Extracts a structured [`EnhancedQuery`] from a raw user question.
pub struct QueryProcessor {
    llm: Arc<dyn LLMClient>,
    savings: TokenSavingsCounter,
}

impl QueryProcessor {
    /// Construct a processor backed by `llm`.
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self {
            llm,
            savings: TokenSavingsCounter::default(),
        }
    }

    /// Observability counter for TOON vs. JSON token savings.
    pub fn token_savings(&self) -> &TokenSavingsCounter {
        &self.savings
    }

    /// Process `query`, degrading to a tokenized fallback on any failure
    /// (LLM error or unparseable response) rather than propagating an
    /// error (§4.10 step 3).
    pub async fn process(&self, query: &str) -> EnhancedQuery {
        match self.call_llm(query).await {
            Ok(raw) => self.parse(&raw, query),
            Err(_) => fallback(query),
        }
    }

    async fn call_llm(&self, query: &str) -> crate::types::Result<String> {
        let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(query)];
        let options = CompletionOptions {
            temperature: 0.0,
            max_tokens: 300,
            ..Default::default()
        };
        let response = self.llm.complete(&messages, &options).await?;
        Ok(response.content)
    }

    fn parse(&self, raw: &str, original_query: &str) -> EnhancedQuery {
        let trimmed = raw.trim();

        if let Ok(enhanced) = decode_default::<EnhancedQuery>(trimmed) {
            self.savings.record(estimate_json_tokens(&enhanced) - estimate_tokens(trimmed));
            return enhanced;
        }

        if let Some(json_block) = extract_fenced_json(trimmed) {
            if let Ok(enhanced) = serde_json::from_str::<EnhancedQuery>(&json_block) {
                return enhanced;
            }
        }

        if let Ok(enhanced) = parse_line_format(trimmed) {
            return enhanced;
        }

        fallback(original_query)
    }
}

/// Graceful-degradation fallback: tokenize the query, no entities,
/// intent = question, enhancedQuery = original query (§4.10 step 3).
fn fallback(query: &str) -> EnhancedQuery {
    EnhancedQuery {
        keywords: query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| !w.is_empty())
            .collect(),
        entities: Vec::new(),
        intent: QueryIntent::Question,
        enhanced_query: query.to_string(),
    }
}

fn extract_fenced_json(text: &str) -> Option<String> {
    let start = text.find("```json").map(|i| i + 7).or_else(|| text.find("```").map(|i| i + 3))?;
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

/// Parse the one-field-per-line format if the model didn't emit valid
/// TOON (e.g. omitted quoting); a lenient second-chance parser.
fn parse_line_format(text: &str) -> Result<EnhancedQuery, ()> {
    let mut keywords = Vec::new();
    let mut entities = Vec::new();
    let mut intent = QueryIntent::Question;
    let mut enhanced_query = String::new();

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_lowercase().as_str() {
            "keywords" => keywords = split_csv(value),
            "entities" => entities = split_csv(value),
            "intent" => {
                intent = match value.to_lowercase().as_str() {
                    "comparison" => QueryIntent::Comparison,
                    "lookup" => QueryIntent::Lookup,
                    "opinion_probe" => QueryIntent::OpinionProbe,
                    _ => QueryIntent::Question,
                }
            }
            "enhancedquery" => enhanced_query = value.to_string(),
            _ => {}
        }
    }

    if enhanced_query.is_empty() {
        return Err(());
    }

    Ok(EnhancedQuery {
        keywords,
        entities,
        intent,
        enhanced_query,
    })
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn estimate_tokens(text: &str) -> i64 {
    (text.chars().count() as f32 / 4.0).ceil() as i64
}

fn estimate_json_tokens(enhanced: &EnhancedQuery) -> i64 {
    serde_json::to_string(enhanced)
        .map(|s| estimate_tokens(&s))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_tokenizes_query_with_empty_entities() {
        let enhanced = fallback("¿Qué propone el PLN sobre educación?");
        assert_eq!(enhanced.intent, QueryIntent::Question);
        assert!(enhanced.entities.is_empty());
        assert!(enhanced.keywords.contains(&"educación".to_string()) || !enhanced.keywords.is_empty());
    }

    #[test]
    fn parse_line_format_reads_all_fields() {
        let raw = "keywords: educación, salud\nentities: PLN, PUSC\nintent: comparison\nenhancedQuery: Comparación de propuestas de educación y salud entre PLN y PUSC";
        let enhanced = parse_line_format(raw).unwrap();
        assert_eq!(enhanced.intent, QueryIntent::Comparison);
        assert_eq!(enhanced.entities, vec!["PLN".to_string(), "PUSC".to_string()]);
        assert_eq!(enhanced.keywords.len(), 2);
    }

    #[test]
    fn fenced_json_block_is_extracted() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_fenced_json(raw), Some("{\"a\": 1}".to_string()));
    }

    #[test]
    fn malformed_line_format_falls_through() {
        assert!(parse_line_format("not a valid record at all").is_err());
    }
}
