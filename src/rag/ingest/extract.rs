//! Text extractor and cleaner (C6).
//!
//! Extracts per-page text via `pdf-extract` (the same crate the pack's
//! semantic-search example uses for PDF ingestion), concatenates pages
//! behind a sentinel marker, applies Spanish-OCR encoding fixups, and
//! emits cleaned text alongside a [`PageIndex`] side-channel the chunker
//! (C7) consults to attach page numbers.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::rag::chunker::PageIndex;
use crate::types::{AppError, Result};

/// `pdf-extract` separates pages with a form-feed character.
const PAGE_BREAK: char = '\u{c}';

// Second byte of the two-byte UTF-8 sequence for á, é, í, ó, ú, ñ, ü when
// each byte has been misread as its own Latin-1 codepoint.
static MOJIBAKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("Ã[\u{a1}\u{a9}\u{ad}\u{b1}\u{b3}\u{bc}\u{ba}]").expect("valid regex"));

/// `:([a-záéíóúñü])` → `ti$1`, firing both word-internally (preceded by a
/// lowercase letter, e.g. `perspec:vas`) and word-initially (preceded by
/// whitespace or start of text, e.g. `:ene` → `tiene`). Never preceded by a
/// digit, so time expressions like `14:30` are spared (§4.6 step 3).
static COLON_TI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(?P<letter>[a-záéíóúñü])|(?P<bound>\A|\s)):(?P<after>[a-záéíóúñü])")
        .expect("valid regex")
});

static MULTI_NEWLINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static MULTI_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

/// Cleaned text plus the page index recovered during extraction.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Cleaned, page-marker-free text.
    pub text: String,
    /// Byte-offset-to-page-number index for the chunker.
    pub pages: PageIndex,
    /// Total number of pages extracted.
    pub page_count: u32,
    /// Whether any `U+FFFD` replacement characters were seen (quality
    /// signal only; not removed per §4.6 step 3).
    pub had_replacement_chars: bool,
}

/// Extract and clean `pdf_bytes`. Fails with `ParseFailed` on an
/// unreadable PDF — the ingestion pipeline must skip the document rather
/// than partial-persist (§4.6).
pub fn extract_and_clean(pdf_bytes: &[u8]) -> Result<ExtractedText> {
    let raw = pdf_extract::extract_text_from_mem(pdf_bytes)
        .map_err(|e| AppError::ParseFailed(format!("failed to extract PDF text: {e}")))?;

    let pages: Vec<&str> = raw.split(PAGE_BREAK).collect();
    let page_count = pages.len().max(1) as u32;

    // Concatenate with sentinel markers (§4.6 step 2), recording each
    // marker's byte offset before stripping it (§4.6 step 5).
    let mut marked = String::new();
    let mut marker_offsets = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            let marker = format!("\n-- {} of {} --\n", i + 1, page_count);
            marker_offsets.push(marked.len());
            marked.push_str(&marker);
        }
        marked.push_str(page);
    }

    let fixed = apply_encoding_fixups(&marked);
    let had_replacement_chars = fixed.contains('\u{fffd}');

    // Strip markers, tracking where each page begins in the final text.
    let (cleaned, page_starts) = strip_markers_and_collapse(&fixed);

    Ok(ExtractedText {
        text: cleaned,
        pages: PageIndex::new(page_starts),
        page_count,
        had_replacement_chars,
    })
}

fn apply_encoding_fixups(text: &str) -> String {
    let nfc: String = text.nfc().collect();
    let fixed_mojibake = fix_mojibake(&nfc);
    COLON_TI_RE.replace_all(&fixed_mojibake, "${letter}${bound}ti${after}").into_owned()
}

/// Restore UTF-8 sequences that were misread as Latin-1 (§4.6 step 3).
fn fix_mojibake(text: &str) -> String {
    if !MOJIBAKE_RE.is_match(text) {
        return text.to_string();
    }
    let latin1_bytes: Option<Vec<u8>> = text.chars().map(|c| u8::try_from(c as u32).ok()).collect();
    match latin1_bytes {
        Some(bytes) => match String::from_utf8(bytes) {
            Ok(restored) if !restored.is_empty() => restored,
            _ => text.to_string(),
        },
        None => text.to_string(),
    }
}

fn strip_markers_and_collapse(text: &str) -> (String, Vec<usize>) {
    static MARKER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n-- \d+ of \d+ --\n").expect("valid regex"));

    let mut cleaned = String::with_capacity(text.len());
    let mut page_starts = Vec::new();
    let mut last_end = 0;

    for m in MARKER_RE.find_iter(text) {
        cleaned.push_str(&text[last_end..m.start()]);
        page_starts.push(cleaned.len());
        last_end = m.end();
    }
    cleaned.push_str(&text[last_end..]);

    let collapsed = MULTI_SPACE_RE.replace_all(&cleaned, " ");
    let collapsed = MULTI_NEWLINE_RE.replace_all(&collapsed, "\n\n");
    (collapsed.into_owned(), page_starts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mojibake_sequences_are_restored() {
        // "educación" mis-decoded as Latin-1: "educaciÃ³n"
        let mojibake = "educaciÃ³n";
        let fixed = fix_mojibake(mojibake);
        assert_eq!(fixed, "educación");
    }

    #[test]
    fn colon_ti_fixup_restores_ligature_but_spares_time_expressions() {
        let fixed = apply_encoding_fixups("el país :ene perspec:vas a las 14:30");
        assert!(fixed.contains("tiene"));
        assert!(fixed.contains("perspectivas"));
        assert!(fixed.contains("14:30"));
    }

    #[test]
    fn whitespace_collapses_without_losing_paragraph_breaks() {
        let (cleaned, _) = strip_markers_and_collapse("hola    mundo\n\n\n\notro párrafo");
        assert_eq!(cleaned, "hola mundo\n\notro párrafo");
    }

    #[test]
    fn single_page_document_has_no_markers() {
        let (cleaned, starts) = strip_markers_and_collapse("solo una página de texto");
        assert_eq!(cleaned, "solo una página de texto");
        assert!(starts.is_empty());
    }

    #[test]
    fn markers_are_stripped_and_offsets_recorded() {
        let input = "primera página\n-- 2 of 2 --\nsegunda página";
        let (cleaned, starts) = strip_markers_and_collapse(input);
        assert!(!cleaned.contains("-- 2 of 2 --"));
        assert_eq!(starts.len(), 1);
        assert_eq!(&cleaned[starts[0]..], "segunda página");
    }
}
