use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::record::{ChunkRecord, UNKNOWN_SECTION};

static SECTION_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+\.\d+(?:\.\d+)*)").expect("valid section regex"));
static SIGNAL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z0-9_]{5,}").expect("valid signal regex"));
static ECO_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ECO[- ]?(\d{3,4})").expect("valid eco regex"));

/// Pulls structural and domain identifiers out of page text.
///
/// Implementations are swapped in without touching the index or the graph,
/// which only ever see the resulting [`ChunkRecord`] fields.
pub trait IdentifierExtractor {
    /// Section heading of a page, scanning lines in order.
    fn section_id(&self, lines: &[String]) -> Option<String>;

    /// Engineering signal names referenced in the text.
    fn signal_ids(&self, text: &str) -> BTreeSet<String>;

    /// Normalized change-order references (`ECO-NNNN`).
    fn eco_ids(&self, text: &str) -> BTreeSet<String>;
}

/// Heuristic extractor based on uppercase-token and pattern matching.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexExtractor;

impl RegexExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl IdentifierExtractor for RegexExtractor {
    fn section_id(&self, lines: &[String]) -> Option<String> {
        lines.iter().find_map(|line| {
            SECTION_HEADING
                .captures(line.trim())
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
    }

    fn signal_ids(&self, text: &str) -> BTreeSet<String> {
        SIGNAL_TOKEN
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|token| !token.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
            .collect()
    }

    fn eco_ids(&self, text: &str) -> BTreeSet<String> {
        ECO_REFERENCE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|digits| format!("ECO-{}", digits.as_str()))
            .collect()
    }
}

/// Text of one extracted manual page.
#[derive(Debug, Clone, Default)]
pub struct PageText {
    /// 1-based page number
    pub page_number: u32,
    /// Text lines in reading order
    pub lines: Vec<String>,
    /// Images found on the page
    pub image_paths: Vec<String>,
}

impl PageText {
    pub fn new(page_number: u32, lines: Vec<String>) -> Self {
        Self {
            page_number,
            lines,
            image_paths: Vec::new(),
        }
    }
}

/// Chunk id for a page, stable under page ordering.
pub fn chunk_id_for_page(page_number: u32) -> String {
    format!("ch_{:05}", page_number)
}

/// Turn extracted pages into one chunk record per page.
pub fn records_from_pages(
    pages: &[PageText],
    extractor: &dyn IdentifierExtractor,
) -> Vec<ChunkRecord> {
    let mut ordered: Vec<&PageText> = pages.iter().collect();
    ordered.sort_by_key(|page| page.page_number);

    ordered
        .into_iter()
        .map(|page| {
            let text = page.lines.join(" ");
            let section_id = extractor
                .section_id(&page.lines)
                .unwrap_or_else(|| UNKNOWN_SECTION.to_string());

            ChunkRecord {
                chunk_id: chunk_id_for_page(page.page_number),
                signal_ids: extractor.signal_ids(&text),
                eco_ids: extractor.eco_ids(&text),
                image_paths: page.image_paths.clone(),
                section_id,
                text,
            }
        })
        .collect()
}
