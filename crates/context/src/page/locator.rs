//! Page Locator - Finds the text block of a requested page
//!
//! Provides:
//! - Marker indexing for "--- PAGE n ---" and "=== PÁGINA n | ... ===" layouts
//! - Layered lookup: mapping, exact marker, small offsets, boundary-token scan
//! - "Not located" as a plain `None`, never an error

use super::mapping::PageMapping;
use genesis_common::metrics;
use regex_lite::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

/// "--- PAGE 12 ---" or "--- PAGE 12 (PHYSICAL: 10) ---"
const DASH_MARKER: &str =
    r"(?i)---[ \t]*PAGE[ \t]+(\d+)(?:[ \t]*\(PHYSICAL:[ \t]*\d+\))?[ \t]*---[ \t]*\r?\n?";

/// "=== PÁGINA 12 | Físico: 10 ===" or "=== PÁGINA 12 ==="
const EQUALS_MARKER: &str = r"(?i)=+[ \t]*P[ÁáAa]GINA[ \t]+(\d+)[ \t]*(?:\|[^\n]*?)?=+[ \t]*(?:\r?\n)*";

/// Offsets tried around the requested page, in order
const SMALL_OFFSETS: [i64; 4] = [1, -1, 2, -2];

/// Half-width of the boundary-token scan window
const WIDE_WINDOW: u32 = 60;

/// Highest internal page the boundary scan will visit
const MAX_SCAN_PAGE: u32 = 500;

/// Characters inspected at each end of a block for a printed page number
const BOUNDARY_PROBE_CHARS: usize = 30;

fn marker_regexes() -> &'static [(MarkerFormat, Regex)] {
    static COMPILED: OnceLock<Vec<(MarkerFormat, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        [(MarkerFormat::Dashes, DASH_MARKER), (MarkerFormat::Equals, EQUALS_MARKER)]
            .into_iter()
            .filter_map(|(format, pattern)| match Regex::new(pattern) {
                Ok(regex) => Some((format, regex)),
                Err(e) => {
                    tracing::error!(?format, error = %e, "Invalid page marker pattern skipped");
                    None
                }
            })
            .collect()
    })
}

/// Supported page marker layouts, in lookup preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MarkerFormat {
    Dashes,
    Equals,
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    page: u32,
    start: usize,
    content_start: usize,
}

/// Every page marker of a document, in text order
struct MarkerIndex<'a> {
    text: &'a str,
    markers: Vec<Marker>,
    first_by_format: HashMap<(MarkerFormat, u32), usize>,
}

impl<'a> MarkerIndex<'a> {
    fn build(text: &'a str) -> Self {
        let mut found: Vec<(MarkerFormat, Marker)> = Vec::new();
        for (format, regex) in marker_regexes() {
            for caps in regex.captures_iter(text) {
                let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                if let Ok(page) = number.as_str().parse::<u32>() {
                    found.push((
                        *format,
                        Marker {
                            page,
                            start: whole.start(),
                            content_start: whole.end(),
                        },
                    ));
                }
            }
        }
        found.sort_by_key(|(_, marker)| marker.start);

        let mut first_by_format = HashMap::new();
        for (position, (format, marker)) in found.iter().enumerate() {
            first_by_format.entry((*format, marker.page)).or_insert(position);
        }

        Self {
            text,
            markers: found.into_iter().map(|(_, marker)| marker).collect(),
            first_by_format,
        }
    }

    /// Text between the marker of `page` and the next marker (or end of text)
    fn block(&self, page: u32) -> Option<&'a str> {
        [MarkerFormat::Dashes, MarkerFormat::Equals]
            .into_iter()
            .filter_map(|format| self.first_by_format.get(&(format, page)).copied())
            .find_map(|position| {
                let marker = self.markers[position];
                let end = self
                    .markers
                    .get(position + 1)
                    .map(|next| next.start)
                    .unwrap_or(self.text.len());
                let block = self.text.get(marker.content_start..end)?.trim();
                (!block.is_empty()).then_some(block)
            })
    }

    fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Which lookup strategy located the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum LocateStrategy {
    /// Physical page translated through the ingestion mapping
    Mapped,
    /// Internal marker equals the requested page
    Exact,
    /// Requested page shifted by a small offset
    Offset { offset: i64 },
    /// Printed page number found at the start or end of a nearby block
    BoundaryToken,
}

impl LocateStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            LocateStrategy::Mapped => "mapped",
            LocateStrategy::Exact => "exact",
            LocateStrategy::Offset { .. } => "offset",
            LocateStrategy::BoundaryToken => "boundary_token",
        }
    }
}

/// A located page block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedPage {
    pub text: String,
    /// Internal marker number the text was taken from
    pub internal_page: u32,
    pub strategy: LocateStrategy,
}

/// Resolves a requested page to its text block
#[derive(Debug, Clone, Copy, Default)]
pub struct PageLocator;

impl PageLocator {
    pub fn new() -> Self {
        Self
    }

    /// Text of `requested_page`, or `None` when it cannot be located
    pub fn extract_page(
        &self,
        full_text: &str,
        requested_page: u32,
        mapping: Option<&PageMapping>,
    ) -> Option<String> {
        self.locate(full_text, requested_page, mapping)
            .map(|located| located.text)
    }

    /// Locate `requested_page`, reporting which strategy succeeded
    pub fn locate(
        &self,
        full_text: &str,
        requested_page: u32,
        mapping: Option<&PageMapping>,
    ) -> Option<LocatedPage> {
        let index = MarkerIndex::build(full_text);
        let located = if index.is_empty() {
            None
        } else {
            Self::run_strategies(&index, requested_page, mapping)
        };

        match &located {
            Some(page) => {
                debug!(
                    requested_page,
                    internal_page = page.internal_page,
                    strategy = page.strategy.label(),
                    "Page located"
                );
                metrics::record_page_lookup(page.strategy.label());
            }
            None => {
                debug!(requested_page, "Page not located");
                metrics::record_page_lookup("miss");
            }
        }

        located
    }

    fn run_strategies(
        index: &MarkerIndex<'_>,
        requested: u32,
        mapping: Option<&PageMapping>,
    ) -> Option<LocatedPage> {
        let found = |internal: u32, strategy: LocateStrategy| {
            index.block(internal).map(|text| LocatedPage {
                text: text.to_string(),
                internal_page: internal,
                strategy,
            })
        };

        if let Some(internal) = mapping.and_then(|m| m.get(requested)) {
            if let Some(page) = found(internal, LocateStrategy::Mapped) {
                return Some(page);
            }
        }

        if let Some(page) = found(requested, LocateStrategy::Exact) {
            return Some(page);
        }

        for offset in SMALL_OFFSETS {
            let Ok(candidate) = u32::try_from(i64::from(requested) + offset) else {
                continue;
            };
            if let Some(page) = found(candidate, LocateStrategy::Offset { offset }) {
                return Some(page);
            }
        }

        let low = requested.saturating_sub(WIDE_WINDOW).max(1);
        let high = requested.saturating_add(WIDE_WINDOW).min(MAX_SCAN_PAGE);
        let token = requested.to_string();
        (low..=high).find_map(|candidate| {
            let block = index.block(candidate)?;
            has_boundary_token(block, &token).then(|| LocatedPage {
                text: block.to_string(),
                internal_page: candidate,
                strategy: LocateStrategy::BoundaryToken,
            })
        })
    }
}

/// Whether `token` stands alone at the very start or very end of `block`
fn has_boundary_token(block: &str, token: &str) -> bool {
    let head = take_head(block, BOUNDARY_PROBE_CHARS).trim();
    if let Some(rest) = head.strip_prefix(token) {
        if !rest.chars().next().is_some_and(is_word_char) {
            return true;
        }
    }

    let tail = take_tail(block, BOUNDARY_PROBE_CHARS).trim();
    if let Some(rest) = tail.strip_suffix(token) {
        if !rest.chars().next_back().is_some_and(is_word_char) {
            return true;
        }
    }

    false
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn take_head(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn take_tail(text: &str, chars: usize) -> &str {
    let count = text.chars().count();
    if count <= chars {
        return text;
    }
    match text.char_indices().nth(count - chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(pages: &[(u32, &str)]) -> String {
        pages
            .iter()
            .map(|(n, body)| format!("--- PAGE {} ---\n{}\n", n, body))
            .collect()
    }

    #[test]
    fn test_exact_marker() {
        let text = "--- PAGE 5 ---\nHELLO\n--- PAGE 6 ---";
        assert_eq!(
            PageLocator::new().extract_page(text, 5, None),
            Some("HELLO".to_string())
        );
    }

    #[test]
    fn test_last_page_runs_to_end() {
        let text = book(&[(1, "one"), (2, "two\nlines")]);
        assert_eq!(
            PageLocator::new().extract_page(&text, 2, None),
            Some("two\nlines".to_string())
        );
    }

    #[test]
    fn test_mapping_takes_priority() {
        let text = book(&[(79, "UNRELATED"), (80, "FOUND")]);
        let mapping = PageMapping::from_json(r#"{"79": 80}"#).unwrap();

        let located = PageLocator::new().locate(&text, 79, Some(&mapping)).unwrap();
        assert_eq!(located.text, "FOUND");
        assert_eq!(located.internal_page, 80);
        assert_eq!(located.strategy, LocateStrategy::Mapped);
    }

    #[test]
    fn test_stale_mapping_falls_through_to_exact() {
        let text = book(&[(10, "ten")]);
        let mapping: PageMapping = [(10, 400)].into_iter().collect();
        let located = PageLocator::new().locate(&text, 10, Some(&mapping)).unwrap();
        assert_eq!(located.strategy, LocateStrategy::Exact);
        assert_eq!(located.text, "ten");
    }

    #[test]
    fn test_small_offsets_in_order() {
        // Both 21 and 19 exist; +1 is tried before -1
        let text = book(&[(19, "nineteen"), (21, "twenty-one")]);
        let located = PageLocator::new().locate(&text, 20, None).unwrap();
        assert_eq!(located.text, "twenty-one");
        assert_eq!(located.strategy, LocateStrategy::Offset { offset: 1 });

        let text = book(&[(18, "eighteen"), (30, "thirty")]);
        let located = PageLocator::new().locate(&text, 20, None).unwrap();
        assert_eq!(located.strategy, LocateStrategy::Offset { offset: -2 });
    }

    #[test]
    fn test_boundary_token_at_end() {
        let text = book(&[(100, "body of the chapter\n\n57"), (101, "next 58")]);
        let located = PageLocator::new().locate(&text, 57, None).unwrap();
        assert_eq!(located.internal_page, 100);
        assert_eq!(located.strategy, LocateStrategy::BoundaryToken);
    }

    #[test]
    fn test_boundary_token_at_start() {
        let text = book(&[(90, "text 1"), (95, "42 Chapter Three begins here")]);
        let located = PageLocator::new().locate(&text, 42, None).unwrap();
        assert_eq!(located.internal_page, 95);
    }

    #[test]
    fn test_boundary_token_must_stand_alone() {
        // "157" and "57th" must not count as page 57
        let text = book(&[(100, "total was 157"), (101, "57th anniversary")]);
        assert_eq!(PageLocator::new().extract_page(&text, 57, None), None);
    }

    #[test]
    fn test_boundary_scan_window_is_bounded() {
        // Internal page 200 is outside [57-60, 57+60]
        let text = book(&[(200, "body\n57")]);
        assert_eq!(PageLocator::new().extract_page(&text, 57, None), None);
    }

    #[test]
    fn test_physical_annotation_marker() {
        let text = "--- PAGE 3 (PHYSICAL: 1) ---\nannotated\n--- PAGE 4 (PHYSICAL: 2) ---\nfour";
        assert_eq!(
            PageLocator::new().extract_page(text, 3, None),
            Some("annotated".to_string())
        );
    }

    #[test]
    fn test_spanish_marker_format() {
        let text = "=== PÁGINA 7 | Físico: 5 ===\n\nsiete\n\n=== PÁGINA 8 | Físico: 6 ===\nocho";
        assert_eq!(
            PageLocator::new().extract_page(text, 7, None),
            Some("siete".to_string())
        );
        let lower = "=== página 8 | x ===\nocho";
        assert_eq!(
            PageLocator::new().extract_page(lower, 8, None),
            Some("ocho".to_string())
        );
    }

    #[test]
    fn test_case_insensitive_markers() {
        let text = "--- page 2 ---\nlower\n--- Page 3 ---\nmixed";
        assert_eq!(
            PageLocator::new().extract_page(text, 2, None),
            Some("lower".to_string())
        );
    }

    #[test]
    fn test_empty_block_is_not_a_match() {
        let text = "--- PAGE 1 ---\n   \n--- PAGE 2 ---\ntwo";
        let located = PageLocator::new().locate(text, 1, None).unwrap();
        // page 1 is blank, so the +1 offset wins
        assert_eq!(located.strategy, LocateStrategy::Offset { offset: 1 });
    }

    #[test]
    fn test_unmarked_text() {
        assert_eq!(PageLocator::new().extract_page("plain text 5", 5, None), None);
        assert_eq!(PageLocator::new().extract_page("", 1, None), None);
    }

    #[test]
    fn test_boundary_helpers() {
        assert!(has_boundary_token("  12 Intro", "12"));
        assert!(has_boundary_token("ends here - 12  ", "12"));
        assert!(!has_boundary_token("112", "12"));
        assert!(!has_boundary_token("12a text", "12"));
        assert_eq!(take_tail("abcdef", 3), "def");
        assert_eq!(take_head("ábcdef", 2), "áb");
    }
}
