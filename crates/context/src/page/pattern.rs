//! Page Pattern Matcher - Detects navigation intent in free-text queries
//!
//! Recognises Spanish and English page references ("página 79", "pagina 79",
//! "page 79", "pág. 79", "pag. 79", "p. 79"). Patterns are anchored to the page
//! word, so bare numbers elsewhere in the query never match. The single-letter
//! form needs its dot, otherwise "S&P 500" or "p2p" would read as pages.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Ordered page-reference patterns; the first that matches wins.
///
/// regex-lite folds ASCII case only, so accented letters carry both cases.
const PAGE_PATTERNS: &[&str] = &[
    r"(?i)\bp[áÁ]gina\s*(\d+)",
    r"(?i)\bpagina\s*(\d+)",
    r"(?i)\bpage\s*(\d+)",
    r"(?i)\bp[áÁ]g\.?\s*(\d+)",
    r"(?i)\bpag\.?\s*(\d+)",
    r"(?i)\bp\.\s*(\d+)",
];

fn patterns() -> &'static [Regex] {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PAGE_PATTERNS
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::error!(pattern = pattern, error = %e, "Invalid page pattern skipped");
                    None
                }
            })
            .collect()
    })
}

/// Extracts a requested physical page number from a query
#[derive(Debug, Clone, Copy, Default)]
pub struct PagePatternMatcher;

impl PagePatternMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Return the first page number referenced in `query`, if any
    pub fn detect_page_number(&self, query: &str) -> Option<u32> {
        for regex in patterns() {
            for caps in regex.captures_iter(query) {
                let parsed = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
                if let Some(page) = parsed {
                    return Some(page);
                }
            }
        }
        None
    }
}

/// Convenience wrapper around [`PagePatternMatcher::detect_page_number`]
pub fn detect_page_number(query: &str) -> Option<u32> {
    PagePatternMatcher.detect_page_number(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spanish_accented() {
        assert_eq!(detect_page_number("¿Qué dice la página 79?"), Some(79));
        assert_eq!(detect_page_number("RESUME LA PÁGINA 12"), Some(12));
    }

    #[test]
    fn test_all_supported_forms() {
        assert_eq!(detect_page_number("ve a la pagina 5"), Some(5));
        assert_eq!(detect_page_number("What is on Page 101?"), Some(101));
        assert_eq!(detect_page_number("see pag. 33 please"), Some(33));
        assert_eq!(detect_page_number("see pag 34"), Some(34));
        assert_eq!(detect_page_number("p. 12 is fine"), Some(12));
        assert_eq!(detect_page_number("véase p.7"), Some(7));
    }

    #[test]
    fn test_accented_abbreviation() {
        assert_eq!(detect_page_number("ver pág. 12"), Some(12));
        assert_eq!(detect_page_number("VER PÁG 8"), Some(8));
    }

    #[test]
    fn test_bare_letter_p_is_not_a_page() {
        assert_eq!(detect_page_number("How did the S&P 500 do in 2020?"), None);
        assert_eq!(detect_page_number("explain p2p networking"), None);
        assert_eq!(detect_page_number("check p7"), None);
    }

    #[test]
    fn test_no_page_keyword() {
        assert_eq!(detect_page_number("room 404"), None);
        assert_eq!(detect_page_number("top 5 ideas from chapter 3"), None);
        assert_eq!(detect_page_number("encode it as mp3 at 320"), None);
        assert_eq!(detect_page_number("no numbers at all"), None);
        assert_eq!(detect_page_number(""), None);
    }

    #[test]
    fn test_first_pattern_wins_over_later_numbers() {
        assert_eq!(detect_page_number("en 2019, la página 40 dice p. 3"), Some(40));
    }

    #[test]
    fn test_overflowing_number_is_ignored() {
        assert_eq!(detect_page_number("page 99999999999999"), None);
    }
}
