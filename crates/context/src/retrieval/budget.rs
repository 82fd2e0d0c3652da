//! Character budgets shared by retrieval and prompt assembly

/// Longest prefix of `text` holding at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Character count (not bytes)
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Running allowance of characters that may still be emitted
#[derive(Debug, Clone, Copy)]
pub struct CharBudget {
    remaining: usize,
}

impl CharBudget {
    pub fn new(limit: usize) -> Self {
        Self { remaining: limit }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_spent(&self) -> bool {
        self.remaining == 0
    }

    /// Consume as much of `text` as fits, returning the kept part.
    ///
    /// Returns `None` once nothing is left to spend.
    pub fn fit(&mut self, text: &str) -> Option<String> {
        if self.remaining == 0 || text.is_empty() {
            return None;
        }
        let kept = truncate_chars(text, self.remaining);
        self.remaining -= char_len(kept);
        Some(kept.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("página", 2), "pá");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_budget_is_never_exceeded() {
        let mut budget = CharBudget::new(5);
        assert_eq!(budget.fit("abc"), Some("abc".to_string()));
        assert_eq!(budget.fit("defg"), Some("de".to_string()));
        assert!(budget.is_spent());
        assert_eq!(budget.fit("x"), None);
    }
}
