//! Byte-budget truncation that never splits a UTF-8 sequence.

/// Outcome of [`truncate_utf8`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncated<'a> {
    pub kept: &'a str,
    pub omitted_bytes: usize,
}

impl Truncated<'_> {
    pub fn was_truncated(&self) -> bool {
        self.omitted_bytes > 0
    }
}

/// Keep at most `budget` bytes of `text`, backing off to the previous char
/// boundary. `omitted_bytes` is the exact number of bytes dropped.
pub fn truncate_utf8(text: &str, budget: usize) -> Truncated<'_> {
    if text.len() <= budget {
        return Truncated {
            kept: text,
            omitted_bytes: 0,
        };
    }
    let mut cut = budget;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    Truncated {
        kept: &text[..cut],
        omitted_bytes: text.len() - cut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        let t = truncate_utf8("hello", 10);
        assert_eq!(t.kept, "hello");
        assert!(!t.was_truncated());
    }

    #[test]
    fn cut_respects_budget_and_counts_omitted() {
        let text = "a".repeat(100);
        let t = truncate_utf8(&text, 40);
        assert_eq!(t.kept.len(), 40);
        assert_eq!(t.omitted_bytes, 60);
    }

    #[test]
    fn cut_backs_off_to_char_boundary() {
        // "é" is two bytes; a budget of 4 lands inside the second one.
        let t = truncate_utf8("aéé", 4);
        assert_eq!(t.kept, "aé");
        assert_eq!(t.kept.len() + t.omitted_bytes, "aéé".len());
    }
}
