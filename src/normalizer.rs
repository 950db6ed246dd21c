//! Query Normalizer
//!
//! Deterministic text cleanup shared by the known-good query store and every
//! incoming question, so both sides are compared in the same form.

use lazy_static::lazy_static;
use regex::Regex;

/// Filler words that carry no meaning for query matching
pub const STOP_WORDS: [&str; 11] = [
    "calculate", "the", "number", "of", "find", "show", "display", "get", "me", "give", "list",
];

lazy_static! {
    static ref STOP_WORD_RE: Regex = Regex::new(&format!(r"(?i)\b(?:{})\b", STOP_WORDS.join("|")))
        .expect("stop word pattern is valid");
    static ref PUNCTUATION_RE: Regex = Regex::new(r"[^\w\s]").expect("punctuation pattern is valid");
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").expect("whitespace pattern is valid");
}

/// Normalizes natural-language queries for cache comparison
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryNormalizer;

impl QueryNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a query
    /// - Drops metadata after a `|` separator (company ids and similar tags)
    /// - Lower-cases and trims
    /// - Removes stop words
    /// - Removes punctuation
    /// - Collapses whitespace
    pub fn normalize(&self, query: &str) -> String {
        let head = match query.split_once('|') {
            Some((head, _)) => head,
            None => query,
        };
        let mut normalized = head.to_lowercase().trim().to_string();

        // Punctuation removal can glue letters into a stop word ("sh.ow"),
        // so run the cleanup to a fixed point.
        loop {
            let next = self.clean_once(&normalized);
            if next == normalized {
                return next;
            }
            normalized = next;
        }
    }

    /// Normalize optional input; `None` yields the empty string.
    pub fn normalize_opt(&self, query: Option<&str>) -> String {
        query.map(|q| self.normalize(q)).unwrap_or_default()
    }

    fn clean_once(&self, text: &str) -> String {
        let without_stop_words = STOP_WORD_RE.replace_all(text, "");
        let without_punctuation = PUNCTUATION_RE.replace_all(&without_stop_words, "");
        let collapsed = WHITESPACE_RE.replace_all(&without_punctuation, " ");
        collapsed.trim().to_string()
    }
}

/// Shorthand for [`QueryNormalizer::normalize`].
pub fn normalize(query: &str) -> String {
    QueryNormalizer.normalize(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_stop_words_and_punctuation() {
        assert_eq!(
            normalize("Find the number of sites per province?"),
            "sites per province"
        );
        assert_eq!(normalize("total sites per province"), "total sites per province");
        assert_eq!(
            normalize("Show me   fuel consumption, for site X!"),
            "fuel consumption for site x"
        );
    }

    #[test]
    fn test_drops_metadata_suffix() {
        assert_eq!(normalize("list generators | company=42"), "generators");
        assert_eq!(normalize("|only metadata"), "");
    }

    #[test]
    fn test_whole_word_matching_only() {
        // "theme" and "showroom" contain stop words but are not stop words
        assert_eq!(normalize("theme of showroom"), "theme showroom");
        assert_eq!(normalize("GET Listings"), "listings");
    }

    #[test]
    fn test_empty_and_missing_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(QueryNormalizer::new().normalize_opt(None), "");
        assert_eq!(QueryNormalizer::new().normalize_opt(Some("The Sites")), "sites");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "Find the number of sites per province",
            "sh.ow fuel",
            "the-list of me",
            "Avg. run hours (yesterday) | tenant 7",
            "  Calculate   TOTAL   downtime!!  ",
            "ünïcödé síte naмe",
            "",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_punctuation_joined_stop_word_is_removed() {
        assert_eq!(normalize("sh.ow fuel"), "fuel");
    }
}
