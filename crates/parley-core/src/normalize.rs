//! Free-text normalization helpers shared by the agents.
//!
//! Speech transcripts arrive with arbitrary casing, filler words and
//! punctuation. These helpers map them onto canonical values without ever
//! failing: keyword fields fall back to the verbatim (trimmed) input.

/// Ordered keyword-to-canonical mapping matched by substring.
///
/// Entries are checked in table order and the first keyword contained in the
/// lowercased input wins, so more specific or preferred keywords go first.
#[derive(Debug, Clone, Copy)]
pub struct KeywordTable {
    entries: &'static [(&'static str, &'static str)],
}

impl KeywordTable {
    pub const fn new(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }

    /// The canonical value of the first keyword found in `input`.
    pub fn lookup(&self, input: &str) -> Option<&'static str> {
        let lowered = input.to_lowercase();
        self.entries
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword))
            .map(|(_, canonical)| *canonical)
    }

    /// Canonical value when a keyword matches, otherwise the trimmed input.
    pub fn normalize(&self, input: &str) -> String {
        self.lookup(input)
            .map(str::to_string)
            .unwrap_or_else(|| input.trim().to_string())
    }
}

/// Drink sizes. "small" is checked before "large" before "medium".
pub const SIZE_TABLE: KeywordTable = KeywordTable::new(&[
    ("small", "small"),
    ("large", "large"),
    ("medium", "medium"),
]);

/// Whole-utterance answers meaning "none".
pub const NEGATIVE_ANSWERS: &[&str] = &["no", "none", "nope", "nothing", "n"];

/// Whether the utterance as a whole is a negative answer.
pub fn is_negative_answer(input: &str) -> bool {
    let canonical = canonical(input);
    NEGATIVE_ANSWERS.contains(&canonical.as_str())
}

/// Splits a spoken list on commas and the word "and".
///
/// Items are trimmed and empty items dropped.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .flat_map(split_on_and)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_on_and(segment: &str) -> Vec<&str> {
    let lowered = segment.to_ascii_lowercase();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut search = 0;
    while let Some(found) = lowered[search..].find("and") {
        let at = search + found;
        let end = at + 3;
        let before_ok = at == 0 || lowered.as_bytes()[at - 1].is_ascii_whitespace();
        let after_ok = end == lowered.len() || lowered.as_bytes()[end].is_ascii_whitespace();
        if before_ok && after_ok {
            parts.push(&segment[start..at]);
            start = end;
        }
        search = end;
    }
    parts.push(&segment[start..]);
    parts
}

/// Lowercases, strips punctuation, and collapses whitespace.
pub fn canonical(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `keyword` occurs in `input` as whole words, ignoring case and
/// punctuation.
pub fn contains_keyword(input: &str, keyword: &str) -> bool {
    let haystack = format!(" {} ", canonical(input));
    let needle = format!(" {} ", canonical(keyword));
    haystack.contains(&needle)
}

/// Control phrases that bypass tool routing entirely.
///
/// Matching is exact after [`canonical`] normalization.
#[derive(Debug, Clone, Copy)]
pub struct ControlVocabulary {
    phrases: &'static [&'static str],
}

impl ControlVocabulary {
    pub const fn new(phrases: &'static [&'static str]) -> Self {
        Self { phrases }
    }

    /// Whether the utterance is one of the control phrases, ignoring case,
    /// punctuation and spacing.
    pub fn matches(&self, utterance: &str) -> bool {
        let utterance = canonical(utterance);
        self.phrases
            .iter()
            .any(|phrase| canonical(phrase) == utterance)
    }

    pub fn phrases(&self) -> &'static [&'static str] {
        self.phrases
    }
}

/// Default restart vocabulary.
pub const RESTART_VOCABULARY: ControlVocabulary =
    ControlVocabulary::new(&["new order", "start over", "restart"]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_prefers_table_order() {
        assert_eq!(SIZE_TABLE.normalize("Large please"), "large");
        assert_eq!(SIZE_TABLE.normalize("small or large?"), "small");
        assert_eq!(SIZE_TABLE.normalize("medium-ish"), "medium");
        assert_eq!(SIZE_TABLE.normalize("  venti "), "venti");
    }

    #[test]
    fn negative_answers_are_whole_utterance() {
        for input in ["no", "No.", " nope ", "Nothing!", "n"] {
            assert!(is_negative_answer(input), "{input}");
        }
        assert!(!is_negative_answer("no foam please"));
        assert!(!is_negative_answer("caramel"));
    }

    #[test]
    fn lists_split_on_commas_and_the_word_and() {
        assert_eq!(
            split_list("whipped cream and caramel, extra shot"),
            vec!["whipped cream", "caramel", "extra shot"]
        );
        assert_eq!(split_list("sandwich AND candy"), vec!["sandwich", "candy"]);
        assert_eq!(split_list("bread,, , milk"), vec!["bread", "milk"]);
        assert!(split_list("  ").is_empty());
    }

    #[test]
    fn canonical_strips_noise() {
        assert_eq!(canonical("  New   ORDER, please! "), "new order please");
    }

    #[test]
    fn control_vocabulary_matches_whole_phrases() {
        assert!(RESTART_VOCABULARY.matches("New order!"));
        assert!(RESTART_VOCABULARY.matches("  START   over. "));
        assert!(!RESTART_VOCABULARY.matches("I'd like a new order of fries"));
        assert!(contains_keyword("I'd like a new order of fries", "new order"));
        assert!(!contains_keyword("a renewed order", "new order"));
        assert!(!RESTART_VOCABULARY.matches("large latte"));
    }
}
