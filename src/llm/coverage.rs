//! Coverage fingerprints: the named entities and facts a summary mentions.
//!
//! A fingerprint holds capitalized words outside a stopword list (names,
//! products, acronyms), any token carrying a digit (dates, quarters, amounts,
//! percentages, times) and the two-word phrases such figures head.

use std::collections::BTreeMap;

/// Capitalized words that start sentences or headings rather than name things
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "again", "all", "also", "an", "and", "any", "are", "as", "at", "be",
    "because", "before", "both", "but", "by", "can", "could", "did", "do", "does", "during",
    "each", "either", "even", "every", "few", "finally", "first", "for", "from", "further", "had",
    "has", "have", "he", "her", "here", "his", "how", "however", "i", "if", "in", "into", "is",
    "it", "its", "last", "let", "may", "more", "most", "much", "must", "next", "no", "none", "not",
    "now", "of", "on", "once", "one", "only", "or", "other", "otherwise", "our", "overall", "per",
    "please", "rather", "second", "she", "should", "since", "so", "some", "such", "than", "that",
    "the", "their", "then", "there", "these", "they", "third", "this", "those", "though", "thus",
    "to", "too", "under", "until", "upon", "we", "were", "what", "when", "where", "whether",
    "which", "while", "who", "why", "will", "with", "within", "without", "would", "yes", "yet",
    "you", "your",
];

/// One fingerprint term
#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    display: String,
    /// Only ever seen capitalized at the start of a sentence, so it may be an
    /// ordinary word; matched by stem rather than exactly
    sentence_start_only: bool,
}

/// Set of entity/fact terms extracted from a text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageFingerprint {
    /// normalized term -> first-seen form
    terms: BTreeMap<String, Term>,
}

impl CoverageFingerprint {
    /// Extract the fingerprint of a text.
    ///
    /// Besides single tokens, a figure (a token with a digit, or an acronym)
    /// followed directly by a lowercase word is recorded as a two-word phrase,
    /// so "Q3 budget" is kept apart from "Q3 hiring".
    pub fn extract(text: &str) -> Self {
        let mut fingerprint = Self::default();

        for line in text.lines() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let mut sentence_start = true;

            for (position, raw) in tokens.iter().enumerate() {
                if position == 0 && is_list_marker(raw) {
                    continue;
                }
                let Some(term) = normalize_term(raw) else {
                    continue;
                };
                let at_start = sentence_start;
                sentence_start = ends_sentence(raw);

                if !is_entity(term) {
                    continue;
                }
                let figure = is_figure(term);
                fingerprint.insert(term.to_string(), at_start && !figure);

                if figure && !ends_phrase(raw) {
                    let next = tokens.get(position + 1).and_then(|n| normalize_term(n));
                    if let Some(word) = next.filter(|w| is_phrase_tail(w)) {
                        fingerprint.insert(format!("{} {}", term, word), false);
                    }
                }
            }
        }

        fingerprint
    }

    fn insert(&mut self, display: String, sentence_start_only: bool) {
        self.terms
            .entry(display.to_lowercase())
            .and_modify(|t| t.sentence_start_only &= sentence_start_only)
            .or_insert(Term {
                display,
                sentence_start_only,
            });
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Display forms, sorted by normalized term
    pub fn checklist(&self) -> Vec<&str> {
        self.terms.values().map(|t| t.display.as_str()).collect()
    }

    /// Whether a normalized term is part of this fingerprint
    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains_key(&term.to_lowercase())
    }

    /// Terms of this fingerprint that no longer appear in `text`
    pub fn missing_in(&self, text: &str) -> Vec<String> {
        let haystack = text.to_lowercase();
        self.terms
            .iter()
            .filter(|(normalized, term)| {
                if term.sentence_start_only {
                    !has_word_with_stem(&haystack, normalized)
                } else {
                    count_term(&haystack, normalized) == 0
                }
            })
            .map(|(_, term)| term.display.clone())
            .collect()
    }
}

/// Numbered-list markers such as "1." or "2)" carry no facts
fn is_list_marker(raw: &str) -> bool {
    let digits = raw.trim_end_matches(['.', ')']);
    digits.len() < raw.len() && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Strip surrounding punctuation and markdown, keeping currency and percent signs
fn normalize_term(raw: &str) -> Option<&str> {
    let term = raw.trim_matches(|c: char| !(c.is_alphanumeric() || matches!(c, '$' | '€' | '£' | '%')));
    let term = term
        .strip_suffix("'s")
        .or_else(|| term.strip_suffix("’s"))
        .unwrap_or(term);
    (!term.is_empty()).then_some(term)
}

fn is_entity(term: &str) -> bool {
    if term.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    let mut chars = term.chars();
    let starts_upper = chars.next().is_some_and(|c| c.is_uppercase());
    starts_upper
        && term.chars().count() >= 2
        && !STOPWORDS.contains(&term.to_lowercase().as_str())
}

/// Dates, amounts, quarters and acronyms
fn is_figure(term: &str) -> bool {
    term.chars().any(|c| c.is_ascii_digit())
        || (term.chars().count() >= 2
            && term.chars().all(|c| c.is_uppercase() || c.is_ascii_digit()))
}

/// Lowercase word that qualifies the figure before it ("budget" in "Q3 budget")
fn is_phrase_tail(word: &str) -> bool {
    word.chars().count() >= 3
        && word.chars().all(|c| c.is_lowercase())
        && !word.ends_with("ed")
        && !STOPWORDS.contains(&word)
}

fn trailing_mark(raw: &str) -> Option<char> {
    raw.trim_end_matches(['*', '_', '"', '\'', '’', ')', ']'])
        .chars()
        .next_back()
}

fn ends_sentence(raw: &str) -> bool {
    matches!(trailing_mark(raw), Some('.' | '!' | '?' | ':'))
}

/// Punctuation after a token separates it from the next word
fn ends_phrase(raw: &str) -> bool {
    raw.chars()
        .next_back()
        .is_some_and(|c| !(c.is_alphanumeric() || c == '%'))
}

/// Whether some word of `haystack` shares the stem of `word`.
///
/// Both arguments are expected lowercased.
fn has_word_with_stem(haystack: &str, word: &str) -> bool {
    let length = word.chars().count();
    let stem: String = word.chars().take(length.saturating_sub(2).max(4)).collect();
    if !stem.chars().all(char::is_alphanumeric) {
        return count_term(haystack, word) > 0;
    }
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w.starts_with(&stem))
}

/// Count occurrences of `term` in `haystack` on word boundaries.
///
/// Both arguments are expected lowercased.
pub(crate) fn count_term(haystack: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(term) {
        let start = from + offset;
        let end = start + term.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            count += 1;
        }
        from = start + term.chars().next().map(|c| c.len_utf8()).unwrap_or(1);
    }
    count
}
