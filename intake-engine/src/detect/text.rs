//! Text primitives shared by the detectors and the session's answer parser.

/// Abbreviations whose trailing period does not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "dr", "prof", "mr", "mrs", "ms", "st", "vs", "etc", "e.g", "i.e", "eg", "ie", "fig", "no",
    "approx", "ca", "al",
];

/// Keyword vocabulary for one category: lower-case terms matched
/// case-insensitively and acronyms matched case-sensitively.
#[derive(Debug, Clone, Copy)]
pub struct KeywordSet {
    pub terms: &'static [&'static str],
    pub acronyms: &'static [&'static str],
}

impl KeywordSet {
    pub const fn terms(terms: &'static [&'static str]) -> Self {
        Self {
            terms,
            acronyms: &[],
        }
    }

    /// Total word-bounded occurrences of every term and acronym.
    pub fn count(&self, text: &str) -> usize {
        let lower = text.to_lowercase();
        let terms: usize = self.terms.iter().map(|t| count_bounded(&lower, t)).sum();
        let acronyms: usize = self.acronyms.iter().map(|a| count_bounded(text, a)).sum();
        terms + acronyms
    }

    pub fn matches(&self, text: &str) -> bool {
        self.count(text) > 0
    }
}

/// Counts occurrences of `needle` in `haystack` that are not embedded in a
/// longer alphanumeric word.
pub fn count_bounded(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack
        .match_indices(needle)
        .filter(|(start, matched)| {
            let before = haystack[..*start].chars().next_back();
            let after = haystack[start + matched.len()..].chars().next();
            !is_word_char(before) && !is_word_char(after)
        })
        .count()
}

pub fn contains_bounded(haystack: &str, needle: &str) -> bool {
    count_bounded(haystack, needle) > 0
}

fn is_word_char(c: Option<char>) -> bool {
    c.is_some_and(char::is_alphanumeric)
}

/// Byte offset of the first sentence boundary in `text`, or `text.len()`.
///
/// A boundary is a newline, or `.`/`!`/`?` followed by whitespace or the end
/// of input. Periods after known abbreviations, single-letter initials and
/// inside numbers are skipped.
pub fn sentence_end(text: &str) -> usize {
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        match c {
            '\n' | '\r' => return idx,
            '!' | '?' => {
                if chars.peek().is_none_or(|(_, next)| next.is_whitespace()) {
                    return idx;
                }
            }
            '.' => {
                let followed_by_space = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
                if followed_by_space && !ends_with_abbreviation(&text[..idx]) {
                    return idx;
                }
            }
            _ => {}
        }
    }
    text.len()
}

fn ends_with_abbreviation(prefix: &str) -> bool {
    let word = prefix
        .rsplit(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if word.chars().count() == 1 && word.chars().all(char::is_alphabetic) {
        return true;
    }
    ABBREVIATIONS.contains(&word.as_str())
}

/// Splits `text` into trimmed, non-empty sentences.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let end = sentence_end(rest);
        let sentence = rest[..end].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        let skip = rest[end..].chars().next().map_or(0, char::len_utf8);
        rest = &rest[end + skip..];
    }
    out
}

/// Upper-cases the first letter of a word that carries no capitals yet.
pub fn capitalize(word: &str) -> String {
    if word.chars().any(char::is_uppercase) {
        return word.to_string();
    }
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Upper-cases the first character only.
pub fn sentence_case(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Truncates to at most `max` characters on a char boundary, trimming the result.
pub fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect::<String>().trim().to_string()
}
