//! Project title and request purpose detectors.
//!
//! Both run the same ordered list of [`NarrativeRule`]s; the first rule that
//! yields a value wins. Each rule can be applied on its own for testing.

use regex::Regex;
use std::sync::LazyLock;

use super::text::{sentence_case, sentences, truncate};
use super::{CONFIDENCE_COMPOSED, CONFIDENCE_EXPLICIT, CONFIDENCE_SENTENCE, Detection};

const MAX_TITLE_LEN: usize = 150;
const MAX_PURPOSE_LEN: usize = 200;
const LEAD_SENTENCES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrativeRule {
    /// A labelled value such as `Project title: ...`.
    Explicit,
    /// One of the leading sentences that carries a domain verb.
    LeadSentence,
    /// Assembled from detected domain nouns and activities.
    Composed,
}

impl NarrativeRule {
    pub const ORDER: [NarrativeRule; 3] = [
        NarrativeRule::Explicit,
        NarrativeRule::LeadSentence,
        NarrativeRule::Composed,
    ];
}

static TITLE_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:project title|study title|research title|project name|title)\s*[:=\-]\s*(?P<value>[^\n\r]+?)\s*(?:[;\n\r]|\.\s|\.$|$)",
    )
    .expect("valid title pattern")
});

static TITLE_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:titled|entitled)\s+["“'](?P<value>[^"”'\n]{3,150})["”']"#)
        .expect("valid quoted title pattern")
});

static PURPOSE_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:request purpose|purpose|objective|goal|aim)\s*[:=\-]\s*(?P<value>[^\n\r]+?)\s*(?:[;\n\r]|\.\s|\.$|$)",
    )
    .expect("valid purpose pattern")
});

static PURPOSE_IS_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:purpose|goal|aim|objective)(?: of (?:this|the) (?:study|request|project))? is to\s+(?P<value>[^\n\r]+?)\s*(?:[;\n\r]|\.\s|\.$|$)",
    )
    .expect("valid purpose-is-to pattern")
});

const TITLE_VERBS: &[&str] = &[
    "study",
    "research",
    "analysis",
    "analyze",
    "analyse",
    "investigation",
    "investigate",
    "imaging",
    "quantification",
    "characterization",
    "characterize",
    "assessment",
    "evaluation",
];

const PURPOSE_VERBS: &[&str] = &[
    "quantify",
    "measure",
    "monitor",
    "compare",
    "evaluate",
    "assess",
    "determine",
    "identify",
    "interested in",
    "want to",
    "would like to",
    "in order to",
];

/// Domain nouns used to compose a title, with their display form.
const TITLE_NOUNS: &[(&str, &str)] = &[
    ("stem cell", "Stem Cell"),
    ("lung", "Lung"),
    ("at2", "AT2"),
    ("cancer", "Cancer"),
    ("tumor", "Tumor"),
    ("brain", "Brain"),
    ("heart", "Heart"),
];

const TITLE_ACTIVITIES: &[(&str, &str)] = &[
    ("quantification", "Quantification"),
    ("imaging", "Imaging"),
    ("analysis", "Analysis"),
    ("stain", "Staining"),
    ("fluorescence", "Fluorescence"),
];

const PURPOSE_KEYWORDS: &[(&str, &str)] = &[
    ("quantification", "Quantification and analysis"),
    ("imaging", "Imaging and visualization"),
    ("analysis", "Data analysis"),
    ("measurement", "Measurement and assessment"),
    ("comparison", "Comparative analysis"),
    ("evaluation", "Evaluation and assessment"),
];

fn labelled(patterns: &[&Regex], text: &str, max_len: usize) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern.captures_iter(text).find_map(|captures| {
            let value = captures.name("value")?.as_str().trim();
            let value = value.trim_matches(|c: char| c == '"' || c == '\'' || c == '“' || c == '”');
            (value.chars().count() > 2).then(|| truncate(value, max_len))
        })
    })
}

fn lead_sentence(text: &str, verbs: &[&str], max_len: usize) -> Option<String> {
    sentences(text)
        .into_iter()
        .take(LEAD_SENTENCES)
        .find(|sentence| {
            let len = sentence.chars().count();
            let lower = sentence.to_lowercase();
            len > 10 && len < max_len && verbs.iter().any(|verb| lower.contains(verb))
        })
        .map(str::to_string)
}

fn composed_title(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let pick = |table: &[(&str, &'static str)]| -> Vec<&'static str> {
        table
            .iter()
            .filter(|(needle, _)| lower.contains(needle))
            .map(|(_, label)| *label)
            .collect()
    };
    let nouns = pick(TITLE_NOUNS);
    let activities = pick(TITLE_ACTIVITIES);
    match (nouns.is_empty(), activities.is_empty()) {
        (false, false) => Some(format!("{} {} Study", nouns.join(" "), activities.join(" "))),
        (false, true) => Some(format!("{} Research Study", nouns.join(" "))),
        (true, false) => Some(format!("{} Research Project", activities.join(" "))),
        (true, true) => None,
    }
}

fn composed_purpose(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    PURPOSE_KEYWORDS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, purpose)| purpose.to_string())
}

pub fn apply_title_rule(rule: NarrativeRule, text: &str) -> Option<Detection> {
    match rule {
        NarrativeRule::Explicit => labelled(&[&*TITLE_LABELLED, &*TITLE_QUOTED], text, MAX_TITLE_LEN)
            .map(|title| Detection::found(title, CONFIDENCE_EXPLICIT)),
        NarrativeRule::LeadSentence => lead_sentence(text, TITLE_VERBS, 120)
            .map(|title| Detection::found(title, CONFIDENCE_SENTENCE)),
        NarrativeRule::Composed => {
            composed_title(text).map(|title| Detection::found(title, CONFIDENCE_COMPOSED))
        }
    }
}

pub fn apply_purpose_rule(rule: NarrativeRule, text: &str) -> Option<Detection> {
    match rule {
        NarrativeRule::Explicit => {
            labelled(&[&*PURPOSE_LABELLED, &*PURPOSE_IS_TO], text, MAX_PURPOSE_LEN)
                .map(|purpose| Detection::found(sentence_case(&purpose), CONFIDENCE_EXPLICIT))
        }
        NarrativeRule::LeadSentence => lead_sentence(text, PURPOSE_VERBS, MAX_PURPOSE_LEN)
            .map(|purpose| Detection::found(purpose, CONFIDENCE_SENTENCE)),
        NarrativeRule::Composed => {
            composed_purpose(text).map(|purpose| Detection::found(purpose, CONFIDENCE_COMPOSED))
        }
    }
}

pub fn detect_project_title(text: &str) -> Detection {
    NarrativeRule::ORDER
        .iter()
        .find_map(|rule| apply_title_rule(*rule, text))
        .unwrap_or_else(Detection::miss)
}

pub fn detect_request_purpose(text: &str) -> Detection {
    NarrativeRule::ORDER
        .iter()
        .find_map(|rule| apply_purpose_rule(*rule, text))
        .unwrap_or_else(Detection::miss)
}
