//! Person-name detectors for the investigator and the reviewing pathologist.

use regex::Regex;
use std::sync::LazyLock;

use super::text::capitalize;
use super::{CONFIDENCE_CONTEXTUAL, CONFIDENCE_EXPLICIT, Detection};

const MAX_NAME_LEN: usize = 50;
const MAX_NAME_TOKENS: usize = 3;

/// Function words and domain nouns that can never be part of a person name.
const EXCLUDED: &[&str] = &[
    "is", "was", "will", "be", "the", "a", "an", "and", "or", "but", "of", "in", "on", "at",
    "to", "for", "with", "by", "from", "who", "has", "have", "not", "none", "tbd", "n/a",
    "quantification", "analysis", "study", "research", "cells", "cell", "section", "lung",
    "stem", "total", "area", "normalized", "scanning", "request", "data", "privacy",
    "assessment", "pathology", "biospecimen", "assay", "slide", "slides", "block", "stain",
    "staining", "fluorescence", "imaging", "neurology", "oncology", "cardiovascular",
    "immunology", "bright", "field", "microscopy", "procedure", "therapeutic", "project",
    "title", "purpose", "instructions", "sectioning", "trim", "unknown", "other", "special",
    "routine", "standard", "primary", "secondary", "antibody", "chromogen", "peroxidase",
    "hematoxylin", "eosin", "trichrome", "congo", "silver", "reticulin", "elastic", "mucin",
    "glycogen", "iron", "custom", "experimental", "detection", "identified", "detected",
    "rmim", "wmim", "tritc", "dapi", "investigator", "pathologist", "review", "lab",
    "laboratory", "group", "team",
];

static PI_EXPLICIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:principal investigator|primary investigator|lead researcher|pi)\b(?:\s*(?:\bname\b|\bis\b|\bwas\b|\bas\b|[:=\-]))*\s*(?P<rest>[^\n\r,;()]{1,80})",
    )
    .expect("valid PI pattern")
});

static PI_LED_BY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:led|conducted|performed|supervised|directed)\s+(?i:by)\s+(?P<rest>(?:(?:Dr|Prof)\.?\s+)?[A-Z][A-Za-z'\-]+(?:\s+[A-Z][A-Za-z'\-]+){0,2})",
    )
    .expect("valid led-by pattern")
});

static PI_ROLE_NOUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?i:researcher|investigator|scientist)\s+(?P<rest>(?:(?:Dr|Prof)\.?\s+)?[A-Z][A-Za-z'\-]+(?:\s+[A-Z][A-Za-z'\-]+){0,2})",
    )
    .expect("valid role-noun pattern")
});

static PI_LAB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<rest>[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)\s+(?i:lab|laboratory|group)\b")
        .expect("valid lab pattern")
});

static PATHOLOGIST_EXPLICIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:pathologist|pathology review(?:ed)? by|reviewed by|diagnosed by)\b(?:\s*(?:\bname\b|\bis\b|\bwas\b|\bwill be\b|[:=\-]))*\s*(?P<rest>[^\n\r,;()]{1,80})",
    )
    .expect("valid pathologist pattern")
});

/// Ordered rules; the regex's `rest` group holds the text that should start
/// with the name.
fn pi_rules() -> [(&'static Regex, f32); 4] {
    [
        (&*PI_EXPLICIT, CONFIDENCE_EXPLICIT),
        (&*PI_LED_BY, CONFIDENCE_CONTEXTUAL),
        (&*PI_ROLE_NOUN, CONFIDENCE_CONTEXTUAL),
        (&*PI_LAB, CONFIDENCE_CONTEXTUAL),
    ]
}

fn pathologist_rules() -> [(&'static Regex, f32); 1] {
    [(&*PATHOLOGIST_EXPLICIT, CONFIDENCE_EXPLICIT)]
}

fn first_plausible(rules: &[(&Regex, f32)], text: &str) -> Detection {
    for (pattern, confidence) in rules {
        for captures in pattern.captures_iter(text) {
            let Some(rest) = captures.name("rest") else {
                continue;
            };
            if let Some(name) = name_candidate(rest.as_str()) {
                return Detection::found(name, *confidence);
            }
        }
    }
    Detection::miss()
}

pub fn detect_principal_investigator(text: &str) -> Detection {
    first_plausible(&pi_rules(), text)
}

pub fn detect_pathologist(text: &str) -> Detection {
    first_plausible(&pathologist_rules(), text)
}

fn honorific(token: &str) -> Option<&'static str> {
    match token.trim_end_matches('.').to_lowercase().as_str() {
        "dr" | "doctor" => Some("Dr."),
        "prof" | "professor" => Some("Prof."),
        _ => None,
    }
}

/// Reads a person name from the start of `rest`.
///
/// Takes an optional honorific and up to three name tokens, stopping at the
/// first excluded word, non-alphabetic token or sentence end. A candidate
/// needs at least two alphabetic characters outside the honorific.
pub fn name_candidate(rest: &str) -> Option<String> {
    let mut tokens = rest.split_whitespace().peekable();
    let title = tokens.peek().and_then(|token| honorific(token));
    if title.is_some() {
        tokens.next();
    }

    let mut names: Vec<String> = Vec::new();
    for token in tokens {
        let sentence_end = token.ends_with(['.', '!', '?']);
        let word = token.trim_end_matches(['.', ',', '!', '?', ':', '"', '\'']);
        if word.is_empty()
            || !word
                .chars()
                .all(|c| c.is_alphabetic() || c == '\'' || c == '-')
        {
            break;
        }
        if EXCLUDED.contains(&word.to_lowercase().as_str()) {
            break;
        }
        let initial = word.chars().count() == 1;
        names.push(if initial && sentence_end {
            format!("{}.", word.to_uppercase())
        } else {
            capitalize(word)
        });
        if names.len() == MAX_NAME_TOKENS || (sentence_end && !initial) {
            break;
        }
    }

    let alphabetic = names
        .iter()
        .flat_map(|n| n.chars())
        .filter(|c| c.is_alphabetic())
        .count();
    if alphabetic < 2 {
        return None;
    }

    let joined = names.join(" ");
    let name = match title {
        Some(title) => format!("{title} {joined}"),
        None => joined,
    };
    Some(name.chars().take(MAX_NAME_LEN).collect())
}
