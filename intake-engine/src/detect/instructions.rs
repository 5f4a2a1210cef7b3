//! Optional pathology fields: lab instructions, block id, request number and
//! detection status.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

use super::text::{KeywordSet, truncate};
use super::{CONFIDENCE_EXPLICIT, CONFIDENCE_FALLBACK, Detection};

const MAX_INSTRUCTION_LEN: usize = 50;

static ASSAY_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:assay|staining|quantification|imaging|measurement)(?:\s+instructions?)?\s*[:\-]\s*(?P<value>[^\n\r,;.]+)",
    )
    .expect("valid assay instruction pattern")
});

static NORMALIZED_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bnormali[sz]ed by [^\n\r,;.]+").expect("valid metric pattern"));

static SECTION_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bsection(?:ing)?(?:\s+instructions?)?\s*[:\-]\s*(?P<value>[^\n\r,;.]+)",
    )
    .expect("valid sectioning pattern")
});

static SECTION_THICKNESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:µm|um|micron)s?\s+(?:thick\s+)?(?:sections?|slices?)\b")
        .expect("valid thickness pattern")
});

static TRIM_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:trim(?:ming)?|cutting|preparation)(?:\s+instructions?)?\s*[:\-]\s*(?P<value>[^\n\r,;.]+)",
    )
    .expect("valid trim pattern")
});

static BLOCK_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bblock\s*(?:id|#|no\.?|number)?\s*[:#\-]?\s*(?P<value>[A-Z0-9][A-Z0-9\-_]{1,30})")
        .expect("valid block id pattern")
});

static REQUEST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bSR-\d{8}-\d{3}\b").expect("valid request number pattern"));

static SCANNING_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:scanning request|slide scanning|scan(?:ning)? (?:the )?slides?|dpia request|privacy (?:impact )?assessment)\b",
    )
    .expect("valid scanning request pattern")
});

const RESEARCH_CONTENT: KeywordSet = KeywordSet::terms(&[
    "cells",
    "imaging",
    "quantification",
    "staining",
    "stained",
    "analysis",
    "study",
    "research",
]);

/// Status label for how the text relates to a request.
pub const STATUS_DETECTED: &str = "Detected";
pub const STATUS_RESEARCH: &str = "Research Content";
pub const STATUS_NO_MATCH: &str = "No Match";

fn labelled(pattern: &Regex, text: &str) -> Option<String> {
    pattern.captures_iter(text).find_map(|captures| {
        let value = captures.name("value")?.as_str().trim();
        (value.chars().count() > 1).then(|| truncate(value, MAX_INSTRUCTION_LEN))
    })
}

pub fn detect_assay_instructions(text: &str) -> Detection {
    if let Some(value) = labelled(&ASSAY_LABELLED, text) {
        return Detection::found(value, CONFIDENCE_EXPLICIT);
    }
    match NORMALIZED_BY.find(text) {
        Some(found) => Detection::found(truncate(found.as_str(), MAX_INSTRUCTION_LEN), CONFIDENCE_FALLBACK),
        None => Detection::not_applicable(),
    }
}

pub fn detect_sectioning_instructions(text: &str) -> Detection {
    if let Some(value) = labelled(&SECTION_LABELLED, text) {
        return Detection::found(value, CONFIDENCE_EXPLICIT);
    }
    if let Some(found) = SECTION_THICKNESS.find(text) {
        return Detection::found(truncate(found.as_str(), MAX_INSTRUCTION_LEN), CONFIDENCE_EXPLICIT);
    }
    let lower = text.to_lowercase();
    if lower.contains("per lung section") {
        Detection::found("Per lung section", CONFIDENCE_FALLBACK)
    } else if lower.contains("section") {
        Detection::found("Standard sectioning", CONFIDENCE_FALLBACK)
    } else {
        Detection::not_applicable()
    }
}

pub fn detect_trim_instructions(text: &str) -> Detection {
    match labelled(&TRIM_LABELLED, text) {
        Some(value) => Detection::found(value, CONFIDENCE_EXPLICIT),
        None => Detection::not_applicable(),
    }
}

/// Block ids must carry at least one digit so ordinary words after "block"
/// are not taken.
pub fn detect_block_id(text: &str) -> Detection {
    BLOCK_ID
        .captures_iter(text)
        .filter_map(|captures| captures.name("value"))
        .map(|value| value.as_str())
        .find(|value| value.chars().any(|c| c.is_ascii_digit()))
        .map(|value| Detection::found(value.to_uppercase(), CONFIDENCE_EXPLICIT))
        .unwrap_or_else(Detection::not_applicable)
}

/// A request number quoted in the text, e.g. `SR-20240115-001`.
pub fn detect_request_number(text: &str) -> Detection {
    match REQUEST_NUMBER.find(text) {
        Some(found) => Detection::found(found.as_str(), CONFIDENCE_EXPLICIT),
        None => Detection::not_applicable(),
    }
}

/// Request number assigned to a new session.
pub fn generate_request_number(at: DateTime<Utc>) -> String {
    format!("SR-{}-001", at.format("%Y%m%d"))
}

pub fn detect_status(text: &str) -> Detection {
    let status = if SCANNING_REQUEST.is_match(text) {
        STATUS_DETECTED
    } else if RESEARCH_CONTENT.matches(text) {
        STATUS_RESEARCH
    } else {
        STATUS_NO_MATCH
    };
    Detection::found(status, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;
    use chrono::TimeZone;

    #[test]
    fn test_labelled_instructions() {
        let text = "Assay: IHC for SOX9, two slides. Sectioning: 5 serial sections. Trim instructions - remove capsule";
        assert_eq!(
            detect_assay_instructions(text).value,
            FieldValue::text("IHC for SOX9")
        );
        assert_eq!(
            detect_sectioning_instructions(text).value,
            FieldValue::text("5 serial sections")
        );
        assert_eq!(
            detect_trim_instructions(text).value,
            FieldValue::text("remove capsule")
        );
    }

    #[test]
    fn test_quantification_metric_as_assay_instruction() {
        let detection = detect_assay_instructions("AT2 counts normalized by total area, per slide");
        assert_eq!(detection.value, FieldValue::text("normalized by total area"));
        assert_eq!(detection.confidence, CONFIDENCE_FALLBACK);
    }

    #[test]
    fn test_sectioning_fallbacks() {
        assert_eq!(
            detect_sectioning_instructions("# of AT2 cells per lung section").value,
            FieldValue::text("Per lung section")
        );
        assert_eq!(
            detect_sectioning_instructions("cut 4 um sections from each block").value,
            FieldValue::text("4 um sections")
        );
        assert_eq!(
            detect_sectioning_instructions("whole mount eyes").value,
            FieldValue::NotApplicable
        );
    }

    #[test]
    fn test_block_id_requires_digit() {
        assert_eq!(
            detect_block_id("Block ID: ab-1234 attached").value,
            FieldValue::text("AB-1234")
        );
        assert_eq!(
            detect_block_id("we block the signal").value,
            FieldValue::NotApplicable
        );
    }

    #[test]
    fn test_request_number_generation() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        assert_eq!(generate_request_number(at), "SR-20240115-001");
        assert_eq!(
            detect_request_number("see SR-20240115-001 for details").value,
            FieldValue::text("SR-20240115-001")
        );
    }

    #[test]
    fn test_status() {
        assert_eq!(
            detect_status("Please handle this slide scanning request").value,
            FieldValue::text(STATUS_DETECTED)
        );
        assert_eq!(
            detect_status("Lung stem cells are stained").value,
            FieldValue::text(STATUS_RESEARCH)
        );
        assert_eq!(detect_status("hello").value, FieldValue::text(STATUS_NO_MATCH));
    }
}
