//! Field detectors.
//!
//! Each detector is a pure function from raw text to a [`Detection`]. A miss
//! is not an error: mandatory fields come back `Unknown` with confidence 0.0
//! and optional fields come back `N/A`.

pub mod categories;
pub mod instructions;
pub mod names;
pub mod narrative;
pub mod text;

pub use categories::{detect_assay_type, detect_procedure, detect_therapeutic_area};
pub use instructions::{
    detect_assay_instructions, detect_block_id, detect_request_number,
    detect_sectioning_instructions, detect_status, detect_trim_instructions,
    generate_request_number,
};
pub use names::{detect_pathologist, detect_principal_investigator};
pub use narrative::{NarrativeRule, detect_project_title, detect_request_purpose};

use crate::fields::{FieldEntry, FieldName, FieldRecord, FieldSource, FieldValue};
use text::KeywordSet;

pub const CONFIDENCE_EXPLICIT: f32 = 0.9;
pub const CONFIDENCE_CATEGORY_WIN: f32 = 0.8;
pub const CONFIDENCE_COMBINED_PROCEDURE: f32 = 0.85;
pub const CONFIDENCE_CONTEXTUAL: f32 = 0.6;
pub const CONFIDENCE_CATEGORY_TIE: f32 = 0.6;
pub const CONFIDENCE_SENTENCE: f32 = 0.5;
pub const CONFIDENCE_COMPOSED: f32 = 0.4;
pub const CONFIDENCE_FALLBACK: f32 = 0.4;

/// Best-guess value for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub value: FieldValue,
    pub confidence: f32,
}

impl Detection {
    pub fn found(value: impl Into<String>, confidence: f32) -> Self {
        Self {
            value: FieldValue::text(value),
            confidence,
        }
    }

    pub fn miss() -> Self {
        Self {
            value: FieldValue::Unknown,
            confidence: 0.0,
        }
    }

    pub fn not_applicable() -> Self {
        Self {
            value: FieldValue::NotApplicable,
            confidence: 0.0,
        }
    }

    pub fn into_entry(self) -> FieldEntry {
        FieldEntry::new(self.value, self.confidence, FieldSource::Detected)
    }
}

/// Runs the detector for `field` against `text`.
pub fn detect_field(field: FieldName, text: &str) -> Detection {
    match field {
        FieldName::RequestNumber => detect_request_number(text),
        FieldName::TherapeuticArea => detect_therapeutic_area(text),
        FieldName::Procedure => detect_procedure(text),
        FieldName::AssayType => detect_assay_type(text),
        FieldName::PrincipalInvestigator => detect_principal_investigator(text),
        FieldName::Pathologist => detect_pathologist(text),
        FieldName::ProjectTitle => detect_project_title(text),
        FieldName::RequestPurpose => detect_request_purpose(text),
        FieldName::AssayInstructions => detect_assay_instructions(text),
        FieldName::TrimInstructions => detect_trim_instructions(text),
        FieldName::SectioningInstructions => detect_sectioning_instructions(text),
        FieldName::BlockId => detect_block_id(text),
        FieldName::Status => detect_status(text),
    }
}

/// Runs every detector and collects the results into a fresh record.
pub fn detect_all(text: &str) -> FieldRecord {
    let mut record = FieldRecord::new();
    for field in FieldName::ALL {
        record.set(field, detect_field(field, text).into_entry());
    }
    record
}

const RESEARCH_VOCABULARY: KeywordSet = KeywordSet::terms(&[
    "research", "study", "analysis", "imaging", "staining", "stained", "quantification",
    "cells", "tissue", "section", "microscopy", "assay", "slides", "scanning",
]);

const STRONG_RESEARCH_VOCABULARY: KeywordSet =
    KeywordSet::terms(&["cells", "stain", "stained", "analysis", "research", "study"]);

/// Whether a chat message reads like a research description rather than a
/// reply to a question.
pub fn looks_like_research_text(message: &str) -> bool {
    let len = message.trim().chars().count();
    (len > 50 && RESEARCH_VOCABULARY.matches(message))
        || (len > 100 && STRONG_RESEARCH_VOCABULARY.matches(message))
}
