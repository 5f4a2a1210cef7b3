//! Closed vocabulary of record fields and the typed record that carries them.
//!
//! Every field a request can hold is a [`FieldName`] variant, declared in the
//! order the tabular rendering uses. A [`FieldRecord`] always contains every
//! mandatory field; values are overwritten in place and never removed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldName {
    RequestNumber,
    TherapeuticArea,
    Procedure,
    AssayType,
    PrincipalInvestigator,
    Pathologist,
    ProjectTitle,
    RequestPurpose,
    AssayInstructions,
    TrimInstructions,
    SectioningInstructions,
    BlockId,
    Status,
}

/// How a field's value is obtained and what an answer to it looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Categorical,
    FreeText,
    Generated,
}

impl FieldName {
    /// All fields in declared (table) order.
    pub const ALL: [FieldName; 13] = [
        FieldName::RequestNumber,
        FieldName::TherapeuticArea,
        FieldName::Procedure,
        FieldName::AssayType,
        FieldName::PrincipalInvestigator,
        FieldName::Pathologist,
        FieldName::ProjectTitle,
        FieldName::RequestPurpose,
        FieldName::AssayInstructions,
        FieldName::TrimInstructions,
        FieldName::SectioningInstructions,
        FieldName::BlockId,
        FieldName::Status,
    ];

    /// Mandatory fields in the order they are validated and asked for.
    pub const MANDATORY: [FieldName; 7] = [
        FieldName::PrincipalInvestigator,
        FieldName::Pathologist,
        FieldName::TherapeuticArea,
        FieldName::Procedure,
        FieldName::AssayType,
        FieldName::ProjectTitle,
        FieldName::RequestPurpose,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FieldName::RequestNumber => "Pathology Request No.",
            FieldName::TherapeuticArea => "Therapeutic Area",
            FieldName::Procedure => "Procedure",
            FieldName::AssayType => "Assay Type/Staining Type",
            FieldName::PrincipalInvestigator => "PI",
            FieldName::Pathologist => "Pathologist",
            FieldName::ProjectTitle => "Project Title",
            FieldName::RequestPurpose => "Request Purpose",
            FieldName::AssayInstructions => "Assay Instructions",
            FieldName::TrimInstructions => "Trim Instructions",
            FieldName::SectioningInstructions => "Sectioning Instructions",
            FieldName::BlockId => "Block id",
            FieldName::Status => "Status",
        }
    }

    pub fn is_mandatory(self) -> bool {
        Self::MANDATORY.contains(&self)
    }

    pub fn kind(self) -> FieldKind {
        match self {
            FieldName::TherapeuticArea | FieldName::Procedure | FieldName::AssayType => {
                FieldKind::Categorical
            }
            FieldName::RequestNumber | FieldName::Status => FieldKind::Generated,
            _ => FieldKind::FreeText,
        }
    }

    /// Closed option set for categorical fields, in priority order.
    pub fn options(self) -> Option<Vec<&'static str>> {
        match self {
            FieldName::TherapeuticArea => Some(TherapeuticArea::labels()),
            FieldName::Procedure => Some(Procedure::labels()),
            FieldName::AssayType => Some(AssayType::labels()),
            _ => None,
        }
    }

    /// Resolves a display name or an external (e.g. `snake_case`) name to a field.
    pub fn from_alias(name: &str) -> Option<Self> {
        let key = normalize_key(name);
        let field = match key.as_str() {
            "pathology request no" | "pathology request number" | "request number"
            | "request no" | "request id" => FieldName::RequestNumber,
            "therapeutic area" | "therapeutic" | "area" => FieldName::TherapeuticArea,
            "procedure" | "procedure type" => FieldName::Procedure,
            "assay type staining type" | "assay type" | "staining type" | "stain type"
            | "assay" => FieldName::AssayType,
            "pi" | "pi name" | "principal investigator" | "primary investigator"
            | "investigator" => FieldName::PrincipalInvestigator,
            "pathologist" | "pathologist name" => FieldName::Pathologist,
            "project title" | "title" | "project" => FieldName::ProjectTitle,
            "request purpose" | "purpose" => FieldName::RequestPurpose,
            "assay instructions" => FieldName::AssayInstructions,
            "trim instructions" => FieldName::TrimInstructions,
            "sectioning instructions" | "section instructions" => {
                FieldName::SectioningInstructions
            }
            "block id" | "block" => FieldName::BlockId,
            "status" => FieldName::Status,
            _ => return None,
        };
        Some(field)
    }

    /// Reads a free-form answer for this field.
    ///
    /// Categorical answers must name an option by label, alias or 1-based
    /// index; the index one past the last option and the word "unknown"
    /// mean the answer is not known yet. Anything else is rejected.
    pub fn canonicalize(self, answer: &str) -> Answer {
        let answer = answer.trim();
        if answer.is_empty() || answer.eq_ignore_ascii_case(UNKNOWN) {
            return Answer::Unknown;
        }
        match self {
            FieldName::TherapeuticArea => categorical::<TherapeuticArea>(answer),
            FieldName::Procedure => categorical::<Procedure>(answer),
            FieldName::AssayType => categorical::<AssayType>(answer),
            _ => Answer::Value(answer.to_string()),
        }
    }
}

/// Result of reading an answer for a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Value(String),
    Unknown,
    Rejected,
}

fn categorical<C: Category>(answer: &str) -> Answer {
    if let Some(option) = C::parse(answer) {
        return Answer::Value(option.label().to_string());
    }
    match answer.parse::<usize>() {
        Ok(index) if index == C::ALL.len() + 1 => Answer::Unknown,
        _ => Answer::Rejected,
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<FieldName> for String {
    fn from(field: FieldName) -> Self {
        field.label().to_string()
    }
}

impl TryFrom<String> for FieldName {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        FieldName::from_alias(&value).ok_or_else(|| format!("unknown field name: {value}"))
    }
}

fn normalize_key(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(['_', '-', '/', '.', ':'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Closed value set of a categorical field.
pub trait Category: Copy + Sized + 'static {
    /// Variants in tie-break priority order.
    const ALL: &'static [Self];

    fn label(self) -> &'static str;

    fn aliases(self) -> &'static [&'static str] {
        &[]
    }

    fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.label()).collect()
    }

    /// Parses a label, an alias, or a 1-based option index.
    fn parse(input: &str) -> Option<Self> {
        let key = normalize_key(input);
        if key.is_empty() {
            return None;
        }
        if let Ok(index) = key.parse::<usize>() {
            return index.checked_sub(1).and_then(|i| Self::ALL.get(i).copied());
        }
        Self::ALL.iter().copied().find(|c| {
            normalize_key(c.label()) == key || c.aliases().iter().any(|a| normalize_key(a) == key)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TherapeuticArea {
    Cvrm,
    Neurology,
    Oncology,
    Ophthalmology,
    InfectiousDiseases,
    Immunology,
}

impl Category for TherapeuticArea {
    const ALL: &'static [Self] = &[
        TherapeuticArea::Cvrm,
        TherapeuticArea::Neurology,
        TherapeuticArea::Oncology,
        TherapeuticArea::Ophthalmology,
        TherapeuticArea::InfectiousDiseases,
        TherapeuticArea::Immunology,
    ];

    fn label(self) -> &'static str {
        match self {
            TherapeuticArea::Cvrm => "CVRM",
            TherapeuticArea::Neurology => "Neurology",
            TherapeuticArea::Oncology => "Oncology",
            TherapeuticArea::Ophthalmology => "Ophthalmology",
            TherapeuticArea::InfectiousDiseases => "Infectious Diseases",
            TherapeuticArea::Immunology => "Immunology",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            TherapeuticArea::Cvrm => &["cardiovascular", "cardiovascular renal metabolism"],
            TherapeuticArea::Neurology => &["neuro", "neuroscience"],
            TherapeuticArea::Oncology => &["onc", "cancer"],
            TherapeuticArea::Ophthalmology => &["ophthalmic", "eye"],
            TherapeuticArea::InfectiousDiseases => {
                &["infectious disease", "infectious", "infection"]
            }
            TherapeuticArea::Immunology => &["immune", "immuno"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Procedure {
    BrightField,
    Fluorescence,
    Combined,
}

impl Category for Procedure {
    const ALL: &'static [Self] = &[
        Procedure::BrightField,
        Procedure::Fluorescence,
        Procedure::Combined,
    ];

    fn label(self) -> &'static str {
        match self {
            Procedure::BrightField => "Bright-field (BF)",
            Procedure::Fluorescence => "Fluorescence (IF)",
            Procedure::Combined => "BF+IF",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Procedure::BrightField => &["bf", "bright-field", "bright field", "brightfield"],
            Procedure::Fluorescence => &["if", "fluorescence", "immunofluorescence"],
            Procedure::Combined => &["bf + if", "bf and if", "both", "combined"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssayType {
    HematoxylinEosin,
    Ihc,
    SpecialStain,
    Other,
}

impl Category for AssayType {
    const ALL: &'static [Self] = &[
        AssayType::HematoxylinEosin,
        AssayType::Ihc,
        AssayType::SpecialStain,
        AssayType::Other,
    ];

    fn label(self) -> &'static str {
        match self {
            AssayType::HematoxylinEosin => "H&E",
            AssayType::Ihc => "IHC",
            AssayType::SpecialStain => "Special Stain",
            AssayType::Other => "Other",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            AssayType::HematoxylinEosin => &["he", "h and e", "hematoxylin and eosin"],
            AssayType::Ihc => &["immunohistochemistry"],
            AssayType::SpecialStain => &["special"],
            AssayType::Other => &["other stain"],
        }
    }
}

/// Value held by a field. `Unknown` marks a mandatory field pending
/// resolution; `NotApplicable` an optional field with nothing extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum FieldValue {
    Unknown,
    Text(String),
    NotApplicable,
}

pub const UNKNOWN: &str = "Unknown";
pub const NOT_APPLICABLE: &str = "N/A";

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// Text that actually carries content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text)
                if !text.trim().is_empty() && !text.trim().eq_ignore_ascii_case(UNKNOWN) =>
            {
                Some(text.as_str())
            }
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.as_text().is_some()
    }

    /// Rendering used by tables and summaries.
    pub fn display(&self) -> &str {
        match self {
            FieldValue::Text(text) if !text.trim().is_empty() => text.as_str(),
            FieldValue::NotApplicable => NOT_APPLICABLE,
            _ => UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Detected,
    Enhancer,
    User,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub value: FieldValue,
    pub confidence: f32,
    pub source: FieldSource,
}

impl FieldEntry {
    pub fn new(value: FieldValue, confidence: f32, source: FieldSource) -> Self {
        Self {
            value,
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }

    fn unknown() -> Self {
        Self::new(FieldValue::Unknown, 0.0, FieldSource::Detected)
    }

    fn not_applicable() -> Self {
        Self::new(FieldValue::NotApplicable, 0.0, FieldSource::Detected)
    }
}

/// Extraction certainty per attempted field.
pub type ConfidenceMap = BTreeMap<FieldName, f32>;

/// Field values for one request, keyed by the closed field vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<FieldName, FieldEntry>", into = "BTreeMap<FieldName, FieldEntry>")]
pub struct FieldRecord {
    entries: BTreeMap<FieldName, FieldEntry>,
}

static UNKNOWN_VALUE: FieldValue = FieldValue::Unknown;

impl FieldRecord {
    /// Every mandatory field `Unknown`, every optional field `N/A`.
    pub fn new() -> Self {
        let entries = FieldName::ALL
            .iter()
            .map(|&field| {
                let entry = if field.is_mandatory() {
                    FieldEntry::unknown()
                } else {
                    FieldEntry::not_applicable()
                };
                (field, entry)
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, field: FieldName) -> Option<&FieldEntry> {
        self.entries.get(&field)
    }

    pub fn value(&self, field: FieldName) -> &FieldValue {
        self.entries
            .get(&field)
            .map(|entry| &entry.value)
            .unwrap_or(&UNKNOWN_VALUE)
    }

    pub fn text(&self, field: FieldName) -> Option<&str> {
        self.value(field).as_text()
    }

    pub fn confidence(&self, field: FieldName) -> f32 {
        self.entries.get(&field).map_or(0.0, |entry| entry.confidence)
    }

    pub fn is_resolved(&self, field: FieldName) -> bool {
        self.value(field).is_resolved()
    }

    pub fn set(&mut self, field: FieldName, entry: FieldEntry) {
        self.entries.insert(field, entry);
    }

    pub fn set_text(
        &mut self,
        field: FieldName,
        text: impl Into<String>,
        confidence: f32,
        source: FieldSource,
    ) {
        self.set(
            field,
            FieldEntry::new(FieldValue::text(text), confidence, source),
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &FieldEntry)> {
        self.entries.iter().map(|(field, entry)| (*field, entry))
    }

    pub fn confidences(&self) -> ConfidenceMap {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.source != FieldSource::Generated)
            .map(|(field, entry)| (*field, entry.confidence))
            .collect()
    }
}

impl Default for FieldRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl From<BTreeMap<FieldName, FieldEntry>> for FieldRecord {
    fn from(entries: BTreeMap<FieldName, FieldEntry>) -> Self {
        let mut record = FieldRecord::new();
        record.entries.extend(entries);
        record
    }
}

impl From<FieldRecord> for BTreeMap<FieldName, FieldEntry> {
    fn from(record: FieldRecord) -> Self {
        record.entries
    }
}
