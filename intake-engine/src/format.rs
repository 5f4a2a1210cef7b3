//! Record rendering: a tab-separated table, an ordered structured record and
//! human-readable summaries.

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::classify::ClassificationResult;
use crate::error::{EngineError, Result};
use crate::fields::{
    FieldEntry, FieldName, FieldRecord, FieldSource, FieldValue, NOT_APPLICABLE, UNKNOWN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    Table,
    #[default]
    #[serde(alias = "structured")]
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Formatted {
    Table(String),
    Structured(StructuredRecord),
}

/// Field → display value pairs in declared field order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructuredRecord(Vec<(FieldName, String)>);

impl StructuredRecord {
    pub fn get(&self, field: FieldName) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldName> + '_ {
        self.0.iter().map(|(field, _)| *field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &str)> {
        self.0.iter().map(|(field, value)| (*field, value.as_str()))
    }

    /// Rebuilds a record; `Unknown` and `N/A` become the matching sentinels.
    pub fn to_record(&self, source: FieldSource) -> FieldRecord {
        let mut record = FieldRecord::new();
        for (field, value) in &self.0 {
            let value = value.trim();
            let entry = if value.eq_ignore_ascii_case(UNKNOWN) || value.is_empty() {
                if field.is_mandatory() {
                    FieldEntry::new(FieldValue::Unknown, 0.0, source)
                } else {
                    FieldEntry::new(FieldValue::NotApplicable, 0.0, source)
                }
            } else if value.eq_ignore_ascii_case(NOT_APPLICABLE) {
                FieldEntry::new(FieldValue::NotApplicable, 0.0, source)
            } else {
                FieldEntry::new(FieldValue::text(value), 1.0, source)
            };
            record.set(*field, entry);
        }
        record
    }
}

impl Serialize for StructuredRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, value) in &self.0 {
            map.serialize_entry(field.label(), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StructuredRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StructuredVisitor;

        impl<'de> Visitor<'de> for StructuredVisitor {
            type Value = StructuredRecord;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut pairs: Vec<(FieldName, String)> = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
                    let field = FieldName::from_alias(&key).ok_or_else(|| {
                        serde::de::Error::custom(format!("unknown field name: {key}"))
                    })?;
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => UNKNOWN.to_string(),
                        other => other.to_string(),
                    };
                    pairs.retain(|(existing, _)| *existing != field);
                    pairs.push((field, value));
                }
                pairs.sort_by_key(|(field, _)| *field);
                Ok(StructuredRecord(pairs))
            }
        }

        deserializer.deserialize_map(StructuredVisitor)
    }
}

/// Display value of one cell: `Unknown` for unresolved mandatory fields,
/// `N/A` for optional fields with nothing extracted.
fn cell(record: &FieldRecord, field: FieldName) -> String {
    match record.text(field) {
        Some(text) => text.trim().to_string(),
        None if field.is_mandatory() => UNKNOWN.to_string(),
        None => NOT_APPLICABLE.to_string(),
    }
}

pub fn to_structured(record: &FieldRecord) -> StructuredRecord {
    StructuredRecord(
        FieldName::ALL
            .iter()
            .map(|&field| (field, cell(record, field)))
            .collect(),
    )
}

fn sanitize(value: &str) -> String {
    value
        .split(['\t', '\n', '\r'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tab-separated table: a header of every field name in declared order and
/// one row per record.
pub fn to_table(records: &[FieldRecord]) -> String {
    let header = FieldName::ALL
        .iter()
        .map(|field| field.label())
        .collect::<Vec<_>>()
        .join("\t");
    let mut lines = vec![header];
    for record in records {
        let row = FieldName::ALL
            .iter()
            .map(|&field| sanitize(&cell(record, field)))
            .collect::<Vec<_>>()
            .join("\t");
        lines.push(row);
    }
    lines.join("\n")
}

/// Parses a table produced by [`to_table`] back into ordered records.
pub fn parse_table(table: &str) -> Result<Vec<StructuredRecord>> {
    let mut lines = table.lines().filter(|line| !line.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| EngineError::Format("table has no header row".to_string()))?;
    let columns = header
        .split('\t')
        .map(|name| {
            FieldName::from_alias(name)
                .ok_or_else(|| EngineError::Format(format!("unknown column: {}", name.trim())))
        })
        .collect::<Result<Vec<_>>>()?;

    lines
        .enumerate()
        .map(|(index, line)| {
            let cells: Vec<&str> = line.split('\t').collect();
            if cells.len() != columns.len() {
                return Err(EngineError::Format(format!(
                    "row {} has {} cells, expected {}",
                    index + 1,
                    cells.len(),
                    columns.len()
                )));
            }
            Ok(StructuredRecord(
                columns
                    .iter()
                    .zip(cells)
                    .map(|(field, value)| (*field, value.trim().to_string()))
                    .collect(),
            ))
        })
        .collect()
}

pub fn format(record: &FieldRecord, kind: FormatKind) -> Formatted {
    match kind {
        FormatKind::Table => Formatted::Table(to_table(std::slice::from_ref(record))),
        FormatKind::Json => Formatted::Structured(to_structured(record)),
    }
}

/// Bullet list of the resolved fields, for chat replies.
pub fn field_summary(record: &FieldRecord) -> String {
    FieldName::ALL
        .iter()
        .filter_map(|&field| {
            record
                .text(field)
                .map(|value| format!("• {}: {}", field.label(), value))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Multi-line description attached to a created case.
pub fn case_summary(
    record: &FieldRecord,
    classification: &ClassificationResult,
    text_len: usize,
    at: DateTime<Utc>,
) -> String {
    let mut lines = vec![
        "Research request analysis".to_string(),
        format!("Analysis date: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        format!("Text length: {text_len} characters"),
        format!(
            "Service category: {} ({:.0}% confidence)",
            classification.category,
            classification.confidence * 100.0
        ),
        format!("Reasoning: {}", classification.reasoning),
        "Key findings:".to_string(),
    ];
    for field in FieldName::MANDATORY {
        lines.push(format!("- {}: {}", field.label(), cell(record, field)));
    }
    let optional: Vec<String> = FieldName::ALL
        .iter()
        .filter(|field| !field.is_mandatory())
        .filter_map(|&field| {
            record
                .text(field)
                .map(|value| format!("- {}: {}", field.label(), value))
        })
        .collect();
    if !optional.is_empty() {
        lines.push("Additional details:".to_string());
        lines.extend(optional);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::classify::ScoringTables;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn record_with(pi: &str) -> FieldRecord {
        let mut record = FieldRecord::new();
        record.set_text(FieldName::PrincipalInvestigator, pi, 0.9, FieldSource::User);
        record.set_text(FieldName::Procedure, "BF+IF", 0.85, FieldSource::Detected);
        record
    }

    #[test]
    fn test_table_header_and_sentinels() {
        let table = to_table(&[record_with("Jane Doe")]);
        let mut lines = table.lines();
        assert_eq!(
            lines.next(),
            Some(
                "Pathology Request No.\tTherapeutic Area\tProcedure\tAssay Type/Staining Type\tPI\tPathologist\tProject Title\tRequest Purpose\tAssay Instructions\tTrim Instructions\tSectioning Instructions\tBlock id\tStatus"
            )
        );
        assert_eq!(
            lines.next(),
            Some("N/A\tUnknown\tBF+IF\tUnknown\tJane Doe\tUnknown\tUnknown\tUnknown\tN/A\tN/A\tN/A\tN/A\tN/A")
        );
    }

    #[test]
    fn test_table_round_trip_preserves_order() {
        let table = to_table(&[record_with("Jane Doe"), record_with("Ravi Rao")]);
        let parsed = parse_table(&table).unwrap();
        assert_eq!(parsed.len(), 2);
        let first: Vec<FieldName> = parsed[0].fields().collect();
        let second: Vec<FieldName> = parsed[1].fields().collect();
        assert_eq!(first, FieldName::ALL.to_vec());
        assert_eq!(first, second);
        assert_eq!(parsed[1].get(FieldName::PrincipalInvestigator), Some("Ravi Rao"));
        assert_eq!(parsed[0], to_structured(&record_with("Jane Doe")));
    }

    #[test]
    fn test_parse_table_rejects_ragged_rows() {
        let result = parse_table("PI\tPathologist\nJane Doe");
        assert!(matches!(result, Err(EngineError::Format(_))));
    }

    #[test]
    fn test_cells_are_sanitized() {
        let mut record = FieldRecord::new();
        record.set_text(FieldName::ProjectTitle, "Line one\nline\ttwo", 0.9, FieldSource::User);
        let table = to_table(&[record]);
        assert!(table.lines().nth(1).unwrap().contains("Line one line two"));
    }

    #[test]
    fn test_structured_json_keeps_declared_order() {
        let json = serde_json::to_string(&to_structured(&record_with("Jane Doe"))).unwrap();
        let pi = json.find("\"PI\"").unwrap();
        let area = json.find("\"Therapeutic Area\"").unwrap();
        let status = json.find("\"Status\"").unwrap();
        assert!(area < pi && pi < status);

        let back: StructuredRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, to_structured(&record_with("Jane Doe")));
    }

    #[test]
    fn test_structured_to_record_restores_sentinels() {
        let structured: StructuredRecord =
            serde_json::from_str(r#"{"pi_name": "Jane Doe", "Block id": "N/A", "Pathologist": "Unknown"}"#)
                .unwrap();
        let record = structured.to_record(FieldSource::User);
        assert_eq!(record.text(FieldName::PrincipalInvestigator), Some("Jane Doe"));
        assert_eq!(record.value(FieldName::BlockId), &FieldValue::NotApplicable);
        assert_eq!(record.value(FieldName::Pathologist), &FieldValue::Unknown);
    }

    #[test]
    fn test_case_summary_lists_findings() {
        let text = "3D Image analysis of Cleared Mouse Eyes stained with SOX9 + NucSpot 750";
        let analysis = analyze(text, &ScoringTables::default());
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let summary = case_summary(&analysis.record, &analysis.classification, text.len(), at);
        assert!(summary.contains("Analysis date: 2024-03-01 12:00:00 UTC"));
        assert!(summary.contains("Service category: CALM (80% confidence)"));
        assert!(summary.contains("- Therapeutic Area: Ophthalmology"));
        assert!(summary.contains("- PI: Unknown"));
    }

    #[test]
    fn test_field_summary_skips_unresolved() {
        let summary = field_summary(&record_with("Jane Doe"));
        assert_eq!(summary, "• Procedure: BF+IF\n• PI: Jane Doe");
    }
}
