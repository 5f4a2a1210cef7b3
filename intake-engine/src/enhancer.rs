//! Optional external analysis that can improve on the heuristic detectors.
//!
//! The engine never calls an enhancer itself; [`crate::runner::SessionRunner`]
//! does, bounded by a timeout, and merges whatever comes back through
//! [`merge_enhancement`]. Any failure leaves the heuristic result untouched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::classify::Recommendation;
use crate::error::Result;
use crate::fields::{Answer, FieldEntry, FieldKind, FieldName, FieldRecord, FieldSource, FieldValue};

/// Confidence assumed for enhancer values that come without one.
pub const DEFAULT_ENHANCER_CONFIDENCE: f32 = 0.7;

/// Best-effort analysis returned by an enhancer. Field names are external
/// and are normalized through [`FieldName::from_alias`] before merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhancerAnalysis {
    #[serde(default, alias = "detected_fields")]
    pub fields: BTreeMap<String, String>,
    #[serde(default, alias = "confidence_scores")]
    pub confidences: BTreeMap<String, f32>,
    #[serde(default)]
    pub recommended_case_type: Option<String>,
    #[serde(default)]
    pub case_type_confidence: Option<f32>,
    #[serde(default)]
    pub case_type_reasoning: Option<String>,
}

impl EnhancerAnalysis {
    pub fn recommendation(&self) -> Option<Recommendation> {
        let label = self.recommended_case_type.as_ref()?.trim();
        if label.is_empty() {
            return None;
        }
        Some(Recommendation {
            label: label.to_string(),
            confidence: self
                .case_type_confidence
                .unwrap_or(DEFAULT_ENHANCER_CONFIDENCE),
            reasoning: self.case_type_reasoning.clone(),
        })
    }
}

#[async_trait]
pub trait AnalysisEnhancer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<EnhancerAnalysis>;
}

fn is_placeholder(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "" | "unknown" | "n/a" | "na" | "none" | "null" | "not specified"
    )
}

/// Merges enhancer values into `record`.
///
/// A value replaces the current one when the field is unresolved or the
/// enhancer is strictly more confident. Unknown field names, generated
/// fields and placeholder values are dropped. Returns the fields changed.
pub fn merge_enhancement(record: &mut FieldRecord, enhancement: &EnhancerAnalysis) -> Vec<FieldName> {
    let mut merged = Vec::new();
    for (name, value) in &enhancement.fields {
        let Some(field) = FieldName::from_alias(name) else {
            debug!(field = %name, "Dropping unrecognized enhancer field");
            continue;
        };
        if field.kind() == FieldKind::Generated || is_placeholder(value) {
            continue;
        }
        let Answer::Value(value) = field.canonicalize(value) else {
            debug!(field = %field, value = %value, "Dropping enhancer value outside the option set");
            continue;
        };
        let confidence = enhancement
            .confidences
            .get(name)
            .copied()
            .unwrap_or(DEFAULT_ENHANCER_CONFIDENCE);
        let replace = if field.is_mandatory() {
            !record.is_resolved(field) || confidence > record.confidence(field)
        } else {
            matches!(record.value(field), FieldValue::NotApplicable)
                || confidence > record.confidence(field)
        };
        if replace {
            record.set(
                field,
                FieldEntry::new(
                    FieldValue::Text(value),
                    confidence,
                    FieldSource::Enhancer,
                ),
            );
            merged.push(field);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enhancement(fields: &[(&str, &str)], confidences: &[(&str, f32)]) -> EnhancerAnalysis {
        EnhancerAnalysis {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            confidences: confidences
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_fills_unresolved_fields_with_normalized_names() {
        let mut record = FieldRecord::new();
        let merged = merge_enhancement(
            &mut record,
            &enhancement(
                &[("pi_name", "Jane Doe"), ("procedure_type", "bf"), ("mystery", "x")],
                &[],
            ),
        );
        assert_eq!(merged, vec![FieldName::PrincipalInvestigator, FieldName::Procedure]);
        assert_eq!(record.text(FieldName::PrincipalInvestigator), Some("Jane Doe"));
        assert_eq!(record.text(FieldName::Procedure), Some("Bright-field (BF)"));
        assert_eq!(
            record.get(FieldName::Procedure).map(|e| e.source),
            Some(FieldSource::Enhancer)
        );
    }

    #[test]
    fn test_merge_keeps_more_confident_heuristic_value() {
        let mut record = FieldRecord::new();
        record.set_text(FieldName::Pathologist, "Dr. Lee", 0.9, FieldSource::Detected);
        record.set_text(FieldName::ProjectTitle, "Lung Research Study", 0.4, FieldSource::Detected);
        merge_enhancement(
            &mut record,
            &enhancement(
                &[("pathologist", "Dr. Kim"), ("project_title", "AT2 Regeneration")],
                &[("pathologist", 0.8)],
            ),
        );
        assert_eq!(record.text(FieldName::Pathologist), Some("Dr. Lee"));
        assert_eq!(record.text(FieldName::ProjectTitle), Some("AT2 Regeneration"));
    }

    #[test]
    fn test_values_outside_the_option_set_are_dropped() {
        let mut record = FieldRecord::new();
        let merged = merge_enhancement(
            &mut record,
            &enhancement(
                &[("therapeutic_area", "Pathology"), ("assay_type", "ihc")],
                &[("therapeutic_area", 0.95)],
            ),
        );
        assert_eq!(merged, vec![FieldName::AssayType]);
        assert!(!record.is_resolved(FieldName::TherapeuticArea));
        assert_eq!(record.text(FieldName::AssayType), Some("IHC"));
    }

    #[test]
    fn test_placeholders_are_ignored() {
        let mut record = FieldRecord::new();
        let merged = merge_enhancement(&mut record, &enhancement(&[("pi_name", "Unknown")], &[]));
        assert!(merged.is_empty());
    }

    #[test]
    fn test_recommendation_requires_label() {
        let analysis = EnhancerAnalysis {
            recommended_case_type: Some("DPIA".to_string()),
            case_type_confidence: Some(0.85),
            ..Default::default()
        };
        let recommendation = analysis.recommendation().unwrap();
        assert_eq!(recommendation.label, "DPIA");
        assert_eq!(recommendation.confidence, 0.85);
        assert!(EnhancerAnalysis::default().recommendation().is_none());
    }
}
