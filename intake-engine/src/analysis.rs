use serde::{Deserialize, Serialize};

use crate::classify::{ClassificationResult, Recommendation, ScoringInput, ScoringTables, classify};
use crate::detect::detect_all;
use crate::enhancer::{EnhancerAnalysis, merge_enhancement};
use crate::fields::{ConfidenceMap, FieldName, FieldRecord};
use crate::prompts::{Prompt, prompts_for};
use crate::validate::unresolved;

/// Stateless result of running the whole pipeline over one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub record: FieldRecord,
    pub confidences: ConfidenceMap,
    pub classification: ClassificationResult,
    pub unresolved: Vec<FieldName>,
    pub prompts: Vec<Prompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    pub enhanced: bool,
}

pub fn analyze(text: &str, tables: &ScoringTables) -> Analysis {
    analyze_with(text, tables, None)
}

/// Detects fields, merges an optional enhancer result, then classifies and
/// validates the merged record.
pub fn analyze_with(
    text: &str,
    tables: &ScoringTables,
    enhancement: Option<&EnhancerAnalysis>,
) -> Analysis {
    let mut record = detect_all(text);
    let recommendation = enhancement.and_then(EnhancerAnalysis::recommendation);
    if let Some(enhancement) = enhancement {
        merge_enhancement(&mut record, enhancement);
    }
    let classification = classify(
        &ScoringInput::from_record(text, &record).with_recommendation(recommendation.clone()),
        tables,
    );
    let unresolved = unresolved(&record);
    let prompts = prompts_for(&unresolved, &record);
    Analysis {
        confidences: record.confidences(),
        record,
        classification,
        unresolved,
        prompts,
        recommendation,
        enhanced: enhancement.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ServiceCategory;

    #[test]
    fn test_analyze_reports_every_attempted_field() {
        let analysis = analyze(
            "3D Image analysis of Cleared Mouse Eyes stained with SOX9 + NucSpot 750",
            &ScoringTables::default(),
        );
        assert_eq!(analysis.classification.category, ServiceCategory::Calm);
        assert_eq!(analysis.record.text(FieldName::TherapeuticArea), Some("Ophthalmology"));
        assert!(analysis.confidences.contains_key(&FieldName::PrincipalInvestigator));
        assert_eq!(analysis.prompts.len(), analysis.unresolved.len());
        assert!(!analysis.enhanced);
    }

    #[test]
    fn test_enhancer_recommendation_flows_into_classification() {
        let enhancement = EnhancerAnalysis {
            recommended_case_type: Some("DPIA".to_string()),
            case_type_confidence: Some(0.75),
            ..Default::default()
        };
        let analysis = analyze_with(
            "3D Image analysis of Cleared Mouse Eyes",
            &ScoringTables::default(),
            Some(&enhancement),
        );
        assert_eq!(analysis.classification.category, ServiceCategory::Dpia);
        assert_eq!(analysis.classification.confidence, 0.75);
        assert!(analysis.enhanced);
    }
}
